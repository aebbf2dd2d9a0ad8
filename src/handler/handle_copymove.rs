use futures_util::future;
use http::{Request, Response, StatusCode, Uri};

use crate::body::Body;
use crate::davpath::DavPath;
use crate::{DavError, DavResult};
use crate::multistatus::empty_status;
use crate::resource::Resource;
use crate::tempdisk::temp_disk_id;
use crate::user::UserState;
use crate::util::DavMethod;

impl crate::WebDavHandler {
    pub(crate) async fn handle_copymove(
        &self,
        user: &UserState,
        req: &Request<()>,
        method: DavMethod,
    ) -> DavResult<Response<Body>> {
        let source_path = self.path(req)?;
        let dest_path = destination_path(req)?;

        let (source, dest) = future::join(
            user.resolve(&source_path),
            user.resolve(&dest_path),
        )
        .await;
        let source = match source? {
            Some(source) => source,
            None => return Err(DavError::Status(StatusCode::NOT_FOUND)),
        };
        let dest = dest?;

        if source_path == dest_path {
            return Ok(empty_status(StatusCode::CREATED));
        }

        let overwrite = req
            .headers()
            .get("Overwrite")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().eq_ignore_ascii_case("T"))
            .unwrap_or(false);
        if dest.is_some() && !overwrite {
            // RFC 4918 "already exists" without Overwrite: T.
            return Err(DavError::Status(StatusCode::FORBIDDEN));
        }

        let is_move = method == DavMethod::Move;
        let overwriting = dest.is_some();

        match source {
            Resource::Virtual(v) => {
                if let Some(dest) = dest {
                    // A placeholder displacing real bytes is ephemeral by
                    // nature; the displaced destination is gone for good.
                    self.purge_destination(user, &dest_path, dest, true).await?;
                }
                user.virtual_insert(v.relocated(&dest_path));
                if is_move {
                    user.virtual_remove(&source_path);
                }
            }
            Resource::Disk(d) => {
                if let Some(dest) = dest {
                    self.purge_destination(user, &dest_path, dest, true).await?;
                }
                let new_id = temp_disk_id(&user.username, dest_path.as_str());
                if is_move {
                    self.tempdisk.rename(&d.temp_disk_id, &new_id).await?;
                    user.disk_remove(&source_path);
                } else {
                    self.tempdisk.copy(&d.temp_disk_id, &new_id).await?;
                }
                user.disk_insert(d.relocated(&dest_path, new_id));
            }
            Resource::Backend { .. } => {
                if let Some(dest) = dest {
                    // Overwritten backend destinations go to the trash.
                    self.purge_destination(user, &dest_path, dest, false).await?;
                }
                if is_move {
                    user.client
                        .rename(source_path.as_str(), dest_path.as_str())
                        .await?;
                } else {
                    user.client
                        .cp(source_path.as_str(), dest_path.as_str())
                        .await?;
                }
            }
        }

        let status = if overwriting {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };
        Ok(empty_status(status))
    }

    // Clear whatever currently serves the destination path.
    // `backend_permanent` decides whether a backend destination is
    // trashed or deleted outright.
    async fn purge_destination(
        &self,
        user: &UserState,
        path: &DavPath,
        dest: Resource,
        backend_permanent: bool,
    ) -> DavResult<()> {
        match dest {
            Resource::Virtual(_) => {
                user.virtual_remove(path);
            }
            Resource::Disk(d) => {
                self.tempdisk.remove(&d.temp_disk_id).await?;
                user.disk_remove(path);
            }
            Resource::Backend { .. } => {
                user.client.unlink(path.as_str(), backend_permanent).await?;
            }
        }
        Ok(())
    }
}

// Validate and decode the Destination header: it must be an absolute URL
// on this host, and its path must not try to climb out of the tree.
fn destination_path(req: &Request<()>) -> DavResult<DavPath> {
    let raw = req
        .headers()
        .get("Destination")
        .and_then(|v| v.to_str().ok())
        .ok_or(DavError::Status(StatusCode::BAD_REQUEST))?;

    let uri: Uri = raw
        .parse()
        .map_err(|_| DavError::Status(StatusCode::BAD_REQUEST))?;
    if uri.scheme().is_none() {
        return Err(DavError::Status(StatusCode::BAD_REQUEST));
    }
    let dest_host = uri
        .host()
        .ok_or(DavError::Status(StatusCode::BAD_REQUEST))?;

    if let Some(req_host) = req
        .headers()
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
    {
        let req_host = req_host.split(':').next().unwrap_or(req_host);
        if !req_host.is_empty() && req_host != dest_host {
            return Err(DavError::Status(StatusCode::BAD_REQUEST));
        }
    }

    let path = DavPath::from_str(uri.path())?;
    if path.is_traversal() {
        return Err(DavError::Status(StatusCode::FORBIDDEN));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(dest: Option<&str>, host: Option<&str>) -> Request<()> {
        let mut b = Request::builder().method("MOVE").uri("/a");
        if let Some(d) = dest {
            b = b.header("Destination", d);
        }
        if let Some(h) = host {
            b = b.header("Host", h);
        }
        b.body(()).unwrap()
    }

    #[test]
    fn valid_destination() {
        let r = req(Some("http://nas.local:1900/d/e%20f"), Some("nas.local:1900"));
        assert_eq!(destination_path(&r).unwrap().as_str(), "/d/e f");
    }

    #[test]
    fn missing_or_relative_is_400() {
        assert!(destination_path(&req(None, None)).is_err());
        assert!(destination_path(&req(Some("/just/a/path"), None)).is_err());
        assert!(destination_path(&req(Some("::::"), None)).is_err());
    }

    #[test]
    fn foreign_host_is_400() {
        let r = req(Some("http://evil.example/x"), Some("nas.local"));
        assert!(destination_path(&r).is_err());
    }

    #[test]
    fn traversal_is_403() {
        let r = req(Some("http://nas.local/../etc"), Some("nas.local"));
        match destination_path(&r) {
            Err(e) => assert_eq!(e.statuscode(), StatusCode::FORBIDDEN),
            Ok(_) => panic!("expected 403"),
        }
    }
}
