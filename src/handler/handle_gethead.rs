use http::{header, HeaderMap, Request, Response, StatusCode};

use crate::body::Body;
use crate::{DavError, DavResult};
use crate::resource::Resource;
use crate::user::UserState;

impl crate::WebDavHandler {
    pub(crate) async fn handle_gethead(
        &self,
        user: &UserState,
        req: &Request<()>,
        head: bool,
    ) -> DavResult<Response<Body>> {
        let path = self.path(req)?;
        let resource = self.resolve_or(user, &path, StatusCode::NOT_FOUND).await?;
        if resource.is_dir() {
            return Err(DavError::Status(StatusCode::FORBIDDEN));
        }

        let mut res = Response::builder()
            .header(header::CONTENT_TYPE, resource.mime())
            .header(header::ACCEPT_RANGES, "bytes");

        // A virtual file has no bytes anywhere; answer the probe with an
        // empty 200 regardless of any Range header.
        if resource.is_virtual() {
            return Ok(res
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, "0")
                .body(Body::empty())
                .unwrap());
        }

        let size = resource.size();
        let range = parse_range(req.headers(), size)?;

        let (start, end) = match range {
            Some((start, end)) => {
                res = res.status(StatusCode::PARTIAL_CONTENT).header(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{size}"),
                );
                (start, end)
            }
            None => (0, size.saturating_sub(1)),
        };
        let length = if size == 0 { 0 } else { end - start + 1 };
        res = res.header(header::CONTENT_LENGTH, length.to_string());
        if range.is_none() {
            res = res.status(StatusCode::OK);
        }

        if head || length == 0 {
            return Ok(res.body(Body::empty()).unwrap());
        }

        let stream = match &resource {
            Resource::Disk(d) => {
                match self.tempdisk.read_stream(&d.temp_disk_id, start, end).await {
                    Ok(stream) => stream,
                    // The scratch file went away under us: the map entry
                    // is stale, repair by deletion.
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        user.disk_remove(&path);
                        return Err(DavError::Status(StatusCode::NOT_FOUND));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Resource::Backend { stats, .. } => {
                user.client.download_file_stream(stats, start, end).await?
            }
            Resource::Virtual(_) => unreachable!(),
        };
        Ok(res.body(Body::stream(stream)).unwrap())
    }
}

// `Range: bytes=start-[end]`, with the legacy clients that put the range
// in a request `Content-Range: bytes start-end/total` accepted too.
// Returns `None` when no range was requested; malformed or out-of-bounds
// ranges are a 400.
fn parse_range(headers: &HeaderMap, size: u64) -> DavResult<Option<(u64, u64)>> {
    let spec = if let Some(v) = headers.get(header::RANGE) {
        let v = v.to_str().map_err(|_| bad_request())?;
        v.strip_prefix("bytes=").ok_or_else(bad_request)?.to_string()
    } else if let Some(v) = headers.get(header::CONTENT_RANGE) {
        let v = v.to_str().map_err(|_| bad_request())?;
        let v = v.strip_prefix("bytes ").ok_or_else(bad_request)?;
        v.split('/').next().unwrap_or("").to_string()
    } else {
        return Ok(None);
    };

    let (start, end) = spec.split_once('-').ok_or_else(bad_request)?;
    let start: u64 = start.trim().parse().map_err(|_| bad_request())?;
    let end: u64 = match end.trim() {
        "" => size.saturating_sub(1),
        e => e.parse().map_err(|_| bad_request())?,
    };
    if start > end || end >= size {
        return Err(bad_request());
    }
    Ok(Some((start, end)))
}

fn bad_request() -> DavError {
    DavError::Status(StatusCode::BAD_REQUEST)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(name, value.parse().unwrap());
        h
    }

    #[test]
    fn closed_and_open_ranges() {
        let h = headers(header::RANGE, "bytes=0-2");
        assert_eq!(parse_range(&h, 5).unwrap(), Some((0, 2)));

        let h = headers(header::RANGE, "bytes=3-");
        assert_eq!(parse_range(&h, 5).unwrap(), Some((3, 4)));

        assert_eq!(parse_range(&HeaderMap::new(), 5).unwrap(), None);
    }

    #[test]
    fn legacy_content_range() {
        let h = headers(header::CONTENT_RANGE, "bytes 1-3/5");
        assert_eq!(parse_range(&h, 5).unwrap(), Some((1, 3)));
    }

    #[test]
    fn out_of_bounds_is_400() {
        let h = headers(header::RANGE, "bytes=4-2");
        assert!(parse_range(&h, 5).is_err());

        let h = headers(header::RANGE, "bytes=0-5");
        assert!(parse_range(&h, 5).is_err());

        let h = headers(header::RANGE, "bytes=0-0");
        assert!(parse_range(&h, 0).is_err());
    }

    #[test]
    fn malformed_is_400() {
        let h = headers(header::RANGE, "bytes=a-b");
        assert!(parse_range(&h, 5).is_err());
        let h = headers(header::RANGE, "items=0-1");
        assert!(parse_range(&h, 5).is_err());
    }
}
