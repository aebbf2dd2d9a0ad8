use futures_util::future;
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davpath::DavPath;
use crate::{DavError, DavResult};
use crate::multistatus::{multistatus, notfound_multistatus, proppatch_multistatus};
use crate::resource::Resource;
use crate::sdk::{FileMetadata, SdkError};
use crate::user::UserState;
use crate::util::parse_httpdate;

impl crate::WebDavHandler {
    // The request body (prop filters) is accepted but ignored: we always
    // answer with the full property set, which the known clients expect.
    pub(crate) async fn handle_propfind(
        &self,
        user: &UserState,
        req: &Request<()>,
        _body: &[u8],
    ) -> DavResult<Response<Body>> {
        let path = self.path(req)?;
        let depth_zero = req
            .headers()
            .get("Depth")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim() == "0")
            .unwrap_or(false);

        let resource = match user.resolve(&path).await? {
            Some(resource) => resource,
            None => return notfound_multistatus(path.as_str()),
        };

        let statfs = user.statfs().await?;

        let mut resources = vec![resource];
        if resources[0].is_dir() && !depth_zero {
            resources.extend(self.read_children(user, &path).await?);
        }
        multistatus(&resources, statfs)
    }

    // Backend listing plus the virtual/disk overlay entries of this
    // directory. Children are stat'ed in parallel; one that vanishes
    // between readdir and stat is skipped.
    async fn read_children(&self, user: &UserState, dir: &DavPath) -> DavResult<Vec<Resource>> {
        let names = user.client.readdir(dir.as_str()).await?;

        let stats = future::join_all(names.iter().map(|name| {
            let child = dir.join(name);
            async move {
                let stats = user.client.stat(child.as_str()).await;
                (child, stats)
            }
        }))
        .await;

        let mut children = Vec::with_capacity(stats.len());
        for (child, stats) in stats {
            match stats {
                Ok(stats) => children.push(Resource::backend(&child, stats)),
                Err(SdkError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
        }
        children.extend(user.overlay_children(dir));
        Ok(children)
    }

    pub(crate) async fn handle_proppatch(
        &self,
        user: &UserState,
        req: &Request<()>,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        let path = self.path(req)?;
        let patch = parse_proppatch(body)?;

        let resource = self
            .resolve_or(user, &path, StatusCode::NOT_FOUND)
            .await?;

        match resource {
            // Directory timestamps are not editable; reply as if done.
            Resource::Backend { ref stats, .. } if stats.is_dir() => {}
            Resource::Backend { stats, .. } => {
                let mut updated = stats;
                if let Some(ms) = patch.last_modified {
                    updated.last_modified = ms;
                    updated.mtime_ms = ms;
                }
                if let Some(ms) = patch.creation {
                    updated.creation = ms;
                    updated.birthtime_ms = ms;
                }
                user.client
                    .edit_file_metadata(&updated.uuid, FileMetadata::from(&updated))
                    .await?;
                user.client.remove_cached_item(path.as_str());
                user.client.add_cached_item(path.as_str(), updated);
            }
            Resource::Virtual(mut v) => {
                if let Some(ms) = patch.last_modified {
                    v.last_modified = ms;
                    v.mtime_ms = ms;
                }
                if let Some(ms) = patch.creation {
                    v.creation = ms;
                    v.birthtime_ms = ms;
                }
                user.virtual_insert(v);
            }
            Resource::Disk(mut d) => {
                if let Some(ms) = patch.last_modified {
                    d.last_modified = ms;
                    d.mtime_ms = ms;
                }
                if let Some(ms) = patch.creation {
                    d.creation = ms;
                    d.birthtime_ms = ms;
                }
                user.disk_insert(d);
            }
        }

        proppatch_multistatus(path.as_str())
    }
}

#[derive(Debug, Default, PartialEq)]
struct PropPatch {
    last_modified: Option<u64>,
    creation: Option<u64>,
}

// Extract the timestamp properties from a propertyupdate body,
// tolerating unprefixed, `d:` and `D:` element names. Values that do not
// parse as dates are ignored.
fn parse_proppatch(body: &[u8]) -> DavResult<PropPatch> {
    let mut patch = PropPatch::default();
    if body.is_empty() {
        return Ok(patch);
    }
    let root = xmltree::Element::parse(body).map_err(|_| DavError::XmlParseError)?;
    if !root.name.eq_ignore_ascii_case("propertyupdate") {
        return Ok(patch);
    }
    for set in children_named(&root, "set") {
        for prop in children_named(set, "prop") {
            for el in prop.children.iter().filter_map(|n| n.as_element()) {
                let value = match el.get_text() {
                    Some(text) => text.into_owned(),
                    None => continue,
                };
                let name = el.name.to_ascii_lowercase();
                match name.as_str() {
                    "getlastmodified" | "lastmodified" => {
                        if let Some(ms) = parse_httpdate(&value) {
                            patch.last_modified = Some(ms);
                        }
                    }
                    "creationdate" | "getcreationdate" => {
                        if let Some(ms) = parse_httpdate(&value) {
                            patch.creation = Some(ms);
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(patch)
}

fn children_named<'a>(
    el: &'a xmltree::Element,
    name: &'a str,
) -> impl Iterator<Item = &'a xmltree::Element> {
    el.children
        .iter()
        .filter_map(|n| n.as_element())
        .filter(move |c| c.name.eq_ignore_ascii_case(name))
}
