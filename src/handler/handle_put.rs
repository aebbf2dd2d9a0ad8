use http::{header, Request, Response, StatusCode};
use uuid::Uuid;

use crate::body::Body;
use crate::{DavError, DavResult};
use crate::framer::{frame_body, FramedBody};
use crate::handler::IncomingBody;
use crate::multistatus::empty_status;
use crate::resource::{mime_by_name, DiskFile, VirtualFile};
use crate::tempdisk::temp_disk_id;
use crate::user::UserState;
use crate::util::now_ms;

impl crate::WebDavHandler {
    pub(crate) async fn handle_put(
        &self,
        user: &UserState,
        req: &Request<()>,
        body: IncomingBody,
    ) -> DavResult<Response<Body>> {
        let path = self.path(req)?;

        // Partial PUT (mod_dav style) would corrupt whole-file uploads.
        if req.headers().contains_key(header::CONTENT_RANGE) {
            return Err(DavError::Status(StatusCode::BAD_REQUEST));
        }

        if let Some(existing) = user.resolve(&path).await? {
            if existing.is_dir() {
                return Err(DavError::Status(StatusCode::FORBIDDEN));
            }
        }

        // Make sure the parent exists and is a directory. mkdir is
        // idempotent at the backend; the re-stat decides.
        let parent = path.parent();
        if !parent.is_root() {
            let _ = user.client.mkdir(parent.as_str()).await;
        }
        let parent_stats = match user.client.stat(parent.as_str()).await {
            Ok(stats) if stats.is_dir() => stats,
            _ => return Err(DavError::Status(StatusCode::PRECONDITION_FAILED)),
        };

        // Zero-length probe, declared or framed.
        let content_length_zero = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim() == "0")
            .unwrap_or(false);
        let framed = if content_length_zero {
            FramedBody::Empty
        } else {
            frame_body(body, self.peek_timeout).await?
        };

        let framed = match framed {
            FramedBody::Empty => {
                // Materialize a placeholder so the follow-up
                // PROPFIND/HEAD/GET sees the file the client just "created".
                user.virtual_insert(VirtualFile::create(&path));
                user.disk_remove(&path);
                return Ok(empty_status(StatusCode::CREATED));
            }
            data => data,
        };

        if self.scratch_globs.is_match(path.name()) {
            return self.put_scratch(user, &path, framed).await;
        }

        match user
            .client
            .upload_file_stream(framed.into_stream(), &parent_stats.uuid, path.name())
            .await
        {
            Ok(uploaded) => {
                // Rewrite the SDK's metadata index so the very next stat
                // sees the new file.
                user.client.remove_cached_item(path.as_str());
                user.client.add_cached_item(path.as_str(), uploaded);
                user.virtual_remove(&path);
                user.disk_remove(&path);
                Ok(empty_status(StatusCode::CREATED))
            }
            Err(e) => {
                error!("upload of {path} failed: {e}");
                user.virtual_remove(&path);
                user.disk_remove(&path);
                Err(DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
            }
        }
    }

    // Sidecar path: the bytes land in the local scratch tier and never
    // reach the backend.
    async fn put_scratch(
        &self,
        user: &UserState,
        path: &crate::davpath::DavPath,
        framed: FramedBody,
    ) -> DavResult<Response<Body>> {
        let temp_disk_id = temp_disk_id(&user.username, path.as_str());
        let size = self
            .tempdisk
            .write_stream(&temp_disk_id, framed.into_stream())
            .await?;

        let chunk_size = user.client.upload_chunk_size().max(1);
        let now = now_ms();
        let name = path.name().to_string();
        user.disk_insert(DiskFile {
            uuid: Uuid::new_v4().to_string(),
            mime: mime_by_name(&name),
            path: path.as_str().to_string(),
            name,
            size,
            chunks: size.div_ceil(chunk_size).max(1),
            mtime_ms: now,
            birthtime_ms: now,
            last_modified: now,
            creation: now,
            temp_disk_id,
        });
        user.virtual_remove(path);
        Ok(empty_status(StatusCode::CREATED))
    }
}
