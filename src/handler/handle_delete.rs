use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::multistatus::empty_status;
use crate::resource::Resource;
use crate::user::UserState;
use crate::DavResult;

impl crate::WebDavHandler {
    pub(crate) async fn handle_delete(
        &self,
        user: &UserState,
        req: &Request<()>,
    ) -> DavResult<Response<Body>> {
        let path = self.path(req)?;
        let resource = self.resolve_or(user, &path, StatusCode::NOT_FOUND).await?;

        match resource {
            Resource::Virtual(_) => {
                user.virtual_remove(&path);
            }
            Resource::Disk(d) => {
                self.tempdisk.remove(&d.temp_disk_id).await?;
                user.disk_remove(&path);
            }
            // Soft delete: backend items go to the account trash.
            Resource::Backend { .. } => {
                user.client.unlink(path.as_str(), false).await?;
            }
        }
        Ok(empty_status(StatusCode::OK))
    }
}
