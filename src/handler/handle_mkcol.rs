use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::{DavError, DavResult};
use crate::multistatus::empty_status;
use crate::user::UserState;

impl crate::WebDavHandler {
    pub(crate) async fn handle_mkcol(
        &self,
        user: &UserState,
        req: &Request<()>,
    ) -> DavResult<Response<Body>> {
        let path = self.path(req)?;

        let parent = self
            .resolve_or(user, &path.parent(), StatusCode::PRECONDITION_FAILED)
            .await?;
        if !parent.is_dir() {
            return Err(DavError::Status(StatusCode::PRECONDITION_FAILED));
        }

        // The backend de-duplicates name+parent collisions, which makes
        // MKCOL on an existing directory succeed. Lenient by choice.
        user.client.mkdir(path.as_str()).await?;

        let created = self.resolve_or(user, &path, StatusCode::NOT_FOUND).await?;
        if !created.is_dir() {
            return Err(DavError::Status(StatusCode::NOT_FOUND));
        }
        Ok(empty_status(StatusCode::CREATED))
    }
}
