use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::multistatus::empty_status;
use crate::DavResult;

// Advisory locks are intentionally not maintained; clients that insist on
// LOCK fall back to optimistic concurrency on a 501.
impl crate::WebDavHandler {
    pub(crate) async fn handle_lock(&self, _req: &Request<()>) -> DavResult<Response<Body>> {
        Ok(empty_status(StatusCode::NOT_IMPLEMENTED))
    }

    pub(crate) async fn handle_unlock(&self, _req: &Request<()>) -> DavResult<Response<Body>> {
        Ok(empty_status(StatusCode::NOT_IMPLEMENTED))
    }
}
