use http::{Response, StatusCode};

use crate::body::Body;
use crate::multistatus::empty_status;
use crate::DavResult;

impl crate::WebDavHandler {
    // The advertised verb list and DAV compliance classes ride on the
    // common headers set for every response; OPTIONS itself is an
    // unauthenticated empty 200 so client probes always succeed.
    pub(crate) async fn handle_options(&self) -> DavResult<Response<Body>> {
        Ok(empty_status(StatusCode::OK))
    }
}
