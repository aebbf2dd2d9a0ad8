//
// This module contains the webdav method dispatcher, WebDavHandler.
//
use std::error::Error as StdError;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes};
use futures_util::stream::{BoxStream, StreamExt};
use globset::GlobSet;
use http::{header, Request, Response, StatusCode};
use http_body::Body as HttpBody;

use crate::auth::{AuthOutcome, Authenticator};
use crate::body::Body;
use crate::config::RateLimitKey;
use crate::davpath::DavPath;
use crate::{DavError, DavResult};
use crate::multistatus::empty_status;
use crate::ratelimit::RateLimiter;
use crate::tempdisk::TempDisk;
use crate::user::UserState;
use crate::util::{dav_method, DavMethod};

pub mod handle_copymove;
pub mod handle_delete;
pub mod handle_gethead;
pub mod handle_lock;
pub mod handle_mkcol;
pub mod handle_options;
pub mod handle_props;
pub mod handle_put;

// Hard cap for XML request bodies (PROPFIND, PROPPATCH).
const XML_BODY_LIMIT: usize = 1024 * 1024;

const ALLOW: &str = "OPTIONS, GET, HEAD, PUT, DELETE, PROPFIND, PROPPATCH, MKCOL, COPY, MOVE";

pub(crate) type IncomingBody = BoxStream<'static, io::Result<Bytes>>;

/// The webdav request handler: middleware chain (rate limit →
/// authenticate → common DAV headers) and one `handle_*` method per verb.
///
/// Cheap to clone; the server clones it per connection.
#[derive(Clone)]
pub struct WebDavHandler {
    pub(crate) auth: Arc<Authenticator>,
    pub(crate) tempdisk: TempDisk,
    pub(crate) scratch_globs: Arc<GlobSet>,
    pub(crate) ratelimit: Arc<RateLimiter>,
    pub(crate) ratelimit_key: RateLimitKey,
    pub(crate) peek_timeout: Duration,
}

impl WebDavHandler {
    /// Handle one webdav request. `remote_ip` is the peer address, used
    /// for IP-keyed rate limiting.
    pub async fn handle<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
        remote_ip: Option<IpAddr>,
    ) -> Response<Body>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let method = req.method().clone();
        let uri = req.uri().clone();

        let mut res = match self.handle_inner(req, remote_ip).await {
            Ok(res) => {
                debug!("== END REQUEST {method} {uri} => {}", res.status());
                res
            }
            Err(err) => {
                if err.statuscode().is_server_error() {
                    error!("{method} {uri}: {err}");
                } else {
                    debug!("== END REQUEST {method} {uri} => {err}");
                }
                let mut res = empty_status(err.statuscode());
                if err.must_close() {
                    res.headers_mut()
                        .insert(header::CONNECTION, "close".parse().unwrap());
                }
                res
            }
        };
        self.common_headers(&mut res);
        res
    }

    // Standard DAV headers, set on every response.
    fn common_headers(&self, res: &mut Response<Body>) {
        let h = res.headers_mut();
        h.insert(header::ALLOW, ALLOW.parse().unwrap());
        h.insert("DAV", "1, 2".parse().unwrap());
        h.insert("Access-Control-Allow-Origin", "*".parse().unwrap());
        h.insert("Access-Control-Allow-Credentials", "true".parse().unwrap());
        h.insert(
            "Access-Control-Expose-Headers",
            "DAV, content-length, Allow".parse().unwrap(),
        );
        h.insert("MS-Author-Via", "DAV".parse().unwrap());
        h.insert(header::SERVER, "Filen WebDAV".parse().unwrap());
        h.insert(header::CACHE_CONTROL, "no-cache".parse().unwrap());
    }

    async fn handle_inner<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
        remote_ip: Option<IpAddr>,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let method = dav_method(req.method())?;

        if !self.ratelimit.check(&self.ratelimit_bucket(&req, remote_ip)) {
            return Err(DavError::Status(StatusCode::TOO_MANY_REQUESTS));
        }

        // Windows probes OPTIONS without credentials.
        if method == DavMethod::Options {
            return self.handle_options().await;
        }

        let user = match self.auth.authenticate(&req).await? {
            AuthOutcome::User(user) => user,
            AuthOutcome::Denied(res) => return Ok(res),
        };

        let (req, body) = {
            let (parts, body) = req.into_parts();
            (Request::from_parts(parts, ()), box_body(body))
        };

        debug!("== START REQUEST {:?} {} [{}]", method, req.uri(), user.username);

        // PUT streams its body; the other verbs see at most a small XML
        // document, read whole under a hard cap.
        let (body_strm, body_data) = match method {
            DavMethod::Put => (Some(body), Vec::new()),
            _ => (None, read_request(body, XML_BODY_LIMIT).await?),
        };

        match method {
            DavMethod::Options => self.handle_options().await,
            DavMethod::PropFind => self.handle_propfind(&user, &req, &body_data).await,
            DavMethod::PropPatch => self.handle_proppatch(&user, &req, &body_data).await,
            DavMethod::MkCol => self.handle_mkcol(&user, &req).await,
            DavMethod::Delete => self.handle_delete(&user, &req).await,
            DavMethod::Lock => self.handle_lock(&req).await,
            DavMethod::Unlock => self.handle_unlock(&req).await,
            DavMethod::Head | DavMethod::Get => {
                self.handle_gethead(&user, &req, method == DavMethod::Head).await
            }
            DavMethod::Copy | DavMethod::Move => {
                self.handle_copymove(&user, &req, method).await
            }
            DavMethod::Put => self.handle_put(&user, &req, body_strm.unwrap()).await,
        }
    }

    fn ratelimit_bucket<B>(&self, req: &Request<B>, remote_ip: Option<IpAddr>) -> String {
        let ip = || {
            remote_ip
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        };
        match self.ratelimit_key {
            RateLimitKey::Ip => ip(),
            RateLimitKey::Username => self.auth.claimed_username(req).unwrap_or_else(ip),
        }
    }

    // helper.
    pub(crate) fn path(&self, req: &Request<()>) -> DavResult<DavPath> {
        DavPath::from_uri(req.uri())
    }

    // helper: resolve, mapping "in no tier" to a plain status.
    pub(crate) async fn resolve_or(
        &self,
        user: &UserState,
        path: &DavPath,
        missing: StatusCode,
    ) -> DavResult<crate::resource::Resource> {
        match user.resolve(path).await? {
            Some(res) => Ok(res),
            None => Err(DavError::Status(missing)),
        }
    }
}

// Convert any http_body into the boxed byte stream handlers work with.
fn box_body<ReqBody, ReqData, ReqError>(body: ReqBody) -> IncomingBody
where
    ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
    ReqData: Buf + Send + 'static,
    ReqError: StdError + Send + Sync + 'static,
{
    let stream = async_stream::try_stream! {
        pin_utils::pin_mut!(body);
        while let Some(res) = body.data().await {
            let mut buf = res.map_err(|e| io::Error::new(io::ErrorKind::UnexpectedEof, e))?;
            let bytes = buf.copy_to_bytes(buf.remaining());
            yield bytes;
        }
    };
    stream.boxed()
}

// drain request body and return it, bounded.
async fn read_request(mut body: IncomingBody, max_size: usize) -> DavResult<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(res) = body.next().await {
        let chunk = res.map_err(DavError::IoError)?;
        if data.len() + chunk.len() > max_size {
            return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}
