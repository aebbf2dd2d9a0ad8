//! Authentication and per-request identity binding.
//!
//! Three modes:
//!
//! - Basic, single-tenant: constant-time compare against configured
//!   credentials; the one `UserState` is seeded at startup.
//! - Basic, proxy: the username is an account email and the Basic
//!   password smuggles the real credentials
//!   (`password=<secret>[&twoFactorAuthentication=<otp>]`). Sessions are
//!   opened lazily, serialized per username, and re-authenticated by
//!   constant-time comparison against the cached raw password.
//! - Digest, single-tenant only.
//!
//! Credentials never appear in log output, and failures do not reveal
//! which part of the credential was wrong.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http::{header, Request, Response, StatusCode};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::body::Body;
use crate::errors::DavResult;
use crate::sdk::SessionFactory;
use crate::user::{UserRegistry, UserState};

const REALM: &str = "Default realm";

pub(crate) enum AuthOutcome {
    User(Arc<UserState>),
    /// 401 with the mode-appropriate challenge.
    Denied(Response<Body>),
}

pub(crate) struct Authenticator {
    mode: Mode,
    registry: Arc<UserRegistry>,
}

enum Mode {
    Basic {
        username: String,
        password: String,
    },
    Proxy {
        factory: Arc<dyn SessionFactory>,
    },
    Digest {
        username: String,
        password: String,
    },
}

impl Authenticator {
    pub fn basic(registry: Arc<UserRegistry>, username: String, password: String) -> Authenticator {
        Authenticator {
            mode: Mode::Basic { username, password },
            registry,
        }
    }

    pub fn proxy(registry: Arc<UserRegistry>, factory: Arc<dyn SessionFactory>) -> Authenticator {
        Authenticator {
            mode: Mode::Proxy { factory },
            registry,
        }
    }

    pub fn digest(registry: Arc<UserRegistry>, username: String, password: String) -> Authenticator {
        Authenticator {
            mode: Mode::Digest { username, password },
            registry,
        }
    }

    /// The username claimed by the request, unverified. Used for
    /// rate-limit keying before authentication runs.
    pub fn claimed_username<B>(&self, req: &Request<B>) -> Option<String> {
        let value = header_str(req, header::AUTHORIZATION)?;
        if let Some(b64) = value.strip_prefix("Basic ") {
            let decoded = BASE64.decode(b64.trim()).ok()?;
            let creds = String::from_utf8(decoded).ok()?;
            return creds.split_once(':').map(|(u, _)| u.to_string());
        }
        if let Some(params) = value.strip_prefix("Digest ") {
            return parse_digest_params(params).remove("username");
        }
        None
    }

    pub async fn authenticate<B>(&self, req: &Request<B>) -> DavResult<AuthOutcome> {
        match &self.mode {
            Mode::Basic { username, password } => self.basic_auth(req, username, password),
            Mode::Proxy { factory } => self.proxy_auth(req, factory.as_ref()).await,
            Mode::Digest { username, password } => self.digest_auth(req, username, password),
        }
    }

    fn basic_auth<B>(
        &self,
        req: &Request<B>,
        username: &str,
        password: &str,
    ) -> DavResult<AuthOutcome> {
        let creds = match basic_credentials(req) {
            Some(creds) => creds,
            None => return Ok(AuthOutcome::Denied(basic_challenge())),
        };
        let ok = ct_eq(&creds.0, username) & ct_eq(&creds.1, password);
        if !ok {
            return Ok(AuthOutcome::Denied(basic_challenge()));
        }
        match self.registry.get(username) {
            Some(user) => Ok(AuthOutcome::User(user)),
            None => Err(StatusCode::INTERNAL_SERVER_ERROR.into()),
        }
    }

    async fn proxy_auth<B>(
        &self,
        req: &Request<B>,
        factory: &dyn SessionFactory,
    ) -> DavResult<AuthOutcome> {
        let (username, raw_password) = match basic_credentials(req) {
            Some(creds) => creds,
            None => return Ok(AuthOutcome::Denied(basic_challenge())),
        };
        if !username.contains('@') || !raw_password.starts_with("password=") {
            return Ok(AuthOutcome::Denied(basic_challenge()));
        }

        // Fast path: an existing session authed with the same raw string.
        if let Some(user) = self.registry.get(&username) {
            if let Some(authed) = user.authed_password() {
                if ct_eq(&raw_password, &authed) {
                    return Ok(AuthOutcome::User(user));
                }
            }
        }

        // Serialize first-login per username.
        let lock = self.registry.login_lock(&username);
        let _guard = lock.lock().await;

        // Someone else may have logged this user in while we waited.
        if let Some(user) = self.registry.get(&username) {
            if let Some(authed) = user.authed_password() {
                if ct_eq(&raw_password, &authed) {
                    return Ok(AuthOutcome::User(user));
                }
            }
        }

        let (secret, otp) = match parse_proxy_password(&raw_password) {
            Some(parsed) => parsed,
            None => return Ok(AuthOutcome::Denied(basic_challenge())),
        };

        match factory.login(&username, &secret, otp.as_deref()).await {
            Ok(client) => {
                let user = UserState::new(username.as_str(), client);
                user.set_authed_password(&raw_password);
                UserRegistry::insert_watched(&self.registry, user.clone());
                Ok(AuthOutcome::User(user))
            }
            Err(_) => {
                self.registry.remove(&username);
                Ok(AuthOutcome::Denied(basic_challenge()))
            }
        }
    }

    fn digest_auth<B>(
        &self,
        req: &Request<B>,
        username: &str,
        password: &str,
    ) -> DavResult<AuthOutcome> {
        let value = match header_str(req, header::AUTHORIZATION) {
            Some(v) => v,
            None => return Ok(AuthOutcome::Denied(digest_challenge())),
        };
        let params = match value.strip_prefix("Digest ") {
            Some(rest) => parse_digest_params(rest),
            None => return Ok(AuthOutcome::Denied(digest_challenge())),
        };

        let get = |k: &str| params.get(k).map(|s| s.as_str());
        let (user, realm, uri, nonce, nc, cnonce, qop, response) = match (
            get("username"),
            get("realm"),
            get("uri"),
            get("nonce"),
            get("nc"),
            get("cnonce"),
            get("qop"),
            get("response"),
        ) {
            (Some(a), Some(b), Some(c), Some(d), Some(e), Some(f), Some(g), Some(h)) => {
                (a, b, c, d, e, f, g, h)
            }
            _ => return Ok(AuthOutcome::Denied(digest_challenge())),
        };

        let ha1 = md5_hex(&format!("{user}:{realm}:{password}"));
        let ha2 = md5_hex(&format!("{}:{uri}", req.method()));
        let expected = md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}"));

        let ok = ct_eq(user, username) & ct_eq(response, &expected);
        if !ok {
            return Ok(AuthOutcome::Denied(digest_challenge()));
        }
        match self.registry.get(username) {
            Some(state) => Ok(AuthOutcome::User(state)),
            None => Err(StatusCode::INTERNAL_SERVER_ERROR.into()),
        }
    }
}

fn header_str<'a, B>(req: &'a Request<B>, name: header::HeaderName) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

fn basic_credentials<B>(req: &Request<B>) -> Option<(String, String)> {
    let value = header_str(req, header::AUTHORIZATION)?;
    let b64 = value.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(b64.trim()).ok()?;
    let creds = String::from_utf8(decoded).ok()?;
    creds
        .split_once(':')
        .map(|(u, p)| (u.to_string(), p.to_string()))
}

/// `password=<secret>[&twoFactorAuthentication=<otp>]`
fn parse_proxy_password(raw: &str) -> Option<(String, Option<String>)> {
    let mut secret = None;
    let mut otp = None;
    for pair in raw.split('&') {
        match pair.split_once('=') {
            Some(("password", v)) => secret = Some(v.to_string()),
            Some(("twoFactorAuthentication", v)) => otp = Some(v.to_string()),
            _ => {}
        }
    }
    secret.map(|s| (s, otp))
}

fn parse_digest_params(raw: &str) -> std::collections::HashMap<String, String> {
    let mut out = std::collections::HashMap::new();
    for part in raw.split(',') {
        if let Some((k, v)) = part.trim().split_once('=') {
            out.insert(k.trim().to_string(), v.trim().trim_matches('"').to_string());
        }
    }
    out
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

fn ct_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn basic_challenge() -> Response<Body> {
    challenge(format!("Basic realm=\"{REALM}\", charset=\"UTF-8\""))
}

fn digest_challenge() -> Response<Body> {
    let nonce = Uuid::new_v4().simple().to_string();
    let opaque = Uuid::new_v4().simple().to_string();
    challenge(format!(
        "Digest realm=\"{REALM}\", qop=\"auth\", nonce=\"{nonce}\", opaque=\"{opaque}\""
    ))
}

fn challenge(www_authenticate: String) -> Response<Body> {
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header(header::WWW_AUTHENTICATE, www_authenticate)
        .header(header::CONTENT_LENGTH, "0")
        .body(Body::empty())
        .unwrap()
}
