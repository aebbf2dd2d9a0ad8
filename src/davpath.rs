//! Percent-decoded, normalized request paths.
//!
//! All paths inside the gateway are absolute POSIX paths, decoded exactly
//! once on entry, with the trailing slash stripped unless the path is the
//! root. `DavPath` is the only way handlers obtain a path from a request,
//! so the invariant holds everywhere downstream.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::errors::DavError;

// Characters that need escaping when a path is emitted as an URL or href.
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'{')
    .add(b'}');

/// Percent-encode a decoded path or name for use in an href.
pub(crate) fn encode_href(s: &str) -> String {
    utf8_percent_encode(s, PATH_ENCODE_SET).to_string()
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DavPath {
    path: String,
}

impl fmt::Debug for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.path)
    }
}

impl fmt::Display for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl DavPath {
    /// Build from the path component of a request URI.
    pub(crate) fn from_uri(uri: &http::Uri) -> Result<DavPath, DavError> {
        DavPath::from_str(uri.path())
    }

    /// Build from a raw, still percent-encoded path string.
    pub(crate) fn from_str(raw: &str) -> Result<DavPath, DavError> {
        if !raw.starts_with('/') {
            return Err(DavError::InvalidPath);
        }
        let decoded = percent_decode_str(raw)
            .decode_utf8()
            .map_err(|_| DavError::InvalidPath)?;
        Ok(DavPath::from_decoded(&decoded))
    }

    /// Build from an already-decoded absolute path.
    pub(crate) fn from_decoded(decoded: &str) -> DavPath {
        let mut path = decoded.to_string();
        while path.len() > 1 && path.ends_with('/') {
            path.pop();
        }
        if path.is_empty() {
            path.push('/');
        }
        DavPath { path }
    }

    pub(crate) fn is_root(&self) -> bool {
        self.path == "/"
    }

    /// The decoded path, no trailing slash except for root.
    pub(crate) fn as_str(&self) -> &str {
        &self.path
    }

    /// Last path segment; empty for the root.
    pub(crate) fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    pub(crate) fn parent(&self) -> DavPath {
        match self.path.rfind('/') {
            Some(0) | None => DavPath { path: "/".to_string() },
            Some(idx) => DavPath {
                path: self.path[..idx].to_string(),
            },
        }
    }

    /// Child path `self/<name>`.
    pub(crate) fn join(&self, name: &str) -> DavPath {
        let path = if self.is_root() {
            format!("/{name}")
        } else {
            format!("{}/{name}", self.path)
        };
        DavPath { path }
    }

    /// True if any segment is a bare `..` (or the path starts with `./`).
    /// Used to refuse traversal in `Destination` headers.
    pub(crate) fn is_traversal(&self) -> bool {
        self.path.starts_with("./") || self.path.split('/').any(|seg| seg == "..")
    }

    /// Percent-encoded form, for `Location`-style headers and hrefs.
    pub(crate) fn as_url_string(&self) -> String {
        utf8_percent_encode(&self.path, PATH_ENCODE_SET).to_string()
    }
}
