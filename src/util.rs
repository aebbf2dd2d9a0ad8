use std::io::{Cursor, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use headers::Header;
use time::format_description::well_known::Rfc2822;
use time::macros::format_description;

use crate::errors::DavError;
use crate::DavResult;

/// HTTP and webdav methods the gateway understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DavMethod {
    Head,
    Get,
    Put,
    Options,
    PropFind,
    PropPatch,
    MkCol,
    Copy,
    Move,
    Delete,
    Lock,
    Unlock,
}

// translate method into our own enum that has webdav methods as well.
// POST is aliased to PUT: clients that probe with POST get PUT semantics.
pub fn dav_method(m: &http::Method) -> DavResult<DavMethod> {
    let m = match *m {
        http::Method::HEAD => DavMethod::Head,
        http::Method::GET => DavMethod::Get,
        http::Method::PUT => DavMethod::Put,
        http::Method::POST => DavMethod::Put,
        http::Method::DELETE => DavMethod::Delete,
        http::Method::OPTIONS => DavMethod::Options,
        _ => match m.as_str() {
            "PROPFIND" => DavMethod::PropFind,
            "PROPPATCH" => DavMethod::PropPatch,
            "MKCOL" => DavMethod::MkCol,
            "COPY" => DavMethod::Copy,
            "MOVE" => DavMethod::Move,
            "LOCK" => DavMethod::Lock,
            "UNLOCK" => DavMethod::Unlock,
            _ => {
                return Err(DavError::UnknownDavMethod);
            }
        },
    };
    Ok(m)
}

/// Current wall clock in milliseconds since the epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn ms_to_systemtime(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

pub fn systemtime_to_httpdate(t: SystemTime) -> String {
    let d = headers::Date::from(t);
    let mut v = Vec::new();
    d.encode(&mut v);
    v[0].to_str().unwrap().to_owned()
}

/// RFC 1123 `ddd, DD MMM YYYY HH:mm:ss GMT` of a millisecond timestamp.
pub fn ms_to_httpdate(ms: u64) -> String {
    systemtime_to_httpdate(ms_to_systemtime(ms))
}

// `Sun, 06 Nov 1994 08:49:37 GMT`, the fixed-zone variant that Rfc2822
// parsing does not accept.
const HTTPDATE_FMT: &[time::format_description::FormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Parse a date as sent by PROPPATCH clients. Accepts the RFC 1123 form
/// as well as RFC 2822 with a numeric zone.
pub fn parse_httpdate(s: &str) -> Option<u64> {
    let s = s.trim();
    let dt = time::PrimitiveDateTime::parse(s, HTTPDATE_FMT)
        .map(|t| t.assume_utc())
        .or_else(|_| time::OffsetDateTime::parse(s, &Rfc2822))
        .ok()?;
    let ms = (dt.unix_timestamp_nanos() / 1_000_000) as i64;
    (ms >= 0).then_some(ms as u64)
}

// A buffer that implements "Write".
#[derive(Clone)]
pub struct MemBuffer(Cursor<Vec<u8>>);

impl MemBuffer {
    pub fn new() -> MemBuffer {
        MemBuffer(Cursor::new(Vec::new()))
    }

    pub fn take(&mut self) -> Bytes {
        let buf = std::mem::take(self.0.get_mut());
        self.0.set_position(0);
        Bytes::from(buf)
    }
}

impl Write for MemBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
