//
// Error type used throughout the crate.
//
use std::error::Error;
use std::fmt;
use std::io;

use http::StatusCode;

use crate::sdk::SdkError;

pub(crate) type DavResult<T> = Result<T, DavError>;

#[derive(Debug)]
pub(crate) enum DavError {
    XmlParseError,
    InvalidPath,
    UnknownDavMethod,
    Status(StatusCode),
    Sdk(SdkError),
    IoError(io::Error),
}

impl DavError {
    pub(crate) fn statuscode(&self) -> StatusCode {
        match self {
            DavError::XmlParseError => StatusCode::BAD_REQUEST,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::Status(s) => *s,
            DavError::Sdk(e) => sdk_to_status(e),
            DavError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // must we close the connection after sending the status?
    pub(crate) fn must_close(&self) -> bool {
        matches!(self, DavError::IoError(_))
    }
}

fn sdk_to_status(e: &SdkError) -> StatusCode {
    match e {
        SdkError::NotFound => StatusCode::NOT_FOUND,
        SdkError::Unauthorized => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl fmt::Display for DavError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DavError::XmlParseError => write!(f, "XML parse error"),
            DavError::InvalidPath => write!(f, "invalid path"),
            DavError::UnknownDavMethod => write!(f, "unknown HTTP method"),
            DavError::Status(s) => write!(f, "HTTP error {s}"),
            DavError::Sdk(e) => write!(f, "SDK error: {e}"),
            DavError::IoError(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl Error for DavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DavError::Sdk(e) => Some(e),
            DavError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SdkError> for DavError {
    fn from(e: SdkError) -> Self {
        DavError::Sdk(e)
    }
}

impl From<io::Error> for DavError {
    fn from(e: io::Error) -> Self {
        DavError::IoError(e)
    }
}

impl From<StatusCode> for DavError {
    fn from(s: StatusCode) -> Self {
        DavError::Status(s)
    }
}

impl From<xml::reader::Error> for DavError {
    fn from(_: xml::reader::Error) -> Self {
        DavError::XmlParseError
    }
}

impl From<xml::writer::Error> for DavError {
    fn from(e: xml::writer::Error) -> Self {
        match e {
            xml::writer::Error::Io(e) => DavError::IoError(e),
            _ => DavError::XmlParseError,
        }
    }
}

impl From<xmltree::ParseError> for DavError {
    fn from(_: xmltree::ParseError) -> Self {
        DavError::XmlParseError
    }
}

impl From<DavError> for io::Error {
    fn from(e: DavError) -> Self {
        match e {
            DavError::IoError(e) => e,
            e => io::Error::new(io::ErrorKind::Other, e),
        }
    }
}
