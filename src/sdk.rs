//! Interface to the client-side-encrypting cloud storage SDK.
//!
//! The gateway never implements cryptography or chunk transfer itself; it
//! drives an already-authenticated SDK session through this trait. The
//! methods mirror the SDK's filesystem surface: `stat`, `readdir`, `mkdir`,
//! `rename`, `cp`, `unlink`, `statfs`, streamed upload/download, and the
//! in-memory metadata index that backs fast `stat` calls.
//!
//! Trait methods return boxed futures so the trait stays object-safe and
//! sessions can be shared as `Arc<dyn CloudClient>`.

use std::error::Error;
use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use tokio::sync::broadcast;

pub type SdkFuture<'a, T> = BoxFuture<'a, Result<T, SdkError>>;

/// Byte stream used for both upload sources and download sinks.
pub type SdkByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug)]
pub enum SdkError {
    /// The path does not exist in the remote store.
    NotFound,
    /// The session is no longer valid.
    Unauthorized,
    /// Login was refused (bad email/password/2FA).
    LoginFailed,
    Io(io::Error),
    Other(String),
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdkError::NotFound => write!(f, "not found"),
            SdkError::Unauthorized => write!(f, "unauthorized"),
            SdkError::LoginFailed => write!(f, "login failed"),
            SdkError::Io(e) => write!(f, "io: {e}"),
            SdkError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl Error for SdkError {}

impl From<io::Error> for SdkError {
    fn from(e: io::Error) -> Self {
        SdkError::Io(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    File,
    Directory,
}

/// Metadata of one remote item, as reported by the SDK.
///
/// Directories carry zeroed/empty values in the file-only fields
/// (`size`, `chunks`, `key`, `bucket`, `region`, `version`, `hash`).
#[derive(Debug, Clone)]
pub struct Stats {
    pub uuid: String,
    pub kind: ItemKind,
    pub name: String,
    pub size: u64,
    pub mtime_ms: u64,
    pub birthtime_ms: u64,
    pub last_modified: u64,
    pub creation: u64,
    pub mime: String,
    pub key: String,
    pub bucket: String,
    pub region: String,
    pub version: u32,
    pub chunks: u64,
    pub hash: Option<String>,
}

impl Stats {
    pub fn is_dir(&self) -> bool {
        self.kind == ItemKind::Directory
    }
}

/// Aggregated capacity and usage of the account, in bytes.
#[derive(Debug, Clone, Copy)]
pub struct StatFs {
    pub used: u64,
    pub max: u64,
}

/// Mutable file metadata accepted by `edit_file_metadata`.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub name: String,
    pub key: String,
    pub last_modified: u64,
    pub creation: u64,
    pub hash: Option<String>,
    pub size: u64,
    pub mime: String,
}

impl From<&Stats> for FileMetadata {
    fn from(s: &Stats) -> Self {
        FileMetadata {
            name: s.name.clone(),
            key: s.key.clone(),
            last_modified: s.last_modified,
            creation: s.creation,
            hash: s.hash.clone(),
            size: s.size,
            mime: s.mime.clone(),
        }
    }
}

/// One authenticated SDK session.
///
/// Paths are absolute POSIX paths without a trailing slash (`/` is the
/// root). Every method may suspend on network IO.
pub trait CloudClient: Send + Sync {
    /// Stat a remote path. `SdkError::NotFound` if it does not exist.
    fn stat<'a>(&'a self, path: &'a str) -> SdkFuture<'a, Stats>;

    /// List the names (not paths) of a directory's children.
    fn readdir<'a>(&'a self, path: &'a str) -> SdkFuture<'a, Vec<String>>;

    /// Create a directory. Idempotent: an existing directory with the
    /// same name and parent is de-duplicated by the backend.
    fn mkdir<'a>(&'a self, path: &'a str) -> SdkFuture<'a, ()>;

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> SdkFuture<'a, ()>;

    fn cp<'a>(&'a self, from: &'a str, to: &'a str) -> SdkFuture<'a, ()>;

    /// Remove a file or directory. With `permanent == false` the item is
    /// moved to the account trash instead.
    fn unlink<'a>(&'a self, path: &'a str, permanent: bool) -> SdkFuture<'a, ()>;

    fn statfs(&self) -> SdkFuture<'_, StatFs>;

    /// Stream `source` into a new (or replaced) file `name` under the
    /// directory with uuid `parent`. Encryption and chunking happen
    /// inside the SDK; the returned `Stats` describe the uploaded file.
    fn upload_file_stream<'a>(
        &'a self,
        source: SdkByteStream,
        parent: &'a str,
        name: &'a str,
    ) -> SdkFuture<'a, Stats>;

    /// Open a decrypting download stream over the byte range
    /// `[start, end]` (inclusive) of the file described by `file`.
    /// Dropping the stream releases the underlying chunk reader.
    fn download_file_stream<'a>(
        &'a self,
        file: &'a Stats,
        start: u64,
        end: u64,
    ) -> SdkFuture<'a, SdkByteStream>;

    fn edit_file_metadata<'a>(
        &'a self,
        uuid: &'a str,
        metadata: FileMetadata,
    ) -> SdkFuture<'a, ()>;

    /// Drop `path` from the SDK's in-memory metadata index.
    fn remove_cached_item(&self, path: &str);

    /// Insert `item` into the SDK's in-memory metadata index under `path`,
    /// so that an immediately following `stat` sees it.
    fn add_cached_item(&self, path: &str, item: Stats);

    /// The SDK's fixed upload chunk size in bytes.
    fn upload_chunk_size(&self) -> u64;

    /// Subscribe to the backend "password changed" event for this session.
    fn password_changed(&self) -> broadcast::Receiver<()>;
}

/// Opens new SDK sessions from credentials. Used in proxy mode, where the
/// Basic password carries the account password and optional 2FA code.
pub trait SessionFactory: Send + Sync {
    fn login<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
        two_factor_code: Option<&'a str>,
    ) -> SdkFuture<'a, Arc<dyn CloudClient>>;
}
