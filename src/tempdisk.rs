//! Disk-scratch tier: local plaintext files serving sidecar paths
//! (`.DS_Store`, `._*`, `Thumbs.db`, ...) that must never enter the
//! encrypted store.
//!
//! The filesystem is the source of truth here; the in-memory `disk_files`
//! map is a cache that is repaired by deletion on inconsistency.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{BoxStream, StreamExt};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

// Stubborn handles (antivirus, Explorer previews) can hold a scratch file
// open for a long time; keep retrying the delete for up to 10 minutes.
const REMOVE_RETRY: Duration = Duration::from_secs(600);
const REMOVE_RETRY_INTERVAL: Duration = Duration::from_secs(1);

const READ_BUF_SIZE: usize = 65536;

// Windows device names that cannot be used as file names.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Scratch file name for `path` as uploaded by `username`: a fast content
/// hash of both, sanitized to be a portable file name.
pub(crate) fn temp_disk_id(username: &str, path: &str) -> String {
    let digest = blake3::hash(format!("{username}_{path}").as_bytes());
    sanitize_filename(digest.to_hex().as_str())
}

/// Strip control and filesystem-special characters, dodge reserved
/// Windows device names, and cap at 255 bytes.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let mut out: String = name
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect();
    let stem = out.split('.').next().unwrap_or("").to_ascii_uppercase();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        out.insert(0, '_');
    }
    while out.len() > 255 {
        out.pop();
    }
    out
}

/// The scratch directory holding one flat file per `temp_disk_id`.
#[derive(Debug, Clone)]
pub(crate) struct TempDisk {
    dir: PathBuf,
}

impl TempDisk {
    pub fn new(dir: impl Into<PathBuf>) -> TempDisk {
        TempDisk { dir: dir.into() }
    }

    /// Create the scratch directory, emptying it first. Stale scratch
    /// files must not survive a restart.
    pub async fn init(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tokio::fs::create_dir_all(&self.dir).await
    }

    pub fn path_for(&self, temp_disk_id: &str) -> PathBuf {
        self.dir.join(temp_disk_id)
    }

    /// Remove the scratch file, retrying while some other process holds
    /// it open. A missing file counts as removed.
    pub async fn remove(&self, temp_disk_id: &str) -> io::Result<()> {
        remove_file_retrying(&self.path_for(temp_disk_id), REMOVE_RETRY).await
    }

    /// Replace the scratch file with the bytes of `source`, returning the
    /// number of bytes written.
    pub async fn write_stream(
        &self,
        temp_disk_id: &str,
        mut source: BoxStream<'static, io::Result<Bytes>>,
    ) -> io::Result<u64> {
        let path = self.path_for(temp_disk_id);
        tokio::fs::create_dir_all(&self.dir).await?;
        remove_file_retrying(&path, REMOVE_RETRY).await?;

        let mut file = tokio::fs::File::create(&path).await?;
        let mut size = 0u64;
        while let Some(chunk) = source.next().await {
            let chunk = chunk?;
            size += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(size)
    }

    /// Stream the byte range `[start, end]` (inclusive) of a scratch file.
    pub async fn read_stream(
        &self,
        temp_disk_id: &str,
        start: u64,
        end: u64,
    ) -> io::Result<BoxStream<'static, io::Result<Bytes>>> {
        let mut file = tokio::fs::File::open(self.path_for(temp_disk_id)).await?;
        file.seek(SeekFrom::Start(start)).await?;
        let mut left = end - start + 1;

        let stream = async_stream::try_stream! {
            while left > 0 {
                let want = left.min(READ_BUF_SIZE as u64) as usize;
                let mut buf = BytesMut::zeroed(want);
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "scratch file truncated",
                    ))?;
                }
                buf.truncate(n);
                left -= n as u64;
                yield buf.freeze();
            }
        };
        Ok(stream.boxed())
    }

    pub async fn rename(&self, from_id: &str, to_id: &str) -> io::Result<()> {
        tokio::fs::rename(self.path_for(from_id), self.path_for(to_id)).await
    }

    pub async fn copy(&self, from_id: &str, to_id: &str) -> io::Result<()> {
        tokio::fs::copy(self.path_for(from_id), self.path_for(to_id)).await?;
        Ok(())
    }
}

async fn remove_file_retrying(path: &Path, deadline: Duration) -> io::Result<()> {
    let started = tokio::time::Instant::now();
    loop {
        match tokio::fs::remove_file(path).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                if started.elapsed() >= deadline {
                    return Err(e);
                }
                tokio::time::sleep(REMOVE_RETRY_INTERVAL).await;
            }
        }
    }
}
