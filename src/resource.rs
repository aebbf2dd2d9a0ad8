//! The server's view of a single filesystem entity at a single path.
//!
//! A path lives in exactly one of three tiers at any moment:
//!
//! - `Backend`: canonical, lives in the remote encrypted store.
//! - `Virtual`: zero-byte in-memory placeholder, created by an empty PUT
//!   so the immediately following PROPFIND/HEAD/GET sees the file.
//! - `Disk`: plaintext scratch file on local disk, for paths matching the
//!   "do not upload" glob. Never promoted to the backend.

use uuid::Uuid;

use crate::davpath::DavPath;
use crate::sdk::{ItemKind, Stats};
use crate::util::now_ms;

/// Mime type by file name, `application/octet-stream` when unknown.
pub fn mime_by_name(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Zero-byte placeholder materialized by an empty PUT.
#[derive(Debug, Clone)]
pub struct VirtualFile {
    pub uuid: String,
    pub path: String,
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub chunks: u64,
    pub version: u32,
    pub mtime_ms: u64,
    pub birthtime_ms: u64,
    pub last_modified: u64,
    pub creation: u64,
}

impl VirtualFile {
    pub fn create(path: &DavPath) -> VirtualFile {
        let now = now_ms();
        let name = path.name().to_string();
        VirtualFile {
            uuid: Uuid::new_v4().to_string(),
            mime: mime_by_name(&name),
            path: path.as_str().to_string(),
            name,
            size: 0,
            chunks: 1,
            version: 2,
            mtime_ms: now,
            birthtime_ms: now,
            last_modified: now,
            creation: now,
        }
    }

    /// The same placeholder relocated to `path` (MOVE/COPY within the
    /// virtual tier).
    pub fn relocated(&self, path: &DavPath) -> VirtualFile {
        let mut v = self.clone();
        v.name = path.name().to_string();
        v.mime = mime_by_name(&v.name);
        v.path = path.as_str().to_string();
        v
    }
}

/// Local plaintext scratch file serving a sidecar path.
#[derive(Debug, Clone)]
pub struct DiskFile {
    pub uuid: String,
    pub path: String,
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub chunks: u64,
    pub mtime_ms: u64,
    pub birthtime_ms: u64,
    pub last_modified: u64,
    pub creation: u64,
    pub temp_disk_id: String,
}

impl DiskFile {
    pub fn relocated(&self, path: &DavPath, temp_disk_id: String) -> DiskFile {
        let mut d = self.clone();
        d.name = path.name().to_string();
        d.mime = mime_by_name(&d.name);
        d.path = path.as_str().to_string();
        d.temp_disk_id = temp_disk_id;
        d
    }
}

#[derive(Debug, Clone)]
pub enum Resource {
    Backend { path: String, stats: Stats },
    Virtual(VirtualFile),
    Disk(DiskFile),
}

impl Resource {
    pub fn backend(path: &DavPath, stats: Stats) -> Resource {
        Resource::Backend {
            path: path.as_str().to_string(),
            stats,
        }
    }

    pub fn uuid(&self) -> &str {
        match self {
            Resource::Backend { stats, .. } => &stats.uuid,
            Resource::Virtual(v) => &v.uuid,
            Resource::Disk(d) => &d.uuid,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Resource::Backend { path, .. } => path,
            Resource::Virtual(v) => &v.path,
            Resource::Disk(d) => &d.path,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Resource::Backend { stats, .. } => &stats.name,
            Resource::Virtual(v) => &v.name,
            Resource::Disk(d) => &d.name,
        }
    }

    pub fn mime(&self) -> &str {
        match self {
            Resource::Backend { stats, .. } => &stats.mime,
            Resource::Virtual(v) => &v.mime,
            Resource::Disk(d) => &d.mime,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Resource::Backend { stats, .. } => stats.size,
            Resource::Virtual(v) => v.size,
            Resource::Disk(d) => d.size,
        }
    }

    pub fn mtime_ms(&self) -> u64 {
        match self {
            Resource::Backend { stats, .. } => stats.mtime_ms,
            Resource::Virtual(v) => v.mtime_ms,
            Resource::Disk(d) => d.mtime_ms,
        }
    }

    pub fn birthtime_ms(&self) -> u64 {
        match self {
            Resource::Backend { stats, .. } => stats.birthtime_ms,
            Resource::Virtual(v) => v.birthtime_ms,
            Resource::Disk(d) => d.birthtime_ms,
        }
    }

    /// Only backend resources can be directories; the other tiers hold
    /// plain files by construction.
    pub fn is_dir(&self) -> bool {
        match self {
            Resource::Backend { stats, .. } => stats.kind == ItemKind::Directory,
            _ => false,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Resource::Virtual(_))
    }

    /// `path` for files; `path + "/"` for directories, except the root
    /// which is `/`.
    pub fn url(&self) -> String {
        let path = self.path();
        if self.is_dir() && path != "/" {
            format!("{path}/")
        } else {
            path.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::ItemKind;

    fn dir_stats(name: &str) -> Stats {
        Stats {
            uuid: "u".into(),
            kind: ItemKind::Directory,
            name: name.into(),
            size: 0,
            mtime_ms: 0,
            birthtime_ms: 0,
            last_modified: 0,
            creation: 0,
            mime: String::new(),
            key: String::new(),
            bucket: String::new(),
            region: String::new(),
            version: 0,
            chunks: 0,
            hash: None,
        }
    }

    #[test]
    fn url_rules() {
        let root = Resource::backend(&DavPath::from_decoded("/"), dir_stats(""));
        assert_eq!(root.url(), "/");

        let dir = Resource::backend(&DavPath::from_decoded("/music"), dir_stats("music"));
        assert_eq!(dir.url(), "/music/");

        let v = Resource::Virtual(VirtualFile::create(&DavPath::from_decoded("/a.txt")));
        assert_eq!(v.url(), "/a.txt");
        assert_eq!(v.mime(), "text/plain");
        assert_eq!(v.size(), 0);
    }

    #[test]
    fn relocate_virtual() {
        let v = VirtualFile::create(&DavPath::from_decoded("/a.txt"));
        let moved = v.relocated(&DavPath::from_decoded("/b.png"));
        assert_eq!(moved.name, "b.png");
        assert_eq!(moved.mime, "image/png");
        assert_eq!(moved.uuid, v.uuid);
    }
}
