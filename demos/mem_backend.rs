//! A throwaway in-memory backend so the demo servers can be mounted
//! without real cloud credentials. Every "account" starts empty and
//! everything is lost when the process exits.

// each demo uses a subset of this module
#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use filen_webdav::sdk::{
    CloudClient, FileMetadata, ItemKind, SdkByteStream, SdkError, SdkFuture, SessionFactory,
    StatFs, Stats,
};

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn stats(name: &str, kind: ItemKind, size: u64) -> Stats {
    let now = now_ms();
    Stats {
        uuid: Uuid::new_v4().to_string(),
        kind,
        name: name.to_string(),
        size,
        mtime_ms: now,
        birthtime_ms: now,
        last_modified: now,
        creation: now,
        mime: mime_guess::from_path(name)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string(),
        key: String::new(),
        bucket: "demo".to_string(),
        region: "local".to_string(),
        version: 2,
        chunks: size.div_ceil(1024 * 1024).max(1),
        hash: None,
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

pub struct MemBackend {
    dirs: Mutex<HashMap<String, Stats>>,
    files: Mutex<HashMap<String, Stats>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    pw_tx: broadcast::Sender<()>,
}

impl MemBackend {
    pub fn new() -> Arc<MemBackend> {
        let mut dirs = HashMap::new();
        dirs.insert("/".to_string(), stats("", ItemKind::Directory, 0));
        let (pw_tx, _) = broadcast::channel(1);
        Arc::new(MemBackend {
            dirs: Mutex::new(dirs),
            files: Mutex::new(HashMap::new()),
            blobs: Mutex::new(HashMap::new()),
            pw_tx,
        })
    }
}

impl CloudClient for MemBackend {
    fn stat<'a>(&'a self, path: &'a str) -> SdkFuture<'a, Stats> {
        Box::pin(async move {
            if let Some(s) = self.dirs.lock().get(path) {
                return Ok(s.clone());
            }
            if let Some(s) = self.files.lock().get(path) {
                return Ok(s.clone());
            }
            Err(SdkError::NotFound)
        })
    }

    fn readdir<'a>(&'a self, path: &'a str) -> SdkFuture<'a, Vec<String>> {
        Box::pin(async move {
            if !self.dirs.lock().contains_key(path) {
                return Err(SdkError::NotFound);
            }
            let mut names = Vec::new();
            for p in self.dirs.lock().keys() {
                if p != "/" && parent_of(p) == path {
                    names.push(p.rsplit('/').next().unwrap().to_string());
                }
            }
            for p in self.files.lock().keys() {
                if parent_of(p) == path {
                    names.push(p.rsplit('/').next().unwrap().to_string());
                }
            }
            Ok(names)
        })
    }

    fn mkdir<'a>(&'a self, path: &'a str) -> SdkFuture<'a, ()> {
        Box::pin(async move {
            if self.files.lock().contains_key(path) {
                return Err(SdkError::Other("a file with that name exists".into()));
            }
            let mut dirs = self.dirs.lock();
            if !dirs.contains_key(path) {
                let name = path.rsplit('/').next().unwrap().to_string();
                dirs.insert(path.to_string(), stats(&name, ItemKind::Directory, 0));
            }
            Ok(())
        })
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> SdkFuture<'a, ()> {
        Box::pin(async move {
            let new_name = to.rsplit('/').next().unwrap().to_string();
            let moved_file = self.files.lock().remove(from);
            if let Some(mut s) = moved_file {
                s.name = new_name;
                self.files.lock().insert(to.to_string(), s);
                return Ok(());
            }
            let mut dirs = self.dirs.lock();
            if let Some(mut s) = dirs.remove(from) {
                s.name = new_name;
                dirs.insert(to.to_string(), s);
                let prefix = format!("{from}/");
                let moved: Vec<String> =
                    dirs.keys().filter(|p| p.starts_with(&prefix)).cloned().collect();
                for p in moved {
                    let s = dirs.remove(&p).unwrap();
                    dirs.insert(format!("{to}/{}", &p[prefix.len()..]), s);
                }
                drop(dirs);
                let mut files = self.files.lock();
                let moved: Vec<String> =
                    files.keys().filter(|p| p.starts_with(&prefix)).cloned().collect();
                for p in moved {
                    let s = files.remove(&p).unwrap();
                    files.insert(format!("{to}/{}", &p[prefix.len()..]), s);
                }
                return Ok(());
            }
            Err(SdkError::NotFound)
        })
    }

    fn cp<'a>(&'a self, from: &'a str, to: &'a str) -> SdkFuture<'a, ()> {
        Box::pin(async move {
            let source = self.files.lock().get(from).cloned();
            match source {
                Some(mut s) => {
                    let blob = self.blobs.lock().get(&s.uuid).cloned().unwrap_or_default();
                    s.uuid = Uuid::new_v4().to_string();
                    s.name = to.rsplit('/').next().unwrap().to_string();
                    self.blobs.lock().insert(s.uuid.clone(), blob);
                    self.files.lock().insert(to.to_string(), s);
                    Ok(())
                }
                None => Err(SdkError::NotFound),
            }
        })
    }

    fn unlink<'a>(&'a self, path: &'a str, _permanent: bool) -> SdkFuture<'a, ()> {
        Box::pin(async move {
            if self.files.lock().remove(path).is_some() {
                return Ok(());
            }
            let mut dirs = self.dirs.lock();
            if dirs.remove(path).is_some() {
                let prefix = format!("{path}/");
                dirs.retain(|p, _| !p.starts_with(&prefix));
                self.files.lock().retain(|p, _| !p.starts_with(&prefix));
                return Ok(());
            }
            Err(SdkError::NotFound)
        })
    }

    fn statfs(&self) -> SdkFuture<'_, StatFs> {
        Box::pin(async move {
            let used: u64 = self.blobs.lock().values().map(|b| b.len() as u64).sum();
            Ok(StatFs {
                used,
                max: 10 * 1024 * 1024 * 1024,
            })
        })
    }

    fn upload_file_stream<'a>(
        &'a self,
        mut source: SdkByteStream,
        parent: &'a str,
        name: &'a str,
    ) -> SdkFuture<'a, Stats> {
        Box::pin(async move {
            let parent_path = self
                .dirs
                .lock()
                .iter()
                .find(|(_, s)| s.uuid == parent)
                .map(|(p, _)| p.clone())
                .ok_or_else(|| SdkError::Other("unknown parent".into()))?;
            let mut data = Vec::new();
            while let Some(chunk) = source.next().await {
                data.extend_from_slice(&chunk.map_err(SdkError::Io)?);
            }
            let path = if parent_path == "/" {
                format!("/{name}")
            } else {
                format!("{parent_path}/{name}")
            };
            let s = stats(name, ItemKind::File, data.len() as u64);
            self.blobs.lock().insert(s.uuid.clone(), data);
            self.files.lock().insert(path, s.clone());
            Ok(s)
        })
    }

    fn download_file_stream<'a>(
        &'a self,
        file: &'a Stats,
        start: u64,
        end: u64,
    ) -> SdkFuture<'a, SdkByteStream> {
        Box::pin(async move {
            let blob = self
                .blobs
                .lock()
                .get(&file.uuid)
                .cloned()
                .ok_or(SdkError::NotFound)?;
            let end = (end as usize).min(blob.len().saturating_sub(1));
            let slice = blob[start as usize..=end].to_vec();
            let stream: SdkByteStream = stream::iter([Ok::<_, io::Error>(Bytes::from(slice))]).boxed();
            Ok(stream)
        })
    }

    fn edit_file_metadata<'a>(&'a self, uuid: &'a str, metadata: FileMetadata) -> SdkFuture<'a, ()> {
        Box::pin(async move {
            let mut files = self.files.lock();
            for s in files.values_mut() {
                if s.uuid == uuid {
                    s.last_modified = metadata.last_modified;
                    s.mtime_ms = metadata.last_modified;
                    s.creation = metadata.creation;
                    s.birthtime_ms = metadata.creation;
                    return Ok(());
                }
            }
            Err(SdkError::NotFound)
        })
    }

    fn remove_cached_item(&self, path: &str) {
        self.files.lock().remove(path);
    }

    fn add_cached_item(&self, path: &str, item: Stats) {
        self.files.lock().insert(path.to_string(), item);
    }

    fn upload_chunk_size(&self) -> u64 {
        1024 * 1024
    }

    fn password_changed(&self) -> broadcast::Receiver<()> {
        self.pw_tx.subscribe()
    }
}

/// Accepts any email/password pair and hands out a fresh empty account.
pub struct AnyLogin;

impl SessionFactory for AnyLogin {
    fn login<'a>(
        &'a self,
        email: &'a str,
        _password: &'a str,
        _two_factor_code: Option<&'a str>,
    ) -> SdkFuture<'a, Arc<dyn CloudClient>> {
        Box::pin(async move {
            println!("new demo session for {email}");
            Ok(MemBackend::new() as Arc<dyn CloudClient>)
        })
    }
}
