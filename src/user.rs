//! Per-user state and the user registry.
//!
//! Every authenticated username owns one `UserState`: the backend session
//! handle, the virtual and disk tier maps, a per-path mutex table and a
//! small TTL metadata cache. Single-tenant servers seed exactly one entry
//! at startup; proxy servers fill the registry lazily on first login and
//! evict an entry when the backend reports a password change.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::{Mutex, RwLock};

use crate::davpath::DavPath;
use crate::errors::DavResult;
use crate::resource::{DiskFile, Resource, VirtualFile};
use crate::sdk::{CloudClient, SdkError, StatFs};

const STATFS_TTL: Duration = Duration::from_secs(60);
const CACHE_SLOTS: usize = 8;

pub struct UserState {
    pub username: String,
    pub client: Arc<dyn CloudClient>,
    virtual_files: Mutex<HashMap<String, VirtualFile>>,
    disk_files: Mutex<HashMap<String, DiskFile>>,
    // Extension point: per-path serialization. Entries are created on
    // first acquisition and retained.
    path_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    statfs_cache: Mutex<LruCache<&'static str, (Instant, StatFs)>>,
    authed_password: Mutex<Option<String>>,
}

impl UserState {
    pub fn new(username: impl Into<String>, client: Arc<dyn CloudClient>) -> Arc<UserState> {
        Arc::new(UserState {
            username: username.into(),
            client,
            virtual_files: Mutex::new(HashMap::new()),
            disk_files: Mutex::new(HashMap::new()),
            path_locks: Mutex::new(HashMap::new()),
            statfs_cache: Mutex::new(LruCache::new(NonZeroUsize::new(CACHE_SLOTS).unwrap())),
            authed_password: Mutex::new(None),
        })
    }

    /// Map a decoded path to the resource serving it, checking the
    /// virtual tier, then the disk tier, then the backend. Backend
    /// "not found" surfaces as `None`; other backend errors propagate.
    /// Never mutates the tier maps.
    pub async fn resolve(&self, path: &DavPath) -> DavResult<Option<Resource>> {
        if let Some(v) = self.virtual_files.lock().get(path.as_str()) {
            return Ok(Some(Resource::Virtual(v.clone())));
        }
        if let Some(d) = self.disk_files.lock().get(path.as_str()) {
            return Ok(Some(Resource::Disk(d.clone())));
        }
        match self.client.stat(path.as_str()).await {
            Ok(stats) => Ok(Some(Resource::backend(path, stats))),
            Err(SdkError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn virtual_insert(&self, file: VirtualFile) {
        self.virtual_files.lock().insert(file.path.clone(), file);
    }

    pub fn virtual_remove(&self, path: &DavPath) -> Option<VirtualFile> {
        self.virtual_files.lock().remove(path.as_str())
    }

    pub fn disk_insert(&self, file: DiskFile) {
        self.disk_files.lock().insert(file.path.clone(), file);
    }

    pub fn disk_remove(&self, path: &DavPath) -> Option<DiskFile> {
        self.disk_files.lock().remove(path.as_str())
    }

    /// Virtual and disk entries directly under `parent`, for the
    /// PROPFIND overlay.
    pub fn overlay_children(&self, parent: &DavPath) -> Vec<Resource> {
        let mut out = Vec::new();
        {
            let map = self.virtual_files.lock();
            out.extend(
                map.values()
                    .filter(|v| parent_of(&v.path) == parent.as_str())
                    .map(|v| Resource::Virtual(v.clone())),
            );
        }
        {
            let map = self.disk_files.lock();
            out.extend(
                map.values()
                    .filter(|d| parent_of(&d.path) == parent.as_str())
                    .map(|d| Resource::Disk(d.clone())),
            );
        }
        out
    }

    #[allow(dead_code)]
    pub fn path_lock(&self, path: &DavPath) -> Arc<tokio::sync::Mutex<()>> {
        self.path_locks
            .lock()
            .entry(path.as_str().to_string())
            .or_default()
            .clone()
    }

    /// Account capacity and usage, cached for 60 seconds.
    pub async fn statfs(&self) -> DavResult<StatFs> {
        if let Some((at, cached)) = self.statfs_cache.lock().get("statfs") {
            if at.elapsed() < STATFS_TTL {
                return Ok(*cached);
            }
        }
        let fresh = self.client.statfs().await?;
        self.statfs_cache.lock().put("statfs", (Instant::now(), fresh));
        Ok(fresh)
    }

    pub fn authed_password(&self) -> Option<String> {
        self.authed_password.lock().clone()
    }

    pub fn set_authed_password(&self, raw: &str) {
        *self.authed_password.lock() = Some(raw.to_string());
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// All live `UserState`s, keyed by username.
pub struct UserRegistry {
    users: RwLock<HashMap<String, Arc<UserState>>>,
    // Serializes first-login per username in proxy mode.
    login_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserRegistry {
    pub fn new() -> Arc<UserRegistry> {
        Arc::new(UserRegistry {
            users: RwLock::new(HashMap::new()),
            login_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn get(&self, username: &str) -> Option<Arc<UserState>> {
        self.users.read().get(username).cloned()
    }

    pub fn remove(&self, username: &str) {
        self.users.write().remove(username);
    }

    pub fn login_lock(&self, username: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.login_locks
            .lock()
            .entry(username.to_string())
            .or_default()
            .clone()
    }

    /// Insert a user entry without watching for backend events. Used for
    /// the single seeded entry of single-tenant servers, which lives for
    /// the process lifetime.
    pub fn insert(&self, state: Arc<UserState>) {
        self.users.write().insert(state.username.clone(), state);
    }

    /// Insert a freshly authenticated user and evict it again when the
    /// backend reports that the account password changed.
    pub fn insert_watched(registry: &Arc<UserRegistry>, state: Arc<UserState>) {
        let username = state.username.clone();
        let mut rx = state.client.password_changed();
        registry.users.write().insert(username.clone(), state);

        let registry = Arc::downgrade(registry);
        tokio::spawn(async move {
            if rx.recv().await.is_ok() {
                if let Some(registry) = registry.upgrade() {
                    debug!("password changed, evicting session of {username}");
                    registry.remove(&username);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_of_paths() {
        assert_eq!(parent_of("/a.txt"), "/");
        assert_eq!(parent_of("/d/e/f"), "/d/e");
    }
}
