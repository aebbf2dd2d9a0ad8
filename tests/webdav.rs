//! End-to-end webdav scenarios, driven through the handler with an
//! in-memory backend standing in for the SDK.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use http::{Request, Response, StatusCode};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use filen_webdav::body::Body;
use filen_webdav::sdk::{
    CloudClient, FileMetadata, ItemKind, SdkByteStream, SdkError, SdkFuture, SessionFactory,
    StatFs, Stats,
};
use filen_webdav::{AuthMode, ServerConfig, Tenancy, WebDavServer};

// ---------------------------------------------------------------- backend

fn dir_stats(name: &str) -> Stats {
    Stats {
        uuid: Uuid::new_v4().to_string(),
        kind: ItemKind::Directory,
        name: name.to_string(),
        size: 0,
        mtime_ms: 1_700_000_000_000,
        birthtime_ms: 1_700_000_000_000,
        last_modified: 1_700_000_000_000,
        creation: 1_700_000_000_000,
        mime: String::new(),
        key: String::new(),
        bucket: String::new(),
        region: String::new(),
        version: 0,
        chunks: 0,
        hash: None,
    }
}

fn file_stats(name: &str, size: u64) -> Stats {
    Stats {
        uuid: Uuid::new_v4().to_string(),
        kind: ItemKind::File,
        name: name.to_string(),
        size,
        mtime_ms: 1_700_000_000_000,
        birthtime_ms: 1_700_000_000_000,
        last_modified: 1_700_000_000_000,
        creation: 1_700_000_000_000,
        mime: mime_guess::from_path(name)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string(),
        key: "filekey".to_string(),
        bucket: "bucket".to_string(),
        region: "de-1".to_string(),
        version: 2,
        chunks: size.div_ceil(1024).max(1),
        hash: None,
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// In-memory stand-in for the encrypting SDK. The `files` map doubles as
/// the SDK's metadata index: uploads only become `stat`-visible once the
/// handler rewrites the index.
struct MemBackend {
    dirs: Mutex<HashMap<String, Stats>>,
    files: Mutex<HashMap<String, Stats>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    uploads: AtomicUsize,
    unlinks: Mutex<Vec<(String, bool)>>,
    pw_tx: broadcast::Sender<()>,
}

impl MemBackend {
    fn new() -> Arc<MemBackend> {
        let mut dirs = HashMap::new();
        dirs.insert("/".to_string(), dir_stats(""));
        let (pw_tx, _) = broadcast::channel(1);
        Arc::new(MemBackend {
            dirs: Mutex::new(dirs),
            files: Mutex::new(HashMap::new()),
            blobs: Mutex::new(HashMap::new()),
            uploads: AtomicUsize::new(0),
            unlinks: Mutex::new(Vec::new()),
            pw_tx,
        })
    }

    fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    fn trigger_password_changed(&self) {
        let _ = self.pw_tx.send(());
    }

    fn dir_path_by_uuid(&self, uuid: &str) -> Option<String> {
        self.dirs
            .lock()
            .iter()
            .find(|(_, s)| s.uuid == uuid)
            .map(|(p, _)| p.clone())
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
                dirs.insert(path.to_string(), dir_stats(&name));
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

    fn unlink<'a>(&'a self, path: &'a str, permanent: bool) -> SdkFuture<'a, ()> {
        Box::pin(async move {
            self.unlinks.lock().push((path.to_string(), permanent));
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
            Ok(StatFs {
                used: 42,
                max: 1_000_000,
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
            self.dir_path_by_uuid(parent)
                .ok_or_else(|| SdkError::Other("unknown parent".into()))?;
            let mut data = Vec::new();
            while let Some(chunk) = source.next().await {
                data.extend_from_slice(&chunk.map_err(SdkError::Io)?);
            }
            self.uploads.fetch_add(1, Ordering::SeqCst);
            let stats = file_stats(name, data.len() as u64);
            self.blobs.lock().insert(stats.uuid.clone(), data);
            Ok(stats)
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
            let slice = blob[start as usize..=(end as usize).min(blob.len() - 1)].to_vec();
            let stream: BoxStream<'static, io::Result<Bytes>> =
                stream::iter([Ok(Bytes::from(slice))]).boxed();
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
        1024
    }

    fn password_changed(&self) -> broadcast::Receiver<()> {
        self.pw_tx.subscribe()
    }
}

struct MemFactory {
    logins: AtomicUsize,
    last_backend: Mutex<Option<Arc<MemBackend>>>,
}

impl MemFactory {
    fn new() -> Arc<MemFactory> {
        Arc::new(MemFactory {
            logins: AtomicUsize::new(0),
            last_backend: Mutex::new(None),
        })
    }
}

impl SessionFactory for MemFactory {
    fn login<'a>(
        &'a self,
        _email: &'a str,
        password: &'a str,
        two_factor_code: Option<&'a str>,
    ) -> SdkFuture<'a, Arc<dyn CloudClient>> {
        Box::pin(async move {
            if password != "s3cret" || two_factor_code != Some("123456") {
                return Err(SdkError::LoginFailed);
            }
            self.logins.fetch_add(1, Ordering::SeqCst);
            let backend = MemBackend::new();
            *self.last_backend.lock() = Some(backend.clone());
            Ok(backend as Arc<dyn CloudClient>)
        })
    }
}

// ---------------------------------------------------------------- harness

struct Harness {
    server: WebDavServer,
    backend: Arc<MemBackend>,
    auth: String,
    _scratch: tempfile::TempDir,
}

fn single_tenant(globs: Vec<String>) -> Harness {
    let scratch = tempfile::tempdir().unwrap();
    let backend = MemBackend::new();
    let config = ServerConfig::new()
        .user("admin", "hunter2")
        .temp_files_to_store_on_disk(globs)
        .temp_disk_dir(scratch.path().join("tempDiskFiles"));
    let server = WebDavServer::new(
        config,
        Tenancy::SingleTenant {
            client: backend.clone() as Arc<dyn CloudClient>,
        },
    )
    .unwrap();
    Harness {
        server,
        backend,
        auth: basic_auth("admin", "hunter2"),
        _scratch: scratch,
    }
}

fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
}

impl Harness {
    async fn request(
        &self,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
        body: Option<&[u8]>,
    ) -> Response<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(path)
            .header("Host", "nas.local:1900")
            .header("Authorization", &self.auth);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        let body = match body {
            Some(data) => hyper::Body::from(data.to_vec()),
            None => hyper::Body::empty(),
        };
        self.server
            .handler()
            .handle(req.body(body).unwrap(), None)
            .await
    }

    async fn put(&self, path: &str, body: &[u8]) -> Response<Body> {
        self.request("PUT", path, &[], Some(body)).await
    }

    async fn get(&self, path: &str) -> Response<Body> {
        self.request("GET", path, &[], None).await
    }
}

async fn body_bytes(res: Response<Body>) -> Vec<u8> {
    hyper::body::to_bytes(res.into_body()).await.unwrap().to_vec()
}

async fn body_string(res: Response<Body>) -> String {
    String::from_utf8(body_bytes(res).await).unwrap()
}

fn header<'a>(res: &'a Response<Body>, name: &str) -> &'a str {
    res.headers().get(name).unwrap().to_str().unwrap()
}

// ---------------------------------------------------------------- tests

#[tokio::test]
async fn empty_put_materializes_virtual_file() {
    let h = single_tenant(vec![]);

    let res = h.put("/a.txt", b"").await;
    assert_eq!(res.status(), StatusCode::CREATED);

    // the placeholder shows up in the listing with size 0
    let res = h.request("PROPFIND", "/", &[("Depth", "1")], None).await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    let xml = body_string(res).await;
    assert!(xml.contains("<D:href>/a.txt</D:href>"));
    assert!(xml.contains("<D:getcontentlength>0</D:getcontentlength>"));

    // GET answers the probe with an empty 200
    let res = h.get("/a.txt").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header(&res, "Content-Length"), "0");
    assert!(body_bytes(res).await.is_empty());

    // nothing was uploaded
    assert_eq!(h.backend.upload_count(), 0);
}

#[tokio::test]
async fn put_get_roundtrip_and_ranges() {
    let h = single_tenant(vec![]);

    let res = h.put("/a.txt", b"hello").await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = h.get("/a.txt").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header(&res, "Content-Length"), "5");
    assert_eq!(header(&res, "Content-Type"), "text/plain");
    assert_eq!(body_bytes(res).await, b"hello");

    let res = h
        .request("HEAD", "/a.txt", &[("Range", "bytes=0-2")], None)
        .await;
    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&res, "Content-Range"), "bytes 0-2/5");
    assert_eq!(header(&res, "Content-Length"), "3");
    assert!(body_bytes(res).await.is_empty());

    let res = h
        .request("GET", "/a.txt", &[("Range", "bytes=1-3")], None)
        .await;
    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(body_bytes(res).await, b"ell");

    // out-of-bounds and inverted ranges
    let res = h
        .request("GET", "/a.txt", &[("Range", "bytes=3-7")], None)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let res = h
        .request("GET", "/a.txt", &[("Range", "bytes=4-2")], None)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_then_nonempty_put_promotes_to_backend() {
    let h = single_tenant(vec![]);

    h.put("/a.txt", b"").await;
    let res = h.put("/a.txt", b"bytes!").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(h.backend.upload_count(), 1);

    let res = h.get("/a.txt").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_bytes(res).await, b"bytes!");

    // the virtual placeholder is gone: the listing carries the real size
    let res = h.request("PROPFIND", "/a.txt", &[("Depth", "0")], None).await;
    let xml = body_string(res).await;
    assert!(xml.contains("<D:getcontentlength>6</D:getcontentlength>"));
}

#[tokio::test]
async fn mkcol_put_propfind_move_scenario() {
    let h = single_tenant(vec![]);

    assert_eq!(h.request("MKCOL", "/d", &[], None).await.status(), StatusCode::CREATED);
    assert_eq!(h.request("MKCOL", "/d/e", &[], None).await.status(), StatusCode::CREATED);
    // lenient MKCOL on an existing directory
    assert_eq!(h.request("MKCOL", "/d", &[], None).await.status(), StatusCode::CREATED);
    // missing parent
    assert_eq!(
        h.request("MKCOL", "/nope/x", &[], None).await.status(),
        StatusCode::PRECONDITION_FAILED
    );

    assert_eq!(h.put("/d/e/f", b"xy").await.status(), StatusCode::CREATED);

    let res = h.request("PROPFIND", "/d", &[("Depth", "1")], None).await;
    let xml = body_string(res).await;
    assert!(xml.contains("<D:href>/d/e/</D:href>"));
    assert!(xml.contains("<D:getcontenttype>httpd/unix-directory</D:getcontenttype>"));

    let res = h
        .request(
            "MOVE",
            "/d/e/f",
            &[
                ("Destination", "http://nas.local:1900/d/e/g"),
                ("Overwrite", "F"),
            ],
            None,
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    assert_eq!(body_bytes(h.get("/d/e/g").await).await, b"xy");
    assert_eq!(h.get("/d/e/f").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn copy_keeps_source_and_bytes_match() {
    let h = single_tenant(vec![]);
    h.put("/src.bin", b"payload").await;

    let res = h
        .request(
            "COPY",
            "/src.bin",
            &[("Destination", "http://nas.local:1900/dst.bin")],
            None,
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    assert_eq!(body_bytes(h.get("/src.bin").await).await, b"payload");
    assert_eq!(body_bytes(h.get("/dst.bin").await).await, b"payload");
}

#[tokio::test]
async fn move_with_overwrite_trashes_backend_destination() {
    let h = single_tenant(vec![]);
    h.put("/a", b"aaa").await;
    h.put("/b", b"bbb").await;

    // without Overwrite: T the move is refused
    let res = h
        .request("MOVE", "/a", &[("Destination", "http://nas.local:1900/b")], None)
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = h
        .request(
            "MOVE",
            "/a",
            &[("Destination", "http://nas.local:1900/b"), ("Overwrite", "T")],
            None,
        )
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(body_bytes(h.get("/b").await).await, b"aaa");
    assert_eq!(h.get("/a").await.status(), StatusCode::NOT_FOUND);

    // the displaced backend destination went to the trash, not oblivion
    assert!(h.backend.unlinks.lock().contains(&("/b".to_string(), false)));
}

#[tokio::test]
async fn destination_validation() {
    let h = single_tenant(vec![]);
    h.put("/a", b"x").await;

    // no Destination
    let res = h.request("MOVE", "/a", &[], None).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // scheme-less
    let res = h.request("MOVE", "/a", &[("Destination", "/b")], None).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // wrong host
    let res = h
        .request("MOVE", "/a", &[("Destination", "http://evil.example/b")], None)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // traversal
    let res = h
        .request(
            "MOVE",
            "/a",
            &[("Destination", "http://nas.local:1900/../escape")],
            None,
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // same path is a no-op 201
    let res = h
        .request("MOVE", "/a", &[("Destination", "http://nas.local:1900/a")], None)
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn scratch_glob_bypasses_backend() {
    let h = single_tenant(vec!["Thumbs.db".to_string()]);

    let res = h.put("/Thumbs.db", b"zz").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(h.backend.upload_count(), 0);

    let res = h.get("/Thumbs.db").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_bytes(res).await, b"zz");

    // listed via the overlay
    let res = h.request("PROPFIND", "/", &[("Depth", "1")], None).await;
    assert!(body_string(res).await.contains("<D:href>/Thumbs.db</D:href>"));

    let res = h.request("DELETE", "/Thumbs.db", &[], None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(h.get("/Thumbs.db").await.status(), StatusCode::NOT_FOUND);

    // the scratch directory holds no leftover file
    let dir = h._scratch.path().join("tempDiskFiles");
    let leftovers = std::fs::read_dir(&dir)
        .map(|it| it.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn delete_purges_every_tier() {
    let h = single_tenant(vec![]);

    h.put("/real.txt", b"data").await;
    assert_eq!(h.request("DELETE", "/real.txt", &[], None).await.status(), StatusCode::OK);
    assert_eq!(h.get("/real.txt").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        h.request("PROPFIND", "/real.txt", &[], None).await.status(),
        StatusCode::NOT_FOUND
    );
    // backend delete is a soft delete
    assert!(h.backend.unlinks.lock().contains(&("/real.txt".to_string(), false)));

    h.put("/ghost.txt", b"").await;
    assert_eq!(h.request("DELETE", "/ghost.txt", &[], None).await.status(), StatusCode::OK);
    assert_eq!(h.get("/ghost.txt").await.status(), StatusCode::NOT_FOUND);

    assert_eq!(
        h.request("DELETE", "/never.txt", &[], None).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn propfind_notfound_is_multistatus() {
    let h = single_tenant(vec![]);
    let res = h.request("PROPFIND", "/missing", &[("Depth", "0")], None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let xml = body_string(res).await;
    assert!(xml.contains("<D:status>HTTP/1.1 404 NOT FOUND</D:status>"));
}

#[tokio::test]
async fn propfind_reports_quota() {
    let h = single_tenant(vec![]);
    let res = h.request("PROPFIND", "/", &[("Depth", "0")], None).await;
    let xml = body_string(res).await;
    assert!(xml.contains("<D:quota-used-bytes>42</D:quota-used-bytes>"));
    assert!(xml.contains("<D:quota-available-bytes>999958</D:quota-available-bytes>"));
}

#[tokio::test]
async fn proppatch_updates_timestamps() {
    let h = single_tenant(vec![]);
    h.put("/a.txt", b"hi").await;

    let body = br#"<?xml version="1.0"?>
        <D:propertyupdate xmlns:D="DAV:"><D:set><D:prop>
          <D:getlastmodified>Sun, 06 Nov 1994 08:49:37 GMT</D:getlastmodified>
        </D:prop></D:set></D:propertyupdate>"#;
    let res = h
        .request("PROPPATCH", "/a.txt", &[], Some(&body[..]))
        .await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    let xml = body_string(res).await;
    assert!(xml.contains("<D:status>HTTP/1.1 207 Multi-Status</D:status>"));

    let res = h.request("PROPFIND", "/a.txt", &[("Depth", "0")], None).await;
    let xml = body_string(res).await;
    assert!(xml.contains("<D:getlastmodified>Sun, 06 Nov 1994 08:49:37 GMT</D:getlastmodified>"));
}

#[tokio::test]
async fn head_of_directory_is_forbidden() {
    let h = single_tenant(vec![]);
    h.request("MKCOL", "/d", &[], None).await;
    assert_eq!(h.request("HEAD", "/d", &[], None).await.status(), StatusCode::FORBIDDEN);
    assert_eq!(h.get("/d").await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn put_onto_directory_and_under_file() {
    let h = single_tenant(vec![]);
    h.request("MKCOL", "/d", &[], None).await;
    assert_eq!(h.put("/d", b"x").await.status(), StatusCode::FORBIDDEN);

    h.put("/f.txt", b"file").await;
    assert_eq!(
        h.put("/f.txt/child", b"x").await.status(),
        StatusCode::PRECONDITION_FAILED
    );
}

#[tokio::test]
async fn lock_unlock_not_implemented() {
    let h = single_tenant(vec![]);
    assert_eq!(
        h.request("LOCK", "/a.txt", &[], None).await.status(),
        StatusCode::NOT_IMPLEMENTED
    );
    assert_eq!(
        h.request("UNLOCK", "/a.txt", &[], None).await.status(),
        StatusCode::NOT_IMPLEMENTED
    );
}

#[tokio::test]
async fn options_and_common_headers() {
    let h = single_tenant(vec![]);
    let res = h.request("OPTIONS", "/", &[], None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header(&res, "DAV"), "1, 2");
    assert_eq!(header(&res, "Server"), "Filen WebDAV");
    assert_eq!(
        header(&res, "Allow"),
        "OPTIONS, GET, HEAD, PUT, DELETE, PROPFIND, PROPPATCH, MKCOL, COPY, MOVE"
    );
    assert_eq!(header(&res, "MS-Author-Via"), "DAV");
    assert_eq!(header(&res, "Cache-Control"), "no-cache");
}

#[tokio::test]
async fn basic_auth_rejects_wrong_credentials() {
    let h = single_tenant(vec![]);

    let req = Request::builder()
        .method("GET")
        .uri("/a.txt")
        .header("Authorization", basic_auth("admin", "hunter3"))
        .body(hyper::Body::empty())
        .unwrap();
    let res = h.server.handler().handle(req, None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        header(&res, "WWW-Authenticate"),
        "Basic realm=\"Default realm\", charset=\"UTF-8\""
    );

    let req = Request::builder()
        .method("GET")
        .uri("/a.txt")
        .body(hyper::Body::empty())
        .unwrap();
    let res = h.server.handler().handle(req, None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn digest_auth_accepts_computed_response() {
    let scratch = tempfile::tempdir().unwrap();
    let backend = MemBackend::new();
    let config = ServerConfig::new()
        .auth_mode(AuthMode::Digest)
        .user("admin", "hunter2")
        .temp_disk_dir(scratch.path().join("t"));
    let server = WebDavServer::new(
        config,
        Tenancy::SingleTenant {
            client: backend as Arc<dyn CloudClient>,
        },
    )
    .unwrap();

    // challenge first
    let req = Request::builder()
        .method("GET")
        .uri("/x")
        .body(hyper::Body::empty())
        .unwrap();
    let res = server.handler().handle(req, None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let challenge = header(&res, "WWW-Authenticate").to_string();
    assert!(challenge.starts_with("Digest realm=\"Default realm\""));

    // compute a valid response for the recorded nonce
    let nonce = challenge
        .split("nonce=\"")
        .nth(1)
        .unwrap()
        .split('"')
        .next()
        .unwrap()
        .to_string();
    let md5 = |s: &str| format!("{:x}", md5::compute(s.as_bytes()));
    let ha1 = md5("admin:Default realm:hunter2");
    let ha2 = md5("GET:/x");
    let response = md5(&format!("{ha1}:{nonce}:00000001:abcdef:auth:{ha2}"));
    let authz = format!(
        "Digest username=\"admin\", realm=\"Default realm\", uri=\"/x\", nonce=\"{nonce}\", nc=00000001, cnonce=\"abcdef\", qop=auth, response=\"{response}\""
    );

    let req = Request::builder()
        .method("GET")
        .uri("/x")
        .header("Authorization", &authz)
        .body(hyper::Body::empty())
        .unwrap();
    let res = server.handler().handle(req, None).await;
    // authenticated; /x does not exist
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // a single flipped digit fails
    let bad = authz.replace(&response, &format!("0{}", &response[1..]));
    let req = Request::builder()
        .method("GET")
        .uri("/x")
        .header("Authorization", bad)
        .body(hyper::Body::empty())
        .unwrap();
    let res = server.handler().handle(req, None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn digest_proxy_combination_is_refused() {
    let config = ServerConfig::new().auth_mode(AuthMode::Digest);
    let factory = MemFactory::new() as Arc<dyn SessionFactory>;
    assert!(WebDavServer::new(config, Tenancy::Proxy { factory }).is_err());
}

#[tokio::test]
async fn proxy_login_binds_and_caches_session() {
    let scratch = tempfile::tempdir().unwrap();
    let factory = MemFactory::new();
    let config = ServerConfig::new().temp_disk_dir(scratch.path().join("t"));
    let server = WebDavServer::new(
        config,
        Tenancy::Proxy {
            factory: factory.clone() as Arc<dyn SessionFactory>,
        },
    )
    .unwrap();

    let auth = basic_auth("user@x.y", "password=s3cret&twoFactorAuthentication=123456");
    let request = |auth: String| {
        Request::builder()
            .method("PROPFIND")
            .uri("/")
            .header("Depth", "0")
            .header("Authorization", auth)
            .body(hyper::Body::empty())
            .unwrap()
    };

    let res = server.handler().handle(request(auth.clone()), None).await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    assert_eq!(factory.logins.load(Ordering::SeqCst), 1);

    // same raw password hits the authed cache, no second login
    let res = server.handler().handle(request(auth.clone()), None).await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    assert_eq!(factory.logins.load(Ordering::SeqCst), 1);

    // a password change evicts the session; the next request re-logs-in
    let backend = factory.last_backend.lock().clone().unwrap();
    backend.trigger_password_changed();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let res = server.handler().handle(request(auth), None).await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    assert_eq!(factory.logins.load(Ordering::SeqCst), 2);

    // bad credentials stay 401
    let bad = basic_auth("user@x.y", "password=wrong&twoFactorAuthentication=123456");
    let res = server.handler().handle(request(bad), None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn virtual_move_and_copy() {
    let h = single_tenant(vec![]);
    h.put("/v.txt", b"").await;

    let res = h
        .request(
            "MOVE",
            "/v.txt",
            &[("Destination", "http://nas.local:1900/w.txt")],
            None,
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(h.get("/v.txt").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(h.get("/w.txt").await.status(), StatusCode::OK);

    let res = h
        .request(
            "COPY",
            "/w.txt",
            &[("Destination", "http://nas.local:1900/w2.txt")],
            None,
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(h.get("/w.txt").await.status(), StatusCode::OK);
    assert_eq!(h.get("/w2.txt").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn put_with_content_range_is_rejected() {
    let h = single_tenant(vec![]);
    let res = h
        .request(
            "PUT",
            "/a.txt",
            &[("Content-Range", "bytes 0-1/5")],
            Some(b"xy"),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
