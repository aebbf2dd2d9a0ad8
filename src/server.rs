//! The HTTP(S) listener around the webdav handler: accept loop, TLS,
//! live-connection registry, and graceful or terminating shutdown.

use std::collections::HashMap;
use std::convert::Infallible;
use std::error::Error;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use globset::{Glob, GlobSetBuilder};
use hyper::server::conn::Http;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use uuid::Uuid;

use crate::auth::Authenticator;
use crate::config::{AuthMode, ServerConfig};
use crate::handler::WebDavHandler;
use crate::ratelimit::RateLimiter;
use crate::sdk::{CloudClient, SessionFactory};
use crate::tempdisk::TempDisk;
use crate::tls;
use crate::user::{UserRegistry, UserState};

/// Who the gateway serves.
pub enum Tenancy {
    /// One configured account; the session is opened by the caller.
    SingleTenant { client: Arc<dyn CloudClient> },
    /// Credentials arrive per request inside the Basic password; sessions
    /// are opened lazily through the factory.
    Proxy { factory: Arc<dyn SessionFactory> },
}

#[derive(Debug)]
pub enum ServerError {
    Config(&'static str),
    Io(io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Config(msg) => write!(f, "configuration error: {msg}"),
            ServerError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for ServerError {}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        ServerError::Io(e)
    }
}

pub struct WebDavServer {
    config: ServerConfig,
    handler: WebDavHandler,
    running: tokio::sync::Mutex<Option<Running>>,
}

struct Running {
    addr: SocketAddr,
    accept_task: tokio::task::JoinHandle<()>,
    connections: Arc<Mutex<HashMap<Uuid, tokio::task::JoinHandle<()>>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl WebDavServer {
    pub fn new(config: ServerConfig, tenancy: Tenancy) -> Result<WebDavServer, ServerError> {
        if config.disable_logging {
            log::set_max_level(log::LevelFilter::Off);
        }

        let registry = UserRegistry::new();
        let auth = match (&tenancy, config.auth_mode) {
            (Tenancy::SingleTenant { client }, mode) => {
                let user = config
                    .user
                    .as_ref()
                    .ok_or(ServerError::Config("single-tenant mode requires user credentials"))?;
                registry.insert(UserState::new(user.username.clone(), client.clone()));
                match mode {
                    AuthMode::Basic => Authenticator::basic(
                        registry.clone(),
                        user.username.clone(),
                        user.password.clone(),
                    ),
                    AuthMode::Digest => Authenticator::digest(
                        registry.clone(),
                        user.username.clone(),
                        user.password.clone(),
                    ),
                }
            }
            (Tenancy::Proxy { factory }, AuthMode::Basic) => {
                Authenticator::proxy(registry.clone(), factory.clone())
            }
            (Tenancy::Proxy { .. }, AuthMode::Digest) => {
                return Err(ServerError::Config("digest auth requires a configured user"));
            }
        };

        let mut globs = GlobSetBuilder::new();
        for pattern in &config.temp_files_to_store_on_disk {
            let glob = Glob::new(pattern)
                .map_err(|_| ServerError::Config("invalid temp file glob pattern"))?;
            globs.add(glob);
        }
        let scratch_globs = globs
            .build()
            .map_err(|_| ServerError::Config("invalid temp file glob set"))?;

        let temp_disk_dir = match &config.temp_disk_dir {
            Some(dir) => dir.clone(),
            None => tls::config_base_dir()?.join("tempDiskFiles"),
        };

        let handler = WebDavHandler {
            auth: Arc::new(auth),
            tempdisk: TempDisk::new(temp_disk_dir),
            scratch_globs: Arc::new(scratch_globs),
            ratelimit: Arc::new(RateLimiter::new(
                Duration::from_millis(config.rate_limit.window_ms),
                config.rate_limit.limit,
            )),
            ratelimit_key: config.rate_limit.key,
            peek_timeout: config.put_peek_timeout,
        };

        Ok(WebDavServer {
            config,
            handler,
            running: tokio::sync::Mutex::new(None),
        })
    }

    /// The request handler, for embedding in another HTTP stack or for
    /// driving in tests without a socket.
    pub fn handler(&self) -> &WebDavHandler {
        &self.handler
    }

    /// Address the listener is bound to, once started.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.addr)
    }

    /// Bind and start accepting connections. Resolves once listening.
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(ServerError::Config("server is already running"));
        }

        self.handler.tempdisk.init().await?;

        let tls_acceptor = if self.config.https {
            let dir = tls::config_base_dir()?;
            let (cert, key) = tls::load_or_generate(&dir)?;
            Some(tls::acceptor(&cert, &key)?)
        } else {
            None
        };

        let listener =
            TcpListener::bind((self.config.hostname.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        info!("listening on {}{}", addr, if self.config.https { " (https)" } else { "" });

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let connections: Arc<Mutex<HashMap<Uuid, tokio::task::JoinHandle<()>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let handler = self.handler.clone();
        let conns = connections.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let (stream, peer) = tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    accepted = listener.accept() => match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("accept failed: {e}");
                            continue;
                        }
                    },
                };

                let id = Uuid::new_v4();
                let handler = handler.clone();
                let acceptor = tls_acceptor.clone();
                let conns_inner = conns.clone();
                let task = tokio::spawn(async move {
                    serve_connection(stream, peer, handler, acceptor).await;
                    conns_inner.lock().remove(&id);
                });
                conns.lock().insert(id, task);
            }
        });

        *running = Some(Running {
            addr,
            accept_task,
            connections,
            shutdown_tx,
        });
        Ok(())
    }

    /// Stop accepting and wait for in-flight handlers. With `terminate`,
    /// live connections are destroyed instead of drained.
    pub async fn stop(&self, terminate: bool) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        let _ = running.shutdown_tx.send(true);
        let _ = running.accept_task.await;

        let tasks: Vec<_> = {
            let mut map = running.connections.lock();
            map.drain().map(|(_, task)| task).collect()
        };
        for task in tasks {
            if terminate {
                task.abort();
            } else {
                let _ = task.await;
            }
        }
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    handler: WebDavHandler,
    acceptor: Option<tokio_rustls::TlsAcceptor>,
) {
    let service = hyper::service::service_fn(move |req: http::Request<hyper::Body>| {
        let handler = handler.clone();
        async move { Ok::<_, Infallible>(handler.handle(req, Some(peer.ip())).await) }
    });

    let result = match acceptor {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => Http::new().serve_connection(tls_stream, service).await,
            Err(e) => {
                debug!("tls handshake with {peer} failed: {e}");
                return;
            }
        },
        None => Http::new().serve_connection(stream, service).await,
    };
    if let Err(e) = result {
        debug!("connection from {peer} ended with error: {e}");
    }
}
