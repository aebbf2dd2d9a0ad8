//! ## WebDAV gateway for the Filen encrypted cloud store
//!
//! Webdav (RFC4918) is HTTP (GET/HEAD/PUT/DELETE) plus a bunch of
//! extension methods (PROPFIND, etc) that make a URL space mountable as a
//! filesystem. This crate speaks that protocol on one side and drives a
//! client-side-encrypting cloud storage SDK on the other: macOS Finder,
//! Windows Explorer, rclone and friends mount the gateway, and every file
//! operation is translated into SDK calls. Encryption stays local to the
//! process; the server never holds plaintext at rest beyond an optional
//! scratch directory for sidecar files.
//!
//! ## Resource tiers
//!
//! Mounted clients have habits a remote store cannot serve directly, so
//! each user's namespace is an overlay of three tiers:
//!
//! - **backend**: the authoritative remote items;
//! - **virtual**: zero-byte in-memory placeholders, created by the
//!   open-then-write dance of Finder and Explorer (an empty `PUT`
//!   immediately followed by `PROPFIND`/`GET` of the path);
//! - **disk**: local plaintext scratch files for sidecar names
//!   (`.DS_Store`, `._*`, `Thumbs.db`, ...) that should never reach the
//!   encrypted store.
//!
//! ## Modes
//!
//! Single-tenant serves one account with credentials fixed at startup
//! (Basic or Digest auth). Proxy mode is multi-tenant: the Basic username
//! is an account email and the password smuggles the account credentials,
//! so one gateway can serve many accounts with sessions opened lazily.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use filen_webdav::{ServerConfig, Tenancy, WebDavServer};
//! # fn open_session() -> Arc<dyn filen_webdav::sdk::CloudClient> { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = open_session();
//!     let config = ServerConfig::new()
//!         .user("admin", "admin")
//!         .temp_files_to_store_on_disk(vec![".DS_Store".into(), "._*".into()]);
//!
//!     let server = WebDavServer::new(config, Tenancy::SingleTenant { client }).unwrap();
//!     server.start().await.unwrap();
//!     // ... mount http://127.0.0.1:1900/ ...
//!     server.stop(false).await;
//! }
//! ```

#[macro_use]
extern crate log;

mod auth;
mod config;
mod davpath;
mod errors;
mod framer;
mod handler;
mod multistatus;
mod ratelimit;
mod resource;
mod server;
mod tempdisk;
mod tls;
mod user;
mod util;

pub mod body;
pub mod sdk;

use crate::errors::{DavError, DavResult};

pub use crate::config::{AuthMode, RateLimit, RateLimitKey, ServerConfig, UserConfig};
pub use crate::handler::WebDavHandler;
pub use crate::resource::{DiskFile, Resource, VirtualFile};
pub use crate::server::{ServerError, Tenancy, WebDavServer};
pub use crate::util::DavMethod;
