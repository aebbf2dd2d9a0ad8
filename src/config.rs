//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

/// How clients authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Basic,
    Digest,
}

/// What the rate limiter buckets on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitKey {
    Ip,
    Username,
}

#[derive(Debug, Clone)]
pub struct RateLimit {
    pub window_ms: u64,
    pub limit: u32,
    pub key: RateLimitKey,
}

impl Default for RateLimit {
    fn default() -> Self {
        RateLimit {
            window_ms: 1000,
            limit: 1000,
            key: RateLimitKey::Username,
        }
    }
}

/// Credentials of the single configured account (single-tenant modes).
#[derive(Clone)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // the password stays out of log output
        f.debug_struct("UserConfig")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub hostname: String,
    pub port: u16,
    pub auth_mode: AuthMode,
    pub https: bool,
    pub user: Option<UserConfig>,
    pub rate_limit: RateLimit,
    /// Glob patterns (matched against file names) whose PUT bodies stay
    /// in the local scratch tier instead of being uploaded.
    pub temp_files_to_store_on_disk: Vec<String>,
    pub disable_logging: bool,
    /// Scratch tier directory. Defaults to
    /// `<platform-config>/@filen/webdav/tempDiskFiles`.
    pub temp_disk_dir: Option<PathBuf>,
    /// How long a PUT waits for its first body byte before treating the
    /// request as a zero-byte create.
    pub put_peek_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            hostname: "127.0.0.1".to_string(),
            port: 1900,
            auth_mode: AuthMode::Basic,
            https: false,
            user: None,
            rate_limit: RateLimit::default(),
            temp_files_to_store_on_disk: Vec::new(),
            disable_logging: false,
            temp_disk_dir: None,
            put_peek_timeout: Duration::from_secs(15),
        }
    }
}

impl ServerConfig {
    pub fn new() -> ServerConfig {
        ServerConfig::default()
    }

    pub fn hostname(self, hostname: impl Into<String>) -> Self {
        let mut this = self;
        this.hostname = hostname.into();
        this
    }

    pub fn port(self, port: u16) -> Self {
        let mut this = self;
        this.port = port;
        this
    }

    pub fn auth_mode(self, mode: AuthMode) -> Self {
        let mut this = self;
        this.auth_mode = mode;
        this
    }

    pub fn https(self, https: bool) -> Self {
        let mut this = self;
        this.https = https;
        this
    }

    pub fn user(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        let mut this = self;
        this.user = Some(UserConfig {
            username: username.into(),
            password: password.into(),
        });
        this
    }

    pub fn rate_limit(self, rate_limit: RateLimit) -> Self {
        let mut this = self;
        this.rate_limit = rate_limit;
        this
    }

    pub fn temp_files_to_store_on_disk(self, patterns: Vec<String>) -> Self {
        let mut this = self;
        this.temp_files_to_store_on_disk = patterns;
        this
    }

    pub fn disable_logging(self, disable: bool) -> Self {
        let mut this = self;
        this.disable_logging = disable;
        this
    }

    pub fn temp_disk_dir(self, dir: impl Into<PathBuf>) -> Self {
        let mut this = self;
        this.temp_disk_dir = Some(dir.into());
        this
    }
}
