use std::path::PathBuf;
use std::time::Duration;
use redis::{ConnectionAddr, IntoConnectionInfo};
use crate::error::Error;

pub const DEFAULT_URL: &str = "redis://localhost:6379";
pub const DEFAULT_PORT: u16 = 6379;

/// Connection and run settings. Every field has a default so the library
/// works without the CLI.
#[derive(Debug, Clone)]
pub struct Config {
    pub url: String,
    /// Overrides the user in `url`.
    pub username: Option<String>,
    /// Overrides the password in `url`.
    pub password: Option<String>,
    /// Overrides the database in `url`.
    pub db: Option<u32>,
    pub backup_dir: PathBuf,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub connect_retries: u32,
    /// `COUNT` hint for each `SCAN` step.
    pub scan_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            url: DEFAULT_URL.to_string(),
            username: None,
            password: None,
            db: None,
            backup_dir: PathBuf::from("./backups/redis"),
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(5),
            connect_retries: 5,
            scan_count: 500,
        }
    }
}

/// Where and how to open a session, resolved from `Config`.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: u32,
}

impl Endpoint {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    pub fn endpoint(&self) -> crate::Result<Endpoint> {
        let mut endpoint = parse_url(&self.url)?;
        if let Some(username) = non_empty(&self.username) {
            endpoint.username = Some(username);
        }
        if let Some(password) = non_empty(&self.password) {
            endpoint.password = Some(password);
        }
        if let Some(db) = self.db {
            endpoint.db = db;
        }
        Ok(endpoint)
    }

    /// Delay before connection attempt `attempt` (1-based): one second per
    /// attempt, capped at five.
    pub fn retry_delay(attempt: u32) -> Duration {
        Duration::from_secs(u64::from(attempt).min(5))
    }
}

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_ref().filter(|s| !s.is_empty()).cloned()
}

/// Parse `redis://[user[:password]@]host[:port][/db]`. Credentials may be
/// percent-encoded.
pub fn parse_url(url: &str) -> crate::Result<Endpoint> {
    let url = match url.split_once("://") {
        Some(("redis", _)) => url.to_string(),
        Some(("rediss", _)) => return Err(Error::Config("TLS (`rediss://`) is not supported".into())),
        Some((scheme, _)) => return Err(Error::Config(format!("unsupported scheme `{}`", scheme))),
        None => format!("redis://{}", url),
    };

    let info = url
        .as_str()
        .into_connection_info()
        .map_err(|e| Error::Config(format!("invalid url: {}", e)))?;
    let (host, port) = match info.addr {
        ConnectionAddr::Tcp(host, port) => (host, port),
        other => return Err(Error::Config(format!("unsupported address {:?}", other))),
    };
    if host.is_empty() {
        return Err(Error::Config("missing host in url".into()));
    }
    let db = u32::try_from(info.redis.db).map_err(|_| Error::Config(format!("invalid database `{}`", info.redis.db)))?;

    Ok(Endpoint {
        host,
        port,
        username: info.redis.username.filter(|u| !u.is_empty()),
        password: info.redis.password.filter(|p| !p.is_empty()),
        db,
    })
}
