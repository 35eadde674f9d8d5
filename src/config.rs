// src/config.rs

//! Client configuration: where the server lives, how to authenticate, and
//! how long to wait for a connection.

use crate::core::{MpdError, Result};
use anyhow::{Context, anyhow};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6600;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The address of a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    /// A local socket, selected by a host starting with `/`.
    Unix(PathBuf),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Endpoint::Tcp { host, port } => write!(f, "{host}:{port}"),
            Endpoint::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Everything needed to open and authenticate one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    pub endpoint: Endpoint,
    pub password: Option<String>,
}

impl ServerTarget {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            endpoint: Endpoint::Tcp {
                host: host.into(),
                port,
            },
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Resolves a host string of the form `[password@]hostname[:port]`.
    ///
    /// `host` defaults to `$MPD_HOST`, then `localhost`; `port` defaults to
    /// `$MPD_PORT`, then 6600. A port or password inside the host string wins
    /// over the separate arguments.
    pub fn parse_host(
        host: Option<&str>,
        port: Option<u16>,
        password: Option<String>,
    ) -> Result<Self> {
        Self::parse_host_with_env(host, port, password, |key| std::env::var(key).ok())
    }

    fn parse_host_with_env<E>(
        host: Option<&str>,
        port: Option<u16>,
        password: Option<String>,
        env: E,
    ) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let raw = host
            .map(str::to_string)
            .or_else(|| env("MPD_HOST"))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let raw = raw.trim();

        // The password is everything before the last '@', taken verbatim.
        let (embedded_password, authority) = match raw.rsplit_once('@') {
            _ if raw.starts_with('/') => (None, raw),
            Some((pw, rest)) => ((!pw.is_empty()).then(|| pw.to_string()), rest),
            None => (None, raw),
        };
        if authority.starts_with('/') {
            return Ok(Self {
                endpoint: Endpoint::Unix(PathBuf::from(authority)),
                password: embedded_password.or(password),
            });
        }

        let url = Url::parse(&format!("mpd://{authority}"))
            .map_err(|e| MpdError::Config(format!("invalid host '{raw}': {e}")))?;
        let hostname = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| MpdError::Config(format!("no hostname in '{raw}'")))?;

        let default_port = match port {
            Some(port) => port,
            None => match env("MPD_PORT") {
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| MpdError::Config(format!("invalid MPD_PORT '{value}'")))?,
                None => DEFAULT_PORT,
            },
        };

        Ok(Self {
            endpoint: Endpoint::Tcp {
                host: hostname.to_string(),
                port: url.port().unwrap_or(default_port),
            },
            password: embedded_password.or(password),
        })
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

/// The configuration file of the command-line client.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// `[password@]hostname[:port]` or a socket path.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            password: None,
            log_level: default_log_level(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Loads and validates a TOML configuration file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: ClientConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.port == Some(0) {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.as_deref().is_some_and(|h| h.trim().is_empty()) {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.connect_timeout.is_zero() {
            return Err(anyhow!("connect_timeout must be greater than zero"));
        }
        if self.log_level.trim().is_empty() {
            return Err(anyhow!("log_level cannot be empty"));
        }
        Ok(())
    }

    /// The server this configuration points at.
    pub fn target(&self) -> Result<ServerTarget> {
        ServerTarget::parse_host(self.host.as_deref(), self.port, self.password.clone())
    }
}
