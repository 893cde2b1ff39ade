//! `key=value` configuration files for the server and the terminal client.
//!
//! ```text
//! # server_config.txt
//! port=5000
//! serverName=Harbor Chat
//! bannedPhrase=spam
//! bannedPhrase=buy now
//! ```
//!
//! Blank lines and `#` comments are skipped, only the first `=` splits a
//! line, and values are trimmed. Unknown keys are logged and ignored.
use std::path::{Path, PathBuf};

use tracing::warn;

/// Fallback server display name when neither the file nor the hostname gives one.
pub const DEFAULT_SERVER_NAME: &str = "chatrelay";
/// Bind host when the file does not set `host`.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Errors from loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: expected key=value")]
    MissingSeparator { line: usize },

    #[error("line {line}: invalid port {value:?}")]
    InvalidPort { line: usize, value: String },

    #[error("missing required key {0:?}")]
    MissingKey(&'static str),
}

/// Relay server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub server_name: String,
    pub banned_phrases: Vec<String>,
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::parse(&read(path.as_ref())?)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut host = None;
        let mut port = None;
        let mut server_name = None;
        let mut banned_phrases = Vec::new();

        for (line, key, value) in entries(text)? {
            match key {
                "host" => host = Some(value.to_owned()),
                "port" => port = Some(parse_port(line, value)?),
                "serverName" => server_name = Some(value.to_owned()),
                "bannedPhrase" => banned_phrases.push(value.to_owned()),
                other => warn!(line, key = other, "ignoring unknown server config key"),
            }
        }

        Ok(Self {
            host: host
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| DEFAULT_HOST.into()),
            port: port.ok_or(ConfigError::MissingKey("port"))?,
            server_name: server_name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(default_server_name),
            banned_phrases,
        })
    }

    /// `host:port` for binding.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Terminal client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::parse(&read(path.as_ref())?)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut host = None;
        let mut port = None;
        let mut username = None;

        for (line, key, value) in entries(text)? {
            match key {
                "host" => host = Some(value.to_owned()),
                "port" => port = Some(parse_port(line, value)?),
                "username" => username = Some(value.to_owned()),
                other => warn!(line, key = other, "ignoring unknown client config key"),
            }
        }

        Ok(Self {
            host: host.ok_or(ConfigError::MissingKey("host"))?,
            port: port.ok_or(ConfigError::MissingKey("port"))?,
            // Blank lets the server pick `Client-<port>`.
            username: username.unwrap_or_default(),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The machine hostname, or [`DEFAULT_SERVER_NAME`].
pub fn default_server_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| DEFAULT_SERVER_NAME.into())
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })
}

/// `(line number, key, value)` for every meaningful line.
fn entries(text: &str) -> Result<Vec<(usize, &str, &str)>, ConfigError> {
    let mut out = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (key, value) = trimmed
            .split_once('=')
            .ok_or(ConfigError::MissingSeparator { line })?;
        out.push((line, key.trim(), value.trim()));
    }
    Ok(out)
}

fn parse_port(line: usize, value: &str) -> Result<u16, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidPort {
        line,
        value: value.to_owned(),
    })
}
