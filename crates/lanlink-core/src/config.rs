//! Configuration system for lanlink.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $LANLINK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/lanlink/config.toml
//!   3. ~/.config/lanlink/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::framing::Framing;
use crate::wire;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LanlinkConfig {
    pub node: NodeConfig,
    pub discovery: DiscoveryConfig,
    pub session: SessionConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address the TCP listener binds and the host advertised to peers.
    /// Must be a concrete address other nodes can reach.
    pub host: String,
    /// TCP port for sessions. 0 = OS-assigned.
    pub port: u16,
    /// Peers dialed once at startup, as `host:port`.
    pub bootstrap: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    /// IPv4 multicast group.
    pub group: String,
    pub port: u16,
    pub ttl: u32,
    pub announce_interval_secs: u64,
    /// Discovered peers not heard from within this window are forgotten.
    pub peer_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Connections silent for longer than this are closed.
    pub idle_timeout_secs: u64,
    /// Default wait for a reply in send-and-wait.
    pub send_wait_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// A write that cannot finish in this time fails, so a peer that
    /// stopped reading cannot stall senders.
    pub write_timeout_secs: u64,
    /// How often the idle reaper scans the connection table.
    pub reaper_interval_secs: u64,
    /// Max queued inbound messages per connection. Overflow is dropped.
    pub queue_capacity: usize,
    pub framing: Framing,
    /// Inbound sessions answer every message with its upper-cased text.
    pub echo_inbound: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    /// Control API port, bound on 127.0.0.1.
    pub port: u16,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            bootstrap: Vec::new(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            group: wire::MULTICAST_GROUP.to_string(),
            port: wire::MULTICAST_PORT,
            ttl: wire::MULTICAST_TTL,
            announce_interval_secs: wire::ANNOUNCE_INTERVAL_SECS,
            peer_ttl_secs: wire::PEER_TTL_SECS,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
            send_wait_timeout_secs: 5,
            connect_timeout_secs: 3,
            write_timeout_secs: 1,
            reaper_interval_secs: 5,
            queue_capacity: 1024,
            framing: Framing::Raw,
            echo_inbound: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9101,
        }
    }
}

impl DiscoveryConfig {
    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs.max(1))
    }

    pub fn peer_ttl(&self) -> Duration {
        Duration::from_secs(self.peer_ttl_secs)
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn send_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.send_wait_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs.max(1))
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("lanlink")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl LanlinkConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            LanlinkConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a config file without applying env overrides.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("LANLINK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&LanlinkConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply LANLINK_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("LANLINK_NODE__HOST") {
            self.node.host = v;
        }
        if let Some(p) = var("LANLINK_NODE__PORT").and_then(|v| v.parse().ok()) {
            self.node.port = p;
        }
        if let Some(v) = var("LANLINK_NODE__BOOTSTRAP") {
            self.node.bootstrap = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = var("LANLINK_DISCOVERY__ENABLED") {
            self.discovery.enabled = v == "true" || v == "1";
        }
        if let Some(t) = var("LANLINK_SESSION__IDLE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.session.idle_timeout_secs = t;
        }
        if let Some(v) = var("LANLINK_SESSION__ECHO_INBOUND") {
            self.session.echo_inbound = v == "true" || v == "1";
        }
        if let Some(p) = var("LANLINK_API__PORT").and_then(|v| v.parse().ok()) {
            self.api.port = p;
        }
    }
}
