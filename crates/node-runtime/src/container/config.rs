//! # Node Configuration
//!
//! Unified configuration for every subsystem and the runtime.
//!
//! ## Sources (later wins)
//!
//! 1. Built-in defaults
//! 2. TOML file named by `MR_CONFIG` (optional)
//! 3. `MR_*` environment variables
//!
//! ```toml
//! [network]
//! listen_addr = "0.0.0.0:7400"
//! advertise_url = "http://10.0.0.1:7400"
//! peers = ["http://10.0.0.2:7400"]
//!
//! [mailbox]
//! mailbox_cap = 10000
//! max_ciphertext_bytes = 65536
//!
//! [replication]
//! sync_interval_ms = 2000
//!
//! [storage]
//! backend = "file"
//! data_dir = "./data"
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use mr_02_mailbox_store::StoreConfig;
use mr_03_replication::SyncConfig;
use mr_04_node_service::ServiceLimits;
use shared_types::NodeId;

/// Environment variable naming the TOML file.
pub const CONFIG_PATH_VAR: &str = "MR_CONFIG";

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub network: NetworkConfig,
    pub mailbox: MailboxConfig,
    pub replication: SyncConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Socket the HTTP server binds.
    pub listen_addr: SocketAddr,
    /// Base URL peers use to reach this node. Defaults to `http://{listen_addr}`.
    pub advertise_url: Option<String>,
    /// Fixed node id (hex or UUID). Generated when absent.
    pub node_id: Option<String>,
    /// Base URLs of the initial peers.
    pub peers: Vec<String>,
    /// Per-call timeout of the peer HTTP client.
    pub peer_request_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 7400)),
            advertise_url: None,
            node_id: None,
            peers: Vec::new(),
            peer_request_timeout_ms: 5_000,
        }
    }
}

/// Mailbox limits: store caps and client request limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxConfig {
    #[serde(flatten)]
    pub store: StoreConfig,
    #[serde(flatten)]
    pub limits: ServiceLimits,
}

/// Where mailbox logs live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Nothing survives a restart.
    #[default]
    Memory,
    /// Append-only record file plus a registry snapshot under `data_dir`.
    File,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
    /// Interval between registry snapshots (file backend only).
    pub registry_snapshot_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./data"),
            registry_snapshot_interval_ms: 30_000,
        }
    }
}

impl StorageConfig {
    pub fn mailbox_log_path(&self) -> PathBuf {
        self.data_dir.join("mailboxes.log")
    }

    pub fn registry_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("registry.bin")
    }

    pub fn node_id_path(&self) -> PathBuf {
        self.data_dir.join("node_id")
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// One JSON object per line instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl NodeConfig {
    /// Defaults, then the `MR_CONFIG` file, then `MR_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `MR_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MR_LISTEN_ADDR") {
            self.network.listen_addr = parse_env("MR_LISTEN_ADDR", v)?;
        }
        if let Some(v) = lookup("MR_ADVERTISE_URL") {
            self.network.advertise_url = Some(v);
        }
        if let Some(v) = lookup("MR_NODE_ID") {
            self.network.node_id = Some(v);
        }
        if let Some(v) = lookup("MR_PEERS") {
            self.network.peers = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("MR_MAILBOX_CAP") {
            self.mailbox.store.mailbox_cap = parse_env("MR_MAILBOX_CAP", v)?;
        }
        if let Some(v) = lookup("MR_TOMBSTONE_RETENTION_MS") {
            self.mailbox.store.tombstone_retention_ms = parse_env("MR_TOMBSTONE_RETENTION_MS", v)?;
        }
        if let Some(v) = lookup("MR_MAX_CIPHERTEXT_BYTES") {
            self.mailbox.limits.max_ciphertext_bytes = parse_env("MR_MAX_CIPHERTEXT_BYTES", v)?;
        }
        if let Some(v) = lookup("MR_SYNC_INTERVAL_MS") {
            self.replication.sync_interval_ms = parse_env("MR_SYNC_INTERVAL_MS", v)?;
        }
        if let Some(v) = lookup("MR_STORAGE_BACKEND") {
            self.storage.backend = match v.to_ascii_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "file" => StorageBackend::File,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "MR_STORAGE_BACKEND",
                        value: v,
                    })
                }
            };
        }
        if let Some(v) = lookup("MR_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("MR_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("MR_LOG_JSON") {
            self.logging.json = parse_env("MR_LOG_JSON", v)?;
        }
        Ok(())
    }

    /// Check the configuration before anything is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mailbox
            .limits
            .validate()
            .map_err(ConfigError::Invalid)?;

        if self.mailbox.store.mailbox_cap == 0 {
            return Err(ConfigError::Invalid("mailbox_cap must be > 0".into()));
        }
        if self.mailbox.store.max_entries_per_pull == 0 {
            return Err(ConfigError::Invalid("max_entries_per_pull must be > 0".into()));
        }
        if self.mailbox.store.compaction_interval_ms == 0 {
            return Err(ConfigError::Invalid("compaction_interval_ms must be > 0".into()));
        }

        let sync = &self.replication;
        if sync.sync_interval_ms == 0 || sync.session_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sync_interval_ms and session_timeout_ms must be > 0".into(),
            ));
        }
        if sync.backoff_base_ms == 0 || sync.backoff_base_ms > sync.backoff_cap_ms {
            return Err(ConfigError::Invalid(
                "backoff_base_ms must be in 1..=backoff_cap_ms".into(),
            ));
        }
        if sync.pull_batch == 0 || sync.advertise_batch == 0 || sync.registry_batch == 0 {
            return Err(ConfigError::Invalid("replication batch sizes must be > 0".into()));
        }
        if sync.pending_queue_depth == 0 {
            return Err(ConfigError::Invalid("pending_queue_depth must be > 0".into()));
        }

        if let Some(id) = &self.network.node_id {
            NodeId::parse(id).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        for peer in &self.network.peers {
            if !peer.starts_with("http://") && !peer.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "peer {:?} must be an http(s) URL",
                    peer
                )));
            }
        }
        if self.network.peer_request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "peer_request_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Base URL announced to peers.
    pub fn advertise_url(&self) -> String {
        self.network
            .advertise_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.network.listen_addr))
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
