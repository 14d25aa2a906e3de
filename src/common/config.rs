//! Configuration for the minizero coordinator

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Coordinator-specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zero: Option<ZeroConfig>,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load from `config.toml` (optional) and `MINIZERO_*` environment variables.
    /// Falls back to defaults when nothing usable is found.
    pub fn load() -> Self {
        let built = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("MINIZERO").separator("__"))
            .build();

        match built.and_then(|c| c.try_deserialize::<Config>()) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("Ignoring unreadable configuration: {}", e);
                Config {
                    zero: None,
                    log_level: default_log_level(),
                }
            }
        }
    }
}

/// When the commit log forces appended records to disk.
///
/// Every record is handed to the OS before a proposal is acknowledged;
/// the policy only decides when `fsync` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalSyncPolicy {
    /// fsync after every record
    Always,
    /// fsync on an append once a second or more has passed since the last one
    Interval,
    /// never fsync; survives a process crash but not a power loss
    Never,
}

impl std::str::FromStr for WalSyncPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(WalSyncPolicy::Always),
            "interval" => Ok(WalSyncPolicy::Interval),
            "never" => Ok(WalSyncPolicy::Never),
            other => Err(crate::Error::InvalidConfig(format!(
                "unknown wal sync policy: {}",
                other
            ))),
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZeroConfig {
    /// Bind address for the HTTP API
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Commit log file
    #[serde(default = "default_wal_path")]
    pub wal_path: PathBuf,

    /// Target replica count per group
    #[serde(default = "default_num_replicas")]
    pub num_replicas: usize,

    /// Connection probe timeout
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_wal_sync")]
    pub wal_sync: WalSyncPolicy,

    /// Keep the commit log in memory only (nothing survives a restart)
    #[serde(default)]
    pub ephemeral: bool,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5080))
}
fn default_wal_path() -> PathBuf {
    PathBuf::from("./zero-data/zero.wal")
}
fn default_num_replicas() -> usize {
    1
}
fn default_probe_timeout() -> u64 {
    2_000
}
fn default_wal_sync() -> WalSyncPolicy {
    WalSyncPolicy::Always
}

impl Default for ZeroConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            wal_path: default_wal_path(),
            num_replicas: default_num_replicas(),
            probe_timeout_ms: default_probe_timeout(),
            wal_sync: default_wal_sync(),
            ephemeral: false,
        }
    }
}

impl ZeroConfig {
    /// Config with the given replica count and defaults elsewhere
    pub fn with_replicas(num_replicas: usize) -> Self {
        Self {
            num_replicas,
            ..Default::default()
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.num_replicas == 0 {
            return Err(crate::Error::InvalidConfig(
                "num_replicas must be at least 1".into(),
            ));
        }
        if self.probe_timeout_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "probe_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
