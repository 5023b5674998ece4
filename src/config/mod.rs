//! Configuration module for sharefs.

use crate::error::{Result, ShareError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for a sharefs server or client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareConfig {
    /// File server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Access ledger configuration.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Client bridge configuration.
    #[serde(default)]
    pub client: ClientConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl ShareConfig {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShareError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            ShareError::Config(format!("Failed to parse config: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_write_bytes == 0 {
            return Err(ShareError::InvalidConfig {
                field: "server.max_write_bytes".to_string(),
                reason: "Write limit must be non-zero".to_string(),
            });
        }

        if self.ledger.max_token_attempts == 0 {
            return Err(ShareError::InvalidConfig {
                field: "ledger.max_token_attempts".to_string(),
                reason: "At least one token attempt is required".to_string(),
            });
        }

        if self.ledger.session_idle_timeout == Some(Duration::ZERO) {
            return Err(ShareError::InvalidConfig {
                field: "ledger.session_idle_timeout".to_string(),
                reason: "Idle timeout must be non-zero when set".to_string(),
            });
        }

        if self.ledger.reaper_interval.is_zero() {
            return Err(ShareError::InvalidConfig {
                field: "ledger.reaper_interval".to_string(),
                reason: "Reaper interval must be non-zero".to_string(),
            });
        }

        if !self.client.server_url.starts_with("http://")
            && !self.client.server_url.starts_with("https://")
        {
            return Err(ShareError::InvalidConfig {
                field: "client.server_url".to_string(),
                reason: "Server URL must use http or https".to_string(),
            });
        }

        Ok(())
    }

    /// Create a minimal development configuration.
    pub fn development() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
                root_dir: PathBuf::from("/tmp/sharefs/root"),
                ..Default::default()
            },
            ledger: LedgerConfig::default(),
            client: ClientConfig::default(),
            observability: ObservabilityConfig {
                log_level: "debug".to_string(),
                ..Default::default()
            },
        }
    }
}

/// File server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the file server.
    pub bind_addr: SocketAddr,
    /// Directory whose tree is shared with clients.
    pub root_dir: PathBuf,
    /// Largest body a single write request may carry.
    #[serde(default = "default_max_write_bytes")]
    pub max_write_bytes: usize,
}

fn default_max_write_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            root_dir: PathBuf::from("."),
            max_write_bytes: default_max_write_bytes(),
        }
    }
}

/// How a write grant treats readers already holding the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriterPolicy {
    /// Only an existing writer blocks a new writer.
    #[default]
    IgnoreReaders,
    /// A writer is also refused while any reader holds the path.
    ExcludeReaders,
}

/// Access ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Write-grant policy.
    #[serde(default)]
    pub writer_policy: WriterPolicy,
    /// Attempts at generating a token not already in use.
    #[serde(default = "default_max_token_attempts")]
    pub max_token_attempts: usize,
    /// End sessions with no activity for this long. Disabled when unset.
    #[serde(default, with = "humantime_serde::option")]
    pub session_idle_timeout: Option<Duration>,
    /// How often the idle reaper sweeps.
    #[serde(default = "default_reaper_interval", with = "humantime_serde")]
    pub reaper_interval: Duration,
}

fn default_max_token_attempts() -> usize {
    100
}

fn default_reaper_interval() -> Duration {
    Duration::from_secs(30)
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            writer_policy: WriterPolicy::default(),
            max_token_attempts: default_max_token_attempts(),
            session_idle_timeout: None,
            reaper_interval: default_reaper_interval(),
        }
    }
}

/// Client bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the file server.
    pub server_url: String,
    /// Connection timeout.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Request timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
    /// Serve Prometheus metrics on the file server's `/metrics`.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
        }
    }
}

/// Serde helper for Duration using humantime format.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        } else if let Some(s_val) = s.strip_suffix('s') {
            s_val
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| e.to_string())
        } else if let Some(m) = s.strip_suffix('m') {
            m.parse::<u64>()
                .map(|v| Duration::from_secs(v * 60))
                .map_err(|e| e.to_string())
        } else if let Some(h) = s.strip_suffix('h') {
            h.parse::<u64>()
                .map(|v| Duration::from_secs(v * 3600))
                .map_err(|e| e.to_string())
        } else {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        }
    }

    /// Same format for `Option<Duration>`; `null` means unset.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| super::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
