//! Tool Configuration
//!
//! Configuration file for roomos-ctl. Device entries hold only the id, host
//! and username; passwords are never written to disk.

use anyhow::{bail, Context, Result};
use roomos_session::{
    LimitPolicy, ManagerConfig, SessionConfig, TransportConfig, TrustPolicy,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tool configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Session timing
    #[serde(default)]
    pub session: SessionSettings,

    /// Transport and certificate trust
    #[serde(default)]
    pub transport: TransportSettings,

    /// Session pool limits
    #[serde(default)]
    pub pool: PoolSettings,

    /// Known devices
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// Session timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Seconds between heartbeat probes
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Seconds allowed for opening a connection (0 = no limit)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Use wss:// for bare hosts
    #[serde(default = "default_true")]
    pub secure: bool,

    /// Accept any device certificate
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Accept only the certificate with this SHA-256 fingerprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_fingerprint: Option<String>,
}

/// Pool limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Session limit
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Refuse sessions past the limit instead of warning
    #[serde(default)]
    pub enforce_limit: bool,
}

/// One configured device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Device id used as the pool key
    pub id: String,

    /// Host name or IP
    pub host: String,

    /// Login user
    #[serde(default = "default_username")]
    pub username: String,
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_max_sessions() -> usize {
    10
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            secure: true,
            accept_invalid_certs: false,
            pinned_fingerprint: None,
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            enforce_limit: false,
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/roomos-ctl/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("roomos-ctl")
            .join("config.toml")
    }

    /// Load configuration from file, creating a default one if not found
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Reject configurations the session layer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.session.heartbeat_interval_secs == 0 {
            bail!("session.heartbeat_interval_secs must be greater than 0");
        }
        if self.pool.max_sessions == 0 {
            bail!("pool.max_sessions must be greater than 0");
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.id.trim().is_empty() {
                bail!("device entry for host '{}' has an empty id", device.host);
            }
            if device.host.trim().is_empty() {
                bail!("device '{}' has an empty host", device.id);
            }
            if !seen.insert(device.id.as_str()) {
                bail!("device id '{}' is listed more than once", device.id);
            }
        }
        Ok(())
    }

    /// Look up a configured device
    pub fn device(&self, id: &str) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Session pool settings
    pub fn manager_config(&self) -> ManagerConfig {
        let connect_timeout = match self.session.connect_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        ManagerConfig {
            max_sessions: self.pool.max_sessions,
            limit_policy: if self.pool.enforce_limit {
                LimitPolicy::Enforce
            } else {
                LimitPolicy::Advisory
            },
            session: SessionConfig {
                heartbeat_interval: Duration::from_secs(self.session.heartbeat_interval_secs),
                connect_timeout,
                ..Default::default()
            },
        }
    }

    /// Transport settings; a pinned fingerprint wins over `accept_invalid_certs`
    pub fn transport_config(&self) -> TransportConfig {
        let trust = match (&self.transport.pinned_fingerprint, self.transport.accept_invalid_certs) {
            (Some(fingerprint), _) => TrustPolicy::Pinned(fingerprint.clone()),
            (None, true) => TrustPolicy::AcceptInvalid,
            (None, false) => TrustPolicy::WebPki,
        };

        TransportConfig {
            secure: self.transport.secure,
            trust,
        }
    }
}
