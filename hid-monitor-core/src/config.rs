//! Engine configuration
//!
//! Loaded from TOML. Every field is optional; a missing file means defaults.
//!
//! ```toml
//! backend = "poll"
//! poll_interval_ms = 500
//! queue_capacity = 256
//! overflow = "reject-new"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::MonitorError;
use crate::queue::QueuePolicy;

/// Environment variable naming the config file used by [`crate::Engine::global`]
pub const CONFIG_ENV: &str = "HID_MONITOR_CONFIG";

/// Lower bound for the polling backend interval
const MIN_POLL_INTERVAL_MS: u64 = 10;

/// Which notification source backs the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// udev when built with `hotplug` on Linux, polling otherwise
    #[default]
    Auto,
    /// Linux udev `hidraw` subscription
    Udev,
    /// Periodic enumeration diff
    Poll,
}

/// What a capped queue does when full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Discard the oldest queued event to make room
    #[default]
    DropOldest,
    /// Discard the incoming event
    RejectNew,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: Backend,
    /// Snapshot interval for the polling backend
    pub poll_interval_ms: u64,
    /// Per-monitor queue cap, unbounded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
    pub overflow: OverflowPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Auto,
            poll_interval_ms: 1000,
            queue_capacity: None,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, MonitorError> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| MonitorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml_str(&content)
        } else {
            debug!("No config at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Best-effort load from the file named by `HID_MONITOR_CONFIG`
    ///
    /// Any failure is logged and falls back to defaults, since callers across
    /// the C boundary have no way to receive a config error.
    pub fn from_env() -> Self {
        let Some(path) = std::env::var_os(CONFIG_ENV) else {
            return Self::default();
        };
        match Self::load(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring {} ({:?}): {}", CONFIG_ENV, path, e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.queue_capacity == Some(0) {
            return Err(MonitorError::Config(
                "queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn queue_policy(&self) -> QueuePolicy {
        match self.queue_capacity {
            None => QueuePolicy::Unbounded,
            Some(capacity) => QueuePolicy::Bounded {
                capacity,
                overflow: self.overflow,
            },
        }
    }
}
