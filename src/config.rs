use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{tplog_debug, Error, Result};

/// Default confirmation attempts per task.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default confidence threshold for a decisive confirmation.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;
/// Default delay between confirmation attempts, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
/// Default per-request agent timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Default idle timeout before a session is swept, in seconds.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 300;
/// Default interval between sweep passes, in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Confirmation protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmConfig {
    /// Maximum confirmation attempts per task.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Minimum confidence for a decisive result.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Delay between attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Per-request agent timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ConfirmConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Abort the remaining run on the first task failure.
    #[serde(default)]
    pub stop_on_error: bool,
    /// Idle timeout before a session is removed by the sweep, in seconds.
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    /// Interval between sweep passes, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Tracked for observability; never enforced as backpressure.
    pub max_concurrent_sessions: Option<usize>,
    #[serde(default)]
    pub confirm: ConfirmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stop_on_error: false,
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            max_concurrent_sessions: None,
            confirm: ConfirmConfig::default(),
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_session_timeout_secs() -> u64 {
    DEFAULT_SESSION_TIMEOUT_SECS
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

impl Config {
    pub fn taskpilot_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".taskpilot"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::taskpilot_dir()?.join("taskpilot.toml"))
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        tplog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            tplog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        tplog_debug!(
            "Config loaded: stop_on_error={} session_timeout={}s sweep_interval={}s",
            config.stop_on_error,
            config.session_timeout_secs,
            config.sweep_interval_secs
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::taskpilot_dir()?;
        tplog_debug!("Config::save dir={}", dir.display());
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        tplog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn ensure_dirs() -> Result<()> {
        let dir = Self::taskpilot_dir()?;
        if !dir.exists() {
            tplog_debug!("Creating taskpilot directory: {}", dir.display());
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}
