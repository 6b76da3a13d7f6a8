use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "mcp-popover-bridge";

/// Intervals and retry budgets of the adapter lifecycle and submit trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub url_poll_ms: u64,
    pub container_watch_ms: u64,
    pub insertion_first_check_ms: u64,
    pub insertion_poll_ms: u64,
    pub insertion_attempts: u32,
    pub mount_poll_ms: u64,
    pub mount_attempts: u32,
    pub navigation_delay_ms: u64,
    pub navigation_verify_ms: u64,
    pub submit_poll_ms: u64,
    pub submit_max_wait_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            url_poll_ms: 1000,
            container_watch_ms: 500,
            insertion_first_check_ms: 100,
            insertion_poll_ms: 500,
            insertion_attempts: 10,
            mount_poll_ms: 1000,
            mount_attempts: 5,
            navigation_delay_ms: 1000,
            navigation_verify_ms: 1500,
            submit_poll_ms: crate::dom::submit::SUBMIT_POLL_INTERVAL_MS,
            submit_max_wait_ms: 5000,
        }
    }
}

impl TimingConfig {
    pub fn url_poll(&self) -> Duration {
        Duration::from_millis(self.url_poll_ms.max(1))
    }

    pub fn container_watch(&self) -> Duration {
        Duration::from_millis(self.container_watch_ms.max(1))
    }

    pub fn insertion_first_check(&self) -> Duration {
        Duration::from_millis(self.insertion_first_check_ms)
    }

    pub fn insertion_poll(&self) -> Duration {
        Duration::from_millis(self.insertion_poll_ms)
    }

    pub fn insertion_attempts(&self) -> u32 {
        self.insertion_attempts.max(1)
    }

    pub fn mount_poll(&self) -> Duration {
        Duration::from_millis(self.mount_poll_ms)
    }

    pub fn mount_attempts(&self) -> u32 {
        self.mount_attempts.max(1)
    }

    pub fn navigation_delay(&self) -> Duration {
        Duration::from_millis(self.navigation_delay_ms)
    }

    pub fn navigation_verify(&self) -> Duration {
        Duration::from_millis(self.navigation_verify_ms)
    }

    pub fn submit_poll(&self) -> Duration {
        Duration::from_millis(self.submit_poll_ms.max(1))
    }

    pub fn submit_max_wait(&self) -> Duration {
        Duration::from_millis(self.submit_max_wait_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromeConfig {
    /// Attach to this debugging port instead of launching Chrome.
    pub port: Option<u16>,
    pub profile: String,
    pub startup_timeout_secs: u64,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            port: None,
            profile: "default".into(),
            startup_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub timing: TimingConfig,
    pub chrome: ChromeConfig,
    pub database_path: Option<PathBuf>,
}

impl BridgeConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    /// Load `path`, or the default location. A missing file at the default
    /// location means defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_toml_str(&raw)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        let dir = dirs::data_dir()
            .context("Cannot find data directory")?
            .join(APP_DIR);
        Ok(dir.join("bridge.db"))
    }
}
