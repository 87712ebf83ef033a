//! Configuration file for taskmgr.
//!
//! Read from `<config_dir>/taskmgr/taskmgr.yml`. Every field has a default, so
//! a missing file or a partial file is fine.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `default_user`.
pub const USER_ENV: &str = "TASKMGR_USER";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// User the CLI acts as when `--user` is not given
    pub default_user: Option<String>,
    pub store: StoreConfig,
    pub digest: DigestConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a writer waits for another writer's transaction
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { busy_timeout_ms: 5000 }
    }
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub from_address: String,
    pub subject: String,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            from_address: "task@task_manager.org".to_string(),
            subject: "Task Report from Task Manager".to_string(),
        }
    }
}

impl Config {
    /// Default config file location, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("taskmgr").join("taskmgr.yml"))
    }

    /// Load the config file and apply environment overrides.
    ///
    /// An explicit path must exist; the default path may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path() {
                Some(p) => match fs::read_to_string(&p) {
                    Ok(contents) => Self::parse(&contents)
                        .with_context(|| format!("Failed to parse config {}", p.display()))?,
                    Err(e) if e.kind() == ErrorKind::NotFound => Self::default(),
                    Err(e) => return Err(e).with_context(|| format!("Failed to read config {}", p.display())),
                },
                None => Self::default(),
            },
        };

        if let Ok(user) = std::env::var(USER_ENV)
            && !user.is_empty()
        {
            log::debug!("default_user overridden by {}", USER_ENV);
            config.default_user = Some(user);
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Parse YAML config text. Empty text yields defaults.
    pub fn parse(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }
}
