//! Configuration Management
//!
//! Optional JSON config file for openstack-mcp. Every field can be left out;
//! the environment and command line take precedence where they overlap.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Region used when neither `--region` nor `OS_REGION_NAME` is set
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint interface used when `OS_INTERFACE` is not set
    #[serde(default)]
    pub interface: Option<String>,
    /// `limit` sent with list requests
    #[serde(default)]
    pub page_size: Option<u32>,
    /// Deadline for a single tool call
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("openstack-mcp").join("config.json"))
    }

    /// Load configuration from the default location
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from a file
    ///
    /// A missing file yields defaults; an unreadable or invalid one yields
    /// defaults with a warning.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read config {:?}: {}", path, e);
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("Invalid config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Effective interface (`OS_INTERFACE` > config)
    pub fn effective_interface(&self, env: Option<String>) -> Option<String> {
        env.filter(|i| !i.trim().is_empty())
            .or_else(|| self.interface.clone())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
