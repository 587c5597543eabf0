use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use vinoslot_core::Device;

use crate::{ConfigError, LoadOptions};

/// Session settings as read from a TOML file.
///
/// ```toml
/// model = "models/identity.xml"
/// device = "CPU"
/// requests = 2
/// wait_timeout_ms = 500
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    pub model: PathBuf,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_requests")]
    pub requests: usize,
    #[serde(default)]
    pub extension: Option<PathBuf>,
    /// Bound for each wait; unset waits forever.
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

fn default_device() -> String {
    "CPU".to_string()
}

fn default_requests() -> usize {
    1
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load_options(&self) -> Result<LoadOptions, ConfigError> {
        let device: Device = self.device.parse()?;
        Ok(LoadOptions {
            model: self.model.clone(),
            device,
            request_count: self.requests,
            extension: self.extension.clone(),
        })
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}
