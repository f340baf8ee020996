///
/// # Extension Configuration
///
/// Settings applied when a connection is opened (and again on every
/// reconnect). Every section and field is optional.
///
/// ## Example tessera.toml
///
/// ```toml
/// [connection]
/// busy_timeout_ms = 5000
///
/// [backup]
/// pages_per_step = -1
/// retry_sleep_ms = 250
///
/// [bloom]
/// default_size = 1024
///
/// [functions]
/// hash = true
/// rank = true
/// bloom = true
/// ```
///
/// `busy_timeout_ms = 0` leaves the engine without a busy handler.
/// `pages_per_step = -1` copies the whole database in one backup step.
///

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ExtError, ExtResult};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtensionConfig {
    pub connection: ConnectionConfig,
    pub backup: BackupConfig,
    pub bloom: BloomConfig,
    pub functions: FunctionsConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub busy_timeout_ms: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupConfig {
    pub pages_per_step: i32,
    pub retry_sleep_ms: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            pages_per_step: -1,
            retry_sleep_ms: 250,
        }
    }
}

impl BackupConfig {
    pub fn retry_sleep(&self) -> Duration {
        Duration::from_millis(self.retry_sleep_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BloomConfig {
    pub default_size: usize,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self { default_size: 1024 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FunctionsConfig {
    pub hash: bool,
    pub rank: bool,
    pub bloom: bool,
}

impl Default for FunctionsConfig {
    fn default() -> Self {
        Self {
            hash: true,
            rank: true,
            bloom: true,
        }
    }
}

impl ExtensionConfig {
    pub fn load(path: &Path) -> ExtResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ExtResult<Self> {
        let config: ExtensionConfig =
            toml::from_str(content).map_err(|e| ExtError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ExtResult<()> {
        if self.backup.pages_per_step == 0 || self.backup.pages_per_step < -1 {
            return Err(ExtError::Config(format!(
                "backup.pages_per_step must be positive or -1, got {}",
                self.backup.pages_per_step
            )));
        }
        if self.bloom.default_size == 0 {
            return Err(ExtError::Config(
                "bloom.default_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
