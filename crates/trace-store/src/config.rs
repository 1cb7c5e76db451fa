//! Store configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use trace_core::DAY_MS;

use crate::{Result, StoreError};

/// Default retention window for contacts and day keys
pub const DEFAULT_RETENTION_DAYS: u32 = 14;

/// Where state lives and how long it is kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Contact snapshot file
    pub store_path: PathBuf,
    /// This device's day key ring
    pub keyring_path: PathBuf,
    /// Contacts first seen longer ago than this are removed
    pub retention_days: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("contacts.bin"),
            keyring_path: PathBuf::from("keyring.bin"),
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl StoreConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate(path)?;
        Ok(config)
    }

    /// Retention window in milliseconds
    pub fn retention_ms(&self) -> i64 {
        i64::from(self.retention_days) * DAY_MS
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.retention_days == 0 {
            return Err(StoreError::Config {
                path: path.to_path_buf(),
                message: "retention_days must be at least 1".to_string(),
            });
        }
        if self.store_path == self.keyring_path {
            return Err(StoreError::Config {
                path: path.to_path_buf(),
                message: "store_path and keyring_path must differ".to_string(),
            });
        }
        Ok(())
    }
}
