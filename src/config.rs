//! Store and node configuration
//!
//! File-format constants live in [`crate::constants`]; only sizing and
//! naming choices are configurable here.

use crate::constants::{DEFAULT_CAPACITY, DEFAULT_NEGATIVE_CACHE_SIZE};
use crate::consensus::NetworkParameters;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Sizing of one ring file store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of record slots in the ring
    pub capacity: usize,
    /// Bound of the negative-result cache; 0 disables it
    pub negative_cache_size: usize,
    /// Extension of archive files written before the ring wraps
    pub archive_extension: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            negative_cache_size: DEFAULT_NEGATIVE_CACHE_SIZE,
            archive_extension: "bak".to_string(),
        }
    }
}

/// Both chains' stores and parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub btc_store: StoreConfig,
    pub vbk_store: StoreConfig,
    pub btc_params: NetworkParameters,
    pub vbk_params: NetworkParameters,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            btc_store: StoreConfig::default(),
            vbk_store: StoreConfig::default(),
            btc_params: NetworkParameters::btc_mainnet(),
            vbk_params: NetworkParameters::vbk_mainnet(),
        }
    }
}

impl NodeConfig {
    /// Load a JSON config; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: NodeConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no store could be opened with
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, store) in [("btc_store", &self.btc_store), ("vbk_store", &self.vbk_store)] {
            if store.capacity == 0 {
                return Err(ConfigError::Invalid(format!("{}.capacity must be non-zero", name)));
            }
            if store.archive_extension.is_empty() || store.archive_extension.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "{}.archive_extension {:?} is not a file extension",
                    name, store.archive_extension
                )));
            }
        }
        if self.vbk_params.keystone_interval == 0 {
            return Err(ConfigError::Invalid(
                "vbk_params.keystone_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the full-hash chain store file
    pub fn btc_store_path(&self) -> PathBuf {
        self.data_dir.join("btc-blocks.dat")
    }

    /// Path of the partial-hash chain store file
    pub fn vbk_store_path(&self) -> PathBuf {
        self.data_dir.join("vbk-blocks.dat")
    }
}
