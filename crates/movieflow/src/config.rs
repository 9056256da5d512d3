//! `movieflow.toml` configuration.
//!
//! Every section is optional. A missing file yields the defaults, which run
//! the pipeline against `akshaypawar7/millions-of-movies` with local
//! `data/csv` and `data/parquet` staging directories.

use chrono::NaiveDate;
use movieflow_protocol::defaults::{
    DEFAULT_BUCKET, DEFAULT_CSV_DIR, DEFAULT_PARQUET_DIR, DEFAULT_RETRIES,
    DEFAULT_RETRY_DELAY_SECS, DEFAULT_SEARCH, LOCAL_DB_CONN_ID, REMOTE_DB_CONN_ID,
};
use movieflow_protocol::RequestedParams;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::catalog::DEFAULT_CATALOG_URL;
use crate::credentials::Connection;

pub const DEFAULT_CONFIG_FILE: &str = "movieflow.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub params: RequestedParams,
    pub paths: PathsConfig,
    pub schedule: ScheduleConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
    pub databases: DatabasesConfig,
    pub connections: BTreeMap<String, Connection>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            params: RequestedParams::new(DEFAULT_SEARCH),
            paths: PathsConfig::default(),
            schedule: ScheduleConfig::default(),
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
            catalog: CatalogConfig::default(),
            databases: DatabasesConfig::default(),
            connections: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Staging directory for the catalog download and partition snapshots
    pub csv_dir: PathBuf,
    /// Output directory of the transformer
    pub parquet_dir: PathBuf,
    /// Directory of the run ledger; `~/.movieflow/state` when unset
    pub state_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            csv_dir: PathBuf::from(DEFAULT_CSV_DIR),
            parquet_dir: PathBuf::from(DEFAULT_PARQUET_DIR),
            state_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// First logical date for catchup
    pub start_date: Option<NaiveDate>,
    /// Run every missed date since `start_date`, or only yesterday
    pub catchup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            catchup: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub retries: u32,
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: Option<String>,
    /// Custom S3-compatible endpoint (MinIO, LocalStack)
    pub endpoint: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            region: None,
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_URL.to_string(),
        }
    }
}

/// Connection ids of the two relational targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabasesConfig {
    pub local: String,
    pub remote: String,
}

impl Default for DatabasesConfig {
    fn default() -> Self {
        Self {
            local: LOCAL_DB_CONN_ID.to_string(),
            remote: REMOTE_DB_CONN_ID.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load from `path`, or `./movieflow.toml` if present, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.bucket must not be empty".into()));
        }
        if self.paths.csv_dir == self.paths.parquet_dir {
            return Err(ConfigError::Invalid(
                "paths.csv_dir and paths.parquet_dir must differ".into(),
            ));
        }
        Ok(())
    }

    /// Copy with every connection password masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.connections = self
            .connections
            .iter()
            .map(|(id, conn)| (id.clone(), conn.redacted()))
            .collect();
        copy
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
