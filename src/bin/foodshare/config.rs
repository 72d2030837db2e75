use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use foodshare::db::StoreOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settings loaded from the optional CLI config file.
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn log_level(&self) -> Option<&str> {
        self.data.log_level.as_deref()
    }

    /// Store options with every `[store]` key applied over the defaults.
    pub fn store_options(&self) -> StoreOptions {
        let mut opts = StoreOptions::default();
        let raw = &self.data.store;
        if let Some(dir) = &raw.data_dir {
            opts.data_dir = dir.clone();
        }
        if let Some(ms) = raw.lock_timeout_ms {
            opts.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = raw.throttle_timeout_ms {
            opts.throttle_timeout = Duration::from_millis(ms);
        }
        if let Some(permits) = raw.throttle_permits {
            opts.throttle_permits = permits;
        }
        if let Some(workers) = raw.workers {
            opts.workers = workers;
        }
        if let Some(id_len) = raw.id_len {
            opts.id_len = id_len;
        }
        if let Some(sync) = raw.sync_writes {
            opts.sync_writes = sync;
        }
        if let Some(create) = raw.create_if_missing {
            opts.create_if_missing = create;
        }
        opts
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    log_level: Option<String>,
    #[serde(default)]
    store: StoreSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct StoreSection {
    data_dir: Option<PathBuf>,
    lock_timeout_ms: Option<u64>,
    throttle_timeout_ms: Option<u64>,
    throttle_permits: Option<usize>,
    workers: Option<usize>,
    id_len: Option<usize>,
    sync_writes: Option<bool>,
    create_if_missing: Option<bool>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read CLI config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("foodshare").join("config.toml"))
}
