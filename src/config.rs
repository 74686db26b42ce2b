//! Configuration System
//!
//! Layered configuration for a virtualized enlistment: built-in defaults,
//! then enlistment config files, then `SPARSEVFS__*` environment variables.

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod merge_policy;
mod sources;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualizationConfig {
    /// Enlistment root containing the `.git` folder
    #[serde(default = "default_dot_git_root")]
    pub dot_git_root: PathBuf,

    /// Index file path, relative to `dot_git_root` unless absolute
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Worker threads for file and network requests (default: core count)
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_dot_git_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".git/index")
}

impl Default for VirtualizationConfig {
    fn default() -> Self {
        Self {
            dot_git_root: default_dot_git_root(),
            index_path: default_index_path(),
            worker_threads: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl VirtualizationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dot_git_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("dot_git_root cannot be empty".to_string()));
        }
        if self.index_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("index_path cannot be empty".to_string()));
        }
        if self.worker_threads == Some(0) {
            return Err(ConfigError::Invalid(
                "worker_threads must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured worker count, or the host core count.
    pub fn effective_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Absolute or enlistment-relative path of the index file.
    pub fn resolved_index_path(&self) -> PathBuf {
        if self.index_path.is_absolute() {
            self.index_path.clone()
        } else {
            self.dot_git_root.join(&self.index_path)
        }
    }
}

/// Loads [`VirtualizationConfig`] from all sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Precedence (lowest to highest): defaults,
    /// `<enlistment>/.sparsevfs/config.toml`,
    /// `<enlistment>/.sparsevfs/{SPARSEVFS_ENV}.toml`, `SPARSEVFS__*`.
    pub fn load(enlistment_root: &Path) -> Result<VirtualizationConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults(enlistment_root)?;
        let builder = sources::add_enlistment_files(builder, enlistment_root)?;
        let builder = sources::add_environment(builder);

        let config: VirtualizationConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
