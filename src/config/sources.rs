//! Enlistment config files and environment overrides.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File};
use std::path::Path;

pub const CONFIG_DIR: &str = ".sparsevfs";
pub const ENV_NAME_VAR: &str = "SPARSEVFS_ENV";
pub const ENV_PREFIX: &str = "SPARSEVFS";

/// `.sparsevfs/config.toml` then `.sparsevfs/{SPARSEVFS_ENV}.toml`.
pub fn add_enlistment_files(
    builder: ConfigBuilder<DefaultState>,
    enlistment_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let config_dir = enlistment_root.join(CONFIG_DIR);
    let env_name = std::env::var(ENV_NAME_VAR).unwrap_or_else(|_| "development".to_string());

    let mut builder = builder;
    for path in [
        config_dir.join("config.toml"),
        config_dir.join(format!("{}.toml", env_name)),
    ] {
        if path.exists() {
            builder = builder.add_source(File::from(path).required(false));
        }
    }
    Ok(builder)
}

/// `SPARSEVFS__WORKER_THREADS=4`, `SPARSEVFS__LOGGING__LEVEL=debug`, ...
pub fn add_environment(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}
