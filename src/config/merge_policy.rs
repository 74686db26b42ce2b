//! Defaults applied before any file or environment source.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};
use std::path::Path;

pub fn builder_with_defaults(
    enlistment_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("dot_git_root", enlistment_root.to_string_lossy().into_owned())?
        .set_default("index_path", ".git/index")?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")
}
