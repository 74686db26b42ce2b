//! Layered configuration loading.

use sparsevfs::{ConfigError, ConfigLoader};
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(root: &std::path::Path, name: &str, contents: &str) {
    let dir = root.join(".sparsevfs");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), contents).unwrap();
}

// Environment variables are process-wide, so every layer is checked in a
// single test.
#[test]
fn test_layers_apply_in_precedence_order() {
    let dir = TempDir::new().unwrap();

    let config = ConfigLoader::load(dir.path()).unwrap();
    assert_eq!(config.dot_git_root, dir.path().to_path_buf());
    assert_eq!(config.index_path, PathBuf::from(".git/index"));
    assert_eq!(config.resolved_index_path(), dir.path().join(".git/index"));
    assert_eq!(config.worker_threads, None);
    assert_eq!(config.logging.level, "info");

    write_config(
        dir.path(),
        "config.toml",
        "worker_threads = 3\n\n[logging]\nlevel = \"debug\"\nformat = \"json\"\n",
    );
    write_config(dir.path(), "development.toml", "index_path = \"/tmp/alt-index\"\n");
    let config = ConfigLoader::load(dir.path()).unwrap();
    assert_eq!(config.worker_threads, Some(3));
    assert_eq!(config.effective_worker_threads(), 3);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");
    assert_eq!(config.resolved_index_path(), PathBuf::from("/tmp/alt-index"));

    std::env::set_var("SPARSEVFS__WORKER_THREADS", "5");
    let config = ConfigLoader::load(dir.path());
    std::env::remove_var("SPARSEVFS__WORKER_THREADS");
    assert_eq!(config.unwrap().worker_threads, Some(5));

    write_config(dir.path(), "config.toml", "worker_threads = 0\n");
    assert!(matches!(
        ConfigLoader::load(dir.path()),
        Err(ConfigError::Invalid(_))
    ));
}
