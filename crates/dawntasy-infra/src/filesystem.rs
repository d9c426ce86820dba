//! Data directory layout.
//!
//! Everything Dawntasy keeps on disk lives under one directory:
//! `config.toml` and the SQLite database `dawntasy.db`.

use std::path::{Path, PathBuf};

use anyhow::Context;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "DAWNTASY_DATA_DIR";

/// Resolve the data directory: `$DAWNTASY_DATA_DIR`, else `~/.dawntasy`.
pub fn resolve_data_dir() -> PathBuf {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dawntasy"),
    }
}

/// Path of the SQLite database inside `data_dir`.
pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join("dawntasy.db")
}

/// Create the data directory if it does not exist yet.
pub async fn ensure_data_dir(data_dir: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))
}
