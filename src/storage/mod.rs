//! Storage Layer
//!
//! Platform directories and the durable lookup cache (SQLite).

pub mod cache_store;

pub use cache_store::SqliteCacheStore;

use anyhow::Result;
use std::path::PathBuf;

/// File name of the durable cache inside the data directory
pub const CACHE_DB_FILE: &str = "cache.db";

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "cardscan", "CardScan")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;
    Ok(config_dir)
}

/// Path of the durable lookup cache
pub fn cache_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(CACHE_DB_FILE))
}
