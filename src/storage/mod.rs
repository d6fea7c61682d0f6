//! Persistence for seasons, episodes, title mappings and local episodes
//!
//! Every table upserts by natural key: seasons by `(provider_config_id,
//! indexed_id)`, episodes by `(season_id, indexed_id)`, title mappings by
//! `map_key` and local episodes by title. Rows are never replaced, only
//! merged, and their version grows by one on every update.

mod episode;
mod local;
mod season;
mod season_map;
mod snapshot;
mod table;

pub use local::filename_matches;

use crate::model::{EpisodeInsert, LocalEpisodeInsert, SeasonInsert, SeasonMapInsert};
use std::path::{Path, PathBuf};
use table::Table;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to determine data directory location
    #[error("Failed to determine data directory location")]
    DataDirectoryNotFound,

    /// Failed to create or access the database directory
    #[error("Failed to create database directory at {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read a table snapshot
    #[error("Failed to read snapshot {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write a table snapshot
    #[error("Failed to write snapshot {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to deserialize a table snapshot
    #[error("Failed to deserialize snapshot {path}: {source}")]
    DeserializationFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to serialize a table snapshot
    #[error("Failed to serialize data: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// A thread panicked while holding a table lock
    #[error("Lock on table '{0}' was poisoned")]
    Poisoned(&'static str),
}

/// The database shared by the matching pipeline and the danmaku service
pub struct Database {
    seasons: Table<SeasonInsert>,
    episodes: Table<EpisodeInsert>,
    season_maps: Table<SeasonMapInsert>,
    local_episodes: Table<LocalEpisodeInsert>,
}

impl Database {
    /// Creates an empty database that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            seasons: Table::in_memory("seasons"),
            episodes: Table::in_memory("episodes"),
            season_maps: Table::in_memory("season_maps"),
            local_episodes: Table::in_memory("local_episodes"),
        }
    }

    /// Opens (or creates) a database stored in `dir`
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        log::debug!("Opening database in {}", dir.display());

        Ok(Self {
            seasons: Table::open("seasons", dir)?,
            episodes: Table::open("episodes", dir)?,
            season_maps: Table::open("season_maps", dir)?,
            local_episodes: Table::open("local_episodes", dir)?,
        })
    }

    /// Opens the database in the system's standard data directory
    pub fn open_default() -> Result<Self, StorageError> {
        Self::open(&default_data_dir()?)
    }
}

/// Returns the system's standard data directory for this application
pub fn default_data_dir() -> Result<PathBuf, StorageError> {
    let proj_dirs = directories::ProjectDirs::from("io", "danmaku", "danmaku-resolver")
        .ok_or(StorageError::DataDirectoryNotFound)?;
    Ok(proj_dirs.data_dir().join("db"))
}
