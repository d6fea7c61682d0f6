//! Snapshot file module
//!
//! Tables are persisted as whole-table JSON snapshots, one file per table,
//! inside the database directory.

use super::StorageError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A JSON file holding one serializable value
pub(crate) struct SnapshotFile<T> {
    /// Full path of the snapshot file
    path: PathBuf,
    /// Phantom data for the generic type
    _phantom: PhantomData<T>,
}

impl<T> SnapshotFile<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    /// Opens a snapshot file named after `name` inside `dir`
    ///
    /// The directory is created if it doesn't exist yet. The name will be
    /// sanitized (lowercased, non-alphanumeric characters replaced with
    /// underscores).
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let file: SnapshotFile<TableRows<SeasonInsert>> = SnapshotFile::open(dir, "seasons")?;
    /// ```
    pub fn open(dir: &Path, name: &str) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|e| StorageError::DirectoryCreationFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

        Ok(Self {
            path: dir.join(format!("{}.json", sanitize_name(name))),
            _phantom: PhantomData,
        })
    }

    /// Loads the snapshot
    ///
    /// Returns `None` if the file doesn't exist yet, and an error if it
    /// exists but cannot be read or deserialized.
    pub fn load(&self) -> Result<Option<T>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| StorageError::ReadFailed {
            path: self.path.clone(),
            source: e,
        })?;

        let data =
            serde_json::from_str(&content).map_err(|e| StorageError::DeserializationFailed {
                path: self.path.clone(),
                source: e,
            })?;

        Ok(Some(data))
    }

    /// Replaces the snapshot with `data`
    ///
    /// The new content is written next to the old file and renamed over it,
    /// so a crash mid-write never leaves a truncated snapshot behind.
    pub fn store(&self, data: &T) -> Result<(), StorageError> {
        let content = serde_json::to_string(data)?;

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, content).map_err(|e| StorageError::WriteFailed {
            path: staging.clone(),
            source: e,
        })?;
        fs::rename(&staging, &self.path).map_err(|e| StorageError::WriteFailed {
            path: self.path.clone(),
            source: e,
        })?;

        Ok(())
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Sanitizes a name for use in file paths
///
/// Converts to lowercase and replaces all characters that are not
/// a-z, 0-9, or hyphen with underscores.
fn sanitize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Seasons"), "seasons");
        assert_eq!(sanitize_name("season maps"), "season_maps");
        assert_eq!(sanitize_name("local-episodes"), "local-episodes");
        assert_eq!(sanitize_name("../escape"), "___escape");
    }

    #[test]
    fn test_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let file: SnapshotFile<Vec<u32>> = SnapshotFile::open(dir.path(), "numbers").unwrap();

        assert_eq!(file.load().unwrap(), None);

        file.store(&vec![1, 2, 3]).unwrap();
        assert_eq!(file.load().unwrap(), Some(vec![1, 2, 3]));
        assert!(file.path().ends_with("numbers.json"));
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let file: SnapshotFile<Vec<u32>> = SnapshotFile::open(dir.path(), "broken").unwrap();
        fs::write(file.path(), "{ not json").unwrap();

        assert!(matches!(
            file.load(),
            Err(StorageError::DeserializationFailed { .. })
        ));
    }
}
