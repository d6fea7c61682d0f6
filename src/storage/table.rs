//! Generic table with upsert-by-natural-key semantics

use super::StorageError;
use super::snapshot::SnapshotFile;
use crate::model::Stored;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// A row type that can live in a [`Table`]
pub(crate) trait Record: Clone + Serialize + DeserializeOwned + Send {
    /// The natural (non-surrogate) key identifying a row
    type Key: Ord + Clone + Send;

    fn natural_key(&self) -> Self::Key;

    /// Merges an incoming payload for the same natural key over `self`
    fn merge(&mut self, incoming: Self) {
        *self = incoming;
    }
}

/// The persisted part of a table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TableRows<T> {
    next_id: u64,
    rows: BTreeMap<u64, Stored<T>>,
}

impl<T> Default for TableRows<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }
}

struct TableState<T: Record> {
    data: TableRows<T>,
    index: BTreeMap<T::Key, u64>,
}

impl<T: Record> Clone for TableState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            index: self.index.clone(),
        }
    }
}

impl<T: Record> TableState<T> {
    fn new(data: TableRows<T>) -> Self {
        let index = data
            .rows
            .iter()
            .map(|(id, row)| (row.data.natural_key(), *id))
            .collect();
        Self { data, index }
    }

    fn upsert(&mut self, payload: T) -> Stored<T> {
        let key = payload.natural_key();
        let now = Utc::now();

        if let Some(row) = self
            .index
            .get(&key)
            .and_then(|id| self.data.rows.get_mut(id))
        {
            row.data.merge(payload);
            row.version += 1;
            row.time_updated = now;
            return row.clone();
        }

        let id = self.data.next_id;
        self.data.next_id += 1;

        let row = Stored {
            id,
            version: 1,
            time_updated: now,
            data: payload,
        };
        self.data.rows.insert(id, row.clone());
        self.index.insert(key, id);
        row
    }
}

/// A collection of rows keyed by internal id and indexed by natural key
///
/// The whole read-check-write sequence of an upsert runs under one lock, so
/// concurrent upserts for the same natural key never produce duplicate rows.
pub(crate) struct Table<T: Record> {
    name: &'static str,
    state: Mutex<TableState<T>>,
    snapshot: Option<SnapshotFile<TableRows<T>>>,
}

impl<T: Record> Table<T> {
    /// Creates an empty table that lives only in memory
    pub fn in_memory(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(TableState::new(TableRows::default())),
            snapshot: None,
        }
    }

    /// Opens a table backed by a snapshot file in `dir`
    pub fn open(name: &'static str, dir: &Path) -> Result<Self, StorageError> {
        let snapshot = SnapshotFile::open(dir, name)?;
        let data = snapshot.load()?.unwrap_or_default();

        Ok(Self {
            name,
            state: Mutex::new(TableState::new(data)),
            snapshot: Some(snapshot),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, TableState<T>>, StorageError> {
        self.state
            .lock()
            .map_err(|_| StorageError::Poisoned(self.name))
    }

    fn persist(&self, state: &TableState<T>) -> Result<(), StorageError> {
        match &self.snapshot {
            Some(snapshot) => snapshot.store(&state.data),
            None => Ok(()),
        }
    }

    /// Applies `change` to a copy of the state and swaps it in only once
    /// the snapshot holds it; a failed write leaves the table untouched
    fn commit<R>(&self, change: impl FnOnce(&mut TableState<T>) -> R) -> Result<R, StorageError> {
        let mut state = self.lock()?;
        let mut staged = state.clone();
        let result = change(&mut staged);
        self.persist(&staged)?;
        *state = staged;
        Ok(result)
    }

    /// Inserts a new row (version 1) or merges over the existing row with
    /// the same natural key (version + 1, same id)
    pub fn upsert(&self, payload: T) -> Result<Stored<T>, StorageError> {
        self.commit(|state| state.upsert(payload))
    }

    /// Upserts each payload in turn; the output keeps the input order
    pub fn bulk_upsert(&self, payloads: Vec<T>) -> Result<Vec<Stored<T>>, StorageError> {
        self.commit(|state| {
            payloads
                .into_iter()
                .map(|payload| state.upsert(payload))
                .collect()
        })
    }

    pub fn get(&self, id: u64) -> Result<Option<Stored<T>>, StorageError> {
        Ok(self.lock()?.data.rows.get(&id).cloned())
    }

    pub fn find_by_key(&self, key: &T::Key) -> Result<Option<Stored<T>>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .index
            .get(key)
            .and_then(|id| state.data.rows.get(id))
            .cloned())
    }

    /// Returns all rows matching `predicate`, ordered by id
    pub fn filter<F>(&self, predicate: F) -> Result<Vec<Stored<T>>, StorageError>
    where
        F: Fn(&Stored<T>) -> bool,
    {
        Ok(self
            .lock()?
            .data
            .rows
            .values()
            .filter(|row| predicate(row))
            .cloned()
            .collect())
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.data.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        key: String,
        value: u32,
    }

    impl Record for Item {
        type Key = String;

        fn natural_key(&self) -> String {
            self.key.clone()
        }
    }

    fn item(key: &str, value: u32) -> Item {
        Item {
            key: key.to_string(),
            value,
        }
    }

    #[test]
    fn test_insert_starts_at_version_one() {
        let table = Table::in_memory("items");
        let row = table.upsert(item("a", 1)).unwrap();

        assert_eq!(row.id, 1);
        assert_eq!(row.version, 1);
        assert_eq!(row.value, 1);
    }

    #[test]
    fn test_upsert_same_key_updates_in_place() {
        let table = Table::in_memory("items");
        let first = table.upsert(item("a", 1)).unwrap();
        let second = table.upsert(item("a", 1)).unwrap();
        let third = table.upsert(item("a", 5)).unwrap();

        assert_eq!(table.len().unwrap(), 1);
        assert_eq!(second.id, first.id);
        assert_eq!(second.version, 2);
        assert_eq!(third.version, 3);
        assert_eq!(third.value, 5);
        assert!(third.time_updated >= first.time_updated);
    }

    #[test]
    fn test_bulk_upsert_preserves_order() {
        let table = Table::in_memory("items");
        table.upsert(item("b", 0)).unwrap();

        let rows = table
            .bulk_upsert(vec![item("c", 1), item("b", 2), item("a", 3)])
            .unwrap();

        let keys: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "b", "a"]);
        assert_eq!(rows[1].id, 1);
        assert_eq!(rows[1].version, 2);
        assert_eq!(table.len().unwrap(), 3);
    }

    #[test]
    fn test_concurrent_upserts_never_duplicate() {
        let table = Arc::new(Table::in_memory("items"));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for _ in 0..25 {
                        table.upsert(item("shared", i)).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(table.len().unwrap(), 1);
        let row = table.find_by_key(&"shared".to_string()).unwrap().unwrap();
        assert_eq!(row.version, 200);
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let table = Table::open("items", dir.path()).unwrap();
            table.upsert(item("a", 1)).unwrap();
            table.upsert(item("a", 2)).unwrap();
            table.upsert(item("b", 3)).unwrap();
        }

        let table: Table<Item> = Table::open("items", dir.path()).unwrap();
        let a = table.find_by_key(&"a".to_string()).unwrap().unwrap();
        assert_eq!(a.version, 2);
        assert_eq!(a.value, 2);

        // Ids keep counting from where the previous run stopped
        let c = table.upsert(item("c", 4)).unwrap();
        assert_eq!(c.id, 3);
    }

    #[test]
    fn test_failed_write_leaves_table_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("db");
        fs::create_dir_all(&db).unwrap();

        let table = Table::open("items", &db).unwrap();
        table.upsert(item("a", 1)).unwrap();

        fs::remove_dir_all(&db).unwrap();
        assert!(table.upsert(item("a", 2)).is_err());
        assert!(table.upsert(item("b", 3)).is_err());
        assert!(table.bulk_upsert(vec![item("c", 4), item("a", 5)]).is_err());

        let a = table.find_by_key(&"a".to_string()).unwrap().unwrap();
        assert_eq!(a.version, 1);
        assert_eq!(a.value, 1);
        assert!(table.find_by_key(&"b".to_string()).unwrap().is_none());
        assert_eq!(table.len().unwrap(), 1);

        fs::create_dir_all(&db).unwrap();
        let a = table.upsert(item("a", 2)).unwrap();
        assert_eq!(a.version, 2);
        let b = table.upsert(item("b", 3)).unwrap();
        assert_eq!(b.id, 2);
        assert_eq!(b.version, 1);
    }

    #[test]
    fn test_filter_and_get() {
        let table = Table::in_memory("items");
        table
            .bulk_upsert(vec![item("a", 1), item("b", 2), item("c", 3)])
            .unwrap();

        let odd = table.filter(|row| row.value % 2 == 1).unwrap();
        assert_eq!(odd.len(), 2);
        assert_eq!(table.get(2).unwrap().unwrap().key, "b");
        assert!(table.get(99).unwrap().is_none());
    }
}
