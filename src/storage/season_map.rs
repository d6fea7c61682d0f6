use super::table::Record;
use super::{Database, StorageError};
use crate::model::{SeasonMap, SeasonMapInsert};

impl Record for SeasonMapInsert {
    type Key = String;

    fn natural_key(&self) -> Self::Key {
        self.map_key.clone()
    }

    /// Provider slots are merged, not replaced: a newly discovered provider
    /// mapping is added next to the ones already known for this key.
    fn merge(&mut self, incoming: Self) {
        self.seasons.extend(incoming.seasons);
    }
}

impl Database {
    pub fn season_map(&self, map_key: &str) -> Result<Option<SeasonMap>, StorageError> {
        self.season_maps.find_by_key(&map_key.to_string())
    }

    /// Records the provider slots of `mapping` under its key
    pub fn upsert_season_map(&self, mapping: SeasonMapInsert) -> Result<SeasonMap, StorageError> {
        log::info!(
            "Mapping '{}' to {:?}",
            mapping.map_key,
            mapping.seasons
        );
        self.season_maps.upsert(mapping)
    }

    pub fn season_map_count(&self) -> Result<usize, StorageError> {
        self.season_maps.len()
    }
}
