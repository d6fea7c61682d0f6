use super::table::Record;
use super::{Database, StorageError};
use crate::model::{ProviderKind, Season, SeasonId, SeasonInsert};

impl Record for SeasonInsert {
    type Key = (String, String);

    fn natural_key(&self) -> Self::Key {
        (self.provider_config_id.clone(), self.indexed_id.clone())
    }
}

impl Database {
    pub fn upsert_season(&self, season: SeasonInsert) -> Result<Season, StorageError> {
        self.seasons.upsert(season)
    }

    /// Upserts search candidates, returning the stored rows in input order
    pub fn bulk_upsert_seasons(
        &self,
        seasons: Vec<SeasonInsert>,
    ) -> Result<Vec<Season>, StorageError> {
        self.seasons.bulk_upsert(seasons)
    }

    pub fn season(&self, id: SeasonId) -> Result<Option<Season>, StorageError> {
        self.seasons.get(id)
    }

    pub fn season_by_key(
        &self,
        provider_config_id: &str,
        indexed_id: &str,
    ) -> Result<Option<Season>, StorageError> {
        self.seasons
            .find_by_key(&(provider_config_id.to_string(), indexed_id.to_string()))
    }

    /// Seasons of one provider config whose title (or an alternative title)
    /// contains `keyword`, ignoring case
    pub fn search_seasons(
        &self,
        provider_config_id: &str,
        keyword: &str,
    ) -> Result<Vec<Season>, StorageError> {
        let keyword = keyword.to_lowercase();
        self.seasons.filter(|season| {
            season.provider_config_id == provider_config_id
                && std::iter::once(&season.title)
                    .chain(season.alternative_titles.iter())
                    .any(|title| title.to_lowercase().contains(&keyword))
        })
    }

    pub fn seasons_by_provider(&self, provider: ProviderKind) -> Result<Vec<Season>, StorageError> {
        self.seasons.filter(|season| season.provider == provider)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::Database;
    use crate::test_support::season_insert;

    #[test]
    fn test_seasons_unique_per_config_and_indexed_id() {
        let db = Database::in_memory();

        let a = db.upsert_season(season_insert("dandanplay", "100", "Show A")).unwrap();
        let b = db.upsert_season(season_insert("dandanplay", "100", "Show A (TV)")).unwrap();
        // Same natural key under a different config is a different season
        let c = db.upsert_season(season_insert("dandanplay-mirror", "100", "Show A")).unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(b.version, 2);
        assert_eq!(b.title, "Show A (TV)");
        assert_ne!(a.id, c.id);
        assert_eq!(
            db.season_by_key("dandanplay", "100").unwrap().unwrap().title,
            "Show A (TV)"
        );
    }

    #[test]
    fn test_search_seasons() {
        let db = Database::in_memory();
        let mut insert = season_insert("custom", "1", "My Recording");
        insert.alternative_titles = vec!["Another Name".to_string()];
        db.upsert_season(insert).unwrap();
        db.upsert_season(season_insert("other", "2", "My Recording")).unwrap();

        assert_eq!(db.search_seasons("custom", "recording").unwrap().len(), 1);
        assert_eq!(db.search_seasons("custom", "ANOTHER").unwrap().len(), 1);
        assert!(db.search_seasons("custom", "missing").unwrap().is_empty());
    }
}
