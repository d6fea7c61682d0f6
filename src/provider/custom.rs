/// Custom provider implementation.
use super::{DanmakuRequest, Provider, ProviderError, next_episode};
use crate::model::{EpisodeInsert, EpisodeMeta, ProviderKind, Season, SeasonInsert};
use crate::storage::Database;
use std::sync::Arc;

/// Provider for manually created seasons.
///
/// Custom seasons and their episodes only exist in the database, so every
/// operation is a lookup there. Custom seasons are never eligible for
/// automatic search matching.
pub struct CustomProvider {
    config_id: String,
    db: Arc<Database>,
}

impl CustomProvider {
    pub fn new(config_id: impl Into<String>, db: Arc<Database>) -> Self {
        Self {
            config_id: config_id.into(),
            db,
        }
    }
}

impl Provider for CustomProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Custom
    }

    fn config_id(&self) -> &str {
        &self.config_id
    }

    fn search(&self, keyword: &str) -> Result<Vec<SeasonInsert>, ProviderError> {
        Ok(self
            .db
            .search_seasons(&self.config_id, keyword)?
            .into_iter()
            .map(|season| season.data)
            .collect())
    }

    fn get_episodes(&self, season: &Season) -> Result<Vec<EpisodeMeta>, ProviderError> {
        Ok(self
            .db
            .episodes_for_season(season.id)?
            .iter()
            .map(|episode| episode.meta())
            .collect())
    }

    fn get_danmaku(&self, request: &DanmakuRequest) -> Result<EpisodeInsert, ProviderError> {
        self.db
            .episode_by_key(request.season.id, &request.episode.indexed_id)?
            .map(|episode| episode.data)
            .ok_or_else(|| {
                ProviderError::NotFound(format!(
                    "Custom episode {} in season {}",
                    request.episode.indexed_id, request.season.id
                ))
            })
    }

    /// Custom episodes are matched by their explicit number only; there is
    /// no meaningful ordinal fallback for hand-assembled seasons.
    fn find_episode(
        &self,
        season: &Season,
        episode_number: u32,
    ) -> Result<Option<EpisodeMeta>, ProviderError> {
        Ok(self
            .get_episodes(season)?
            .into_iter()
            .find(|episode| episode.episode_number == Some(episode_number)))
    }

    fn preload_next_episode(
        &self,
        season: &Season,
        current: &EpisodeMeta,
    ) -> Result<Option<EpisodeMeta>, ProviderError> {
        Ok(next_episode(self.get_episodes(season)?, current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EpisodeProviderIds, SeasonProviderIds};
    use crate::test_support::season_insert;

    fn custom_season(db: &Database) -> Season {
        let mut insert = season_insert("custom", "my-show", "My Show");
        insert.provider = ProviderKind::Custom;
        insert.provider_ids = SeasonProviderIds::Custom {
            key: "my-show".to_string(),
        };
        db.upsert_season(insert).unwrap()
    }

    fn custom_episode(season: &Season, key: &str, number: u32) -> EpisodeInsert {
        let meta = EpisodeMeta {
            provider: ProviderKind::Custom,
            indexed_id: key.to_string(),
            provider_ids: EpisodeProviderIds::Custom {
                key: key.to_string(),
            },
            title: key.to_string(),
            episode_number: Some(number),
        };
        EpisodeInsert::from_meta(season.id, meta, Vec::new())
    }

    #[test]
    fn test_custom_provider_reads_from_database() {
        let db = Arc::new(Database::in_memory());
        let season = custom_season(&db);
        db.bulk_upsert_episodes(vec![
            custom_episode(&season, "e2", 2),
            custom_episode(&season, "e1", 1),
        ])
        .unwrap();

        let provider = CustomProvider::new("custom", Arc::clone(&db));

        let found = provider.search("my").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].provider, ProviderKind::Custom);

        let episodes = provider.get_episodes(&season).unwrap();
        assert_eq!(episodes[0].indexed_id, "e1");

        let second = provider.find_episode(&season, 2).unwrap().unwrap();
        assert_eq!(second.indexed_id, "e2");
        assert!(provider.find_episode(&season, 3).unwrap().is_none());

        let request = DanmakuRequest {
            season: season.clone(),
            episode: second,
        };
        assert_eq!(provider.get_danmaku(&request).unwrap().indexed_id, "e2");
    }
}
