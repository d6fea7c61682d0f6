use super::table::Record;
use super::{Database, StorageError};
use crate::model::{Episode, EpisodeId, EpisodeInsert, SeasonId};

impl Record for EpisodeInsert {
    type Key = (SeasonId, String);

    fn natural_key(&self) -> Self::Key {
        (self.season_id, self.indexed_id.clone())
    }
}

impl Database {
    pub fn upsert_episode(&self, episode: EpisodeInsert) -> Result<Episode, StorageError> {
        self.episodes.upsert(episode)
    }

    pub fn bulk_upsert_episodes(
        &self,
        episodes: Vec<EpisodeInsert>,
    ) -> Result<Vec<Episode>, StorageError> {
        self.episodes.bulk_upsert(episodes)
    }

    pub fn episode(&self, id: EpisodeId) -> Result<Option<Episode>, StorageError> {
        self.episodes.get(id)
    }

    /// Looks an episode up by its natural key
    ///
    /// This is the freshness check used before going to the network: a hit
    /// means the comments were fetched before.
    pub fn episode_by_key(
        &self,
        season_id: SeasonId,
        indexed_id: &str,
    ) -> Result<Option<Episode>, StorageError> {
        self.episodes
            .find_by_key(&(season_id, indexed_id.to_string()))
    }

    /// All stored episodes of a season, ordered by episode number
    ///
    /// Episodes without a number keep their insertion order after the
    /// numbered ones.
    pub fn episodes_for_season(&self, season_id: SeasonId) -> Result<Vec<Episode>, StorageError> {
        let mut episodes = self
            .episodes
            .filter(|episode| episode.season_id == season_id)?;
        episodes.sort_by_key(|episode| episode.episode_number.unwrap_or(u32::MAX));
        Ok(episodes)
    }
}
