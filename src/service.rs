//! Danmaku service
//!
//! The layer callers talk to: searching, listing episodes, fetching and
//! caching comments, and running the matching chain. It shares its database,
//! registry and options with the matching pipeline.

use crate::matching::{
    EpisodeMatchingService, MatchContext, MatchEpisodeInput, MatchEpisodeResult, MatchError,
    MatchOptions,
};
use crate::model::{
    Comment, Episode, EpisodeMeta, EpisodeWithSeason, LocalEpisode, LocalEpisodeInsert, Season,
    SeasonId,
};
use crate::provider::{
    DanmakuRequest, Provider, ProviderConfig, ProviderError, ProviderRegistry, RegistryError,
};
use crate::storage::{Database, StorageError};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Errors that can occur in the danmaku service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No provider config with this id
    #[error("Provider config '{0}' not found")]
    ConfigNotFound(String),

    /// No season with this id
    #[error("Season {0} not found")]
    SeasonNotFound(SeasonId),

    /// The URL could not be parsed
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Match(#[from] MatchError),
}

/// Options for [`DanmakuService::fetch_danmaku`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Fetch from the provider even if the episode is already stored
    pub force_update: bool,
}

pub struct DanmakuService {
    db: Arc<Database>,
    registry: Arc<ProviderRegistry>,
    options: Arc<MatchOptions>,
    matcher: EpisodeMatchingService,
}

impl DanmakuService {
    pub fn new(ctx: MatchContext) -> Self {
        Self {
            db: Arc::clone(&ctx.db),
            registry: Arc::clone(&ctx.registry),
            options: Arc::clone(&ctx.options),
            matcher: EpisodeMatchingService::new(ctx),
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    fn config(&self, config_id: &str) -> Result<&ProviderConfig, ServiceError> {
        self.options
            .config(config_id)
            .ok_or_else(|| ServiceError::ConfigNotFound(config_id.to_string()))
    }

    fn provider(&self, config_id: &str) -> Result<Arc<dyn Provider>, ServiceError> {
        Ok(self.registry.create(self.config(config_id)?)?)
    }

    fn season(&self, season_id: SeasonId) -> Result<Season, ServiceError> {
        self.db
            .season(season_id)?
            .ok_or(ServiceError::SeasonNotFound(season_id))
    }

    /// Runs the matching chain
    pub fn find_matching_episodes(
        &self,
        input: &MatchEpisodeInput,
    ) -> Result<MatchEpisodeResult, ServiceError> {
        Ok(self.matcher.find_matching_episodes(input)?)
    }

    /// Searches one provider and stores the results as seasons
    pub fn search_seasons(
        &self,
        config_id: &str,
        keyword: &str,
    ) -> Result<Vec<Season>, ServiceError> {
        let results = self.provider(config_id)?.search(keyword)?;
        log::info!(
            "Search for '{}' on '{}' returned {} season(s)",
            keyword,
            config_id,
            results.len()
        );
        Ok(self.db.bulk_upsert_seasons(results)?)
    }

    /// Lists the episodes of a stored season from its provider
    pub fn get_episodes(&self, season_id: SeasonId) -> Result<Vec<EpisodeMeta>, ServiceError> {
        let season = self.season(season_id)?;
        let provider = self.provider(&season.provider_config_id)?;
        Ok(provider.get_episodes(&season)?)
    }

    /// Returns the comments of an episode
    ///
    /// A stored episode is returned as is unless `force_update` is set;
    /// otherwise the comments are fetched and the stored row updated.
    pub fn fetch_danmaku(
        &self,
        target: &EpisodeWithSeason,
        options: FetchOptions,
    ) -> Result<Episode, ServiceError> {
        if !options.force_update {
            if let Some(stored) = self
                .db
                .episode_by_key(target.season.id, &target.episode.indexed_id)?
            {
                log::debug!(
                    "Using stored comments for '{}' (version {})",
                    stored.title,
                    stored.version
                );
                return Ok(stored);
            }
        }

        let provider = self.provider(&target.season.provider_config_id)?;
        let fetched = provider.get_danmaku(&DanmakuRequest {
            season: target.season.clone(),
            episode: target.episode.clone(),
        })?;

        log::info!(
            "Fetched {} comment(s) for '{}'",
            fetched.comment_count,
            fetched.title
        );
        Ok(self.db.upsert_episode(fetched)?)
    }

    /// Re-reads season details from the provider and stores them
    pub fn refresh_season(&self, season_id: SeasonId) -> Result<Season, ServiceError> {
        let season = self.season(season_id)?;
        let provider = self.provider(&season.provider_config_id)?;
        let refreshed = provider.refresh_season(&season)?;
        Ok(self.db.upsert_season(refreshed)?)
    }

    /// Fetches the comments of the episode following `current`
    pub fn preload_next_episode(
        &self,
        current: &EpisodeWithSeason,
    ) -> Result<Option<Episode>, ServiceError> {
        let provider = self.provider(&current.season.provider_config_id)?;
        let Some(next) = provider.preload_next_episode(&current.season, &current.episode)? else {
            return Ok(None);
        };

        let target = EpisodeWithSeason {
            season: current.season.clone(),
            episode: next,
        };
        self.fetch_danmaku(&target, FetchOptions::default())
            .map(Some)
    }

    /// Resolves a direct episode URL with the first enabled provider that
    /// understands it
    pub fn parse_url(&self, url: &str) -> Result<Option<EpisodeWithSeason>, ServiceError> {
        let parsed_url = Url::parse(url).map_err(|source| ServiceError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        for config in self.options.providers.iter().filter(|c| c.enabled) {
            let provider = self.registry.create(config)?;
            if !provider.can_parse(&parsed_url) {
                continue;
            }

            log::debug!("Parsing {} with provider '{}'", url, config.id);
            let Some(parsed) = provider.parse_url(&parsed_url)? else {
                return Ok(None);
            };
            let season = self.db.upsert_season(parsed.season)?;
            return Ok(Some(EpisodeWithSeason {
                season,
                episode: parsed.episode,
            }));
        }

        Ok(None)
    }

    /// Stores imported comments for local matching
    pub fn import_local(
        &self,
        title: &str,
        comments: Vec<Comment>,
    ) -> Result<LocalEpisode, ServiceError> {
        let episode = self
            .db
            .import_local_episode(LocalEpisodeInsert::new(title, comments))?;
        log::info!(
            "Imported {} comment(s) as '{}'",
            episode.comment_count,
            episode.title
        );
        Ok(episode)
    }
}
