//! Episode matching
//!
//! Resolves "now playing" context (a title, maybe an episode number, maybe an
//! explicit season) into an episode by running a fixed chain of strategies:
//! local imports first, then cached title mappings, then a provider search.
//! The first strategy that produces a result ends the chain.

mod local;
mod mapping;
mod search;

pub use local::LocalStrategy;
pub use mapping::MappingStrategy;
pub use search::SearchStrategy;

use crate::model::{EpisodeWithSeason, LocalEpisode, Season, SeasonId, map_key};
use crate::provider::{ProviderConfig, ProviderError, ProviderRegistry, RegistryError};
use crate::resolve::{EpisodeResolver, ResolveError};
use crate::storage::{Database, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Cause reported when a mapped season was found but no episode was asked for
pub const EPISODE_NUMBER_UNDEFINED: &str = "episode number is undefined";

/// Cause reported when every strategy passed
pub const NO_STRATEGY_MATCHED: &str = "all strategies returned null";

/// Errors that abort the matching chain
///
/// Expected misses never end up here; they are reported as
/// [`MatchEpisodeResult::NotFound`].
#[derive(Debug, Error)]
pub enum MatchError {
    /// An explicit season id does not exist
    #[error("Season {0} not found")]
    SeasonNotFound(SeasonId),

    /// The automatic search provider returned a custom season
    #[error("Provider '{config_id}' returned custom seasons, which can not be matched automatically")]
    CustomSearchResult { config_id: String },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Searching the automatic provider failed
    #[error("Search failed: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The strategies of the matching chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Local,
    Mapping,
    Search,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::Local => "local",
            StrategyKind::Mapping => "mapping",
            StrategyKind::Search => "search",
        })
    }
}

/// What the caller observed and wants resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEpisodeInput {
    pub map_key: String,
    pub title: String,
    /// Original (often file-name style) title, preferred for local matching
    pub original_title: Option<String>,
    pub episode_number: Option<u32>,
    /// Season explicitly chosen by the user
    pub season_id: Option<SeasonId>,
    pub integration: Option<String>,
}

impl MatchEpisodeInput {
    /// Input for `title`, keyed the way title mappings are keyed
    pub fn new(title: impl Into<String>, integration: Option<&str>) -> Self {
        let title = title.into();
        Self {
            map_key: map_key(&title, integration),
            title,
            original_title: None,
            episode_number: None,
            season_id: None,
            integration: integration.map(str::to_string),
        }
    }

    pub fn with_episode_number(mut self, episode_number: u32) -> Self {
        self.episode_number = Some(episode_number);
        self
    }

    pub fn with_season_id(mut self, season_id: SeasonId) -> Self {
        self.season_id = Some(season_id);
        self
    }

    pub fn with_original_title(mut self, original_title: impl Into<String>) -> Self {
        self.original_title = Some(original_title.into());
        self
    }
}

/// A matched episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum ResolvedEpisode {
    Provider(EpisodeWithSeason),
    Local(LocalEpisode),
}

/// Which strategy (and provider) produced a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchMetadata {
    pub strategy: StrategyKind,
    pub provider_config_id: Option<String>,
}

/// Terminal outcome of a match attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MatchEpisodeResult {
    Success {
        episode: ResolvedEpisode,
        metadata: MatchMetadata,
    },
    NotFound {
        cause: Option<String>,
    },
    /// Several seasons fit; the caller should ask the user and retry with a
    /// season id
    Disambiguation { candidates: Vec<Season> },
}

impl MatchEpisodeResult {
    pub(crate) fn resolved(episode: EpisodeWithSeason, strategy: StrategyKind) -> Self {
        let provider_config_id = Some(episode.season.provider_config_id.clone());
        MatchEpisodeResult::Success {
            episode: ResolvedEpisode::Provider(episode),
            metadata: MatchMetadata {
                strategy,
                provider_config_id,
            },
        }
    }

    pub(crate) fn not_found(cause: impl Into<String>) -> Self {
        MatchEpisodeResult::NotFound {
            cause: Some(cause.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MatchEpisodeResult::Success { .. })
    }
}

/// Source of locally imported episodes
pub trait LocalEpisodeLookup: Send + Sync {
    /// Finds an imported episode whose title matches `title` file-name style
    fn match_local_by_title(&self, title: &str) -> Result<Option<LocalEpisode>, StorageError>;
}

/// Snapshot of the options the matching chain reads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOptions {
    pub match_local_danmaku: bool,
    /// All provider configs, in priority order
    pub providers: Vec<ProviderConfig>,
}

impl MatchOptions {
    /// Configs eligible for unattended matching, in priority order
    pub fn automatic(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|config| config.is_automatic())
    }

    pub fn config(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|config| config.id == id)
    }
}

/// Collaborators shared by the strategies
#[derive(Clone)]
pub struct MatchContext {
    pub db: Arc<Database>,
    pub registry: Arc<ProviderRegistry>,
    pub options: Arc<MatchOptions>,
    pub local: Arc<dyn LocalEpisodeLookup>,
}

impl MatchContext {
    /// Context whose local lookup is the database itself
    pub fn new(db: Arc<Database>, registry: Arc<ProviderRegistry>, options: MatchOptions) -> Self {
        let local: Arc<dyn LocalEpisodeLookup> = Arc::clone(&db) as Arc<dyn LocalEpisodeLookup>;
        Self {
            db,
            registry,
            options: Arc::new(options),
            local,
        }
    }

    pub fn with_local_lookup(mut self, local: Arc<dyn LocalEpisodeLookup>) -> Self {
        self.local = local;
        self
    }

    pub fn resolver(&self) -> EpisodeResolver {
        EpisodeResolver::new(Arc::clone(&self.registry), Arc::clone(&self.options))
    }
}

/// One attempt at resolving a [`MatchEpisodeInput`]
pub trait MatchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// `Ok(None)` passes the input on to the next strategy
    fn try_match(&self, input: &MatchEpisodeInput)
    -> Result<Option<MatchEpisodeResult>, MatchError>;
}

/// Resolves an episode, reporting recoverable failures as "not found"
pub(crate) fn resolve_or_not_found(
    resolver: &EpisodeResolver,
    season: &Season,
    episode_number: u32,
    strategy: StrategyKind,
) -> Result<MatchEpisodeResult, MatchError> {
    match resolver.resolve_episode(season, episode_number) {
        Ok(episode) => Ok(MatchEpisodeResult::resolved(episode, strategy)),
        Err(e) if e.is_recoverable() => {
            log::warn!("{} strategy could not resolve episode: {}", strategy, e);
            Ok(MatchEpisodeResult::not_found(e.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Runs the matching chain
pub struct EpisodeMatchingService {
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl EpisodeMatchingService {
    /// The standard chain: local, mapping, search
    pub fn new(ctx: MatchContext) -> Self {
        Self::with_strategies(vec![
            Box::new(LocalStrategy::new(
                ctx.options.match_local_danmaku,
                Arc::clone(&ctx.local),
            )),
            Box::new(MappingStrategy::new(&ctx)),
            Box::new(SearchStrategy::new(&ctx)),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn MatchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Runs the strategies in order and returns the first result
    ///
    /// Always produces a result; when every strategy passes, the result is
    /// [`MatchEpisodeResult::NotFound`].
    pub fn find_matching_episodes(
        &self,
        input: &MatchEpisodeInput,
    ) -> Result<MatchEpisodeResult, MatchError> {
        for strategy in &self.strategies {
            log::debug!("Trying {} strategy for '{}'", strategy.kind(), input.map_key);

            if let Some(result) = strategy.try_match(input)? {
                log_outcome(strategy.kind(), input, &result);
                return Ok(result);
            }
        }

        log::info!("No strategy matched '{}'", input.map_key);
        Ok(MatchEpisodeResult::not_found(NO_STRATEGY_MATCHED))
    }
}

fn log_outcome(strategy: StrategyKind, input: &MatchEpisodeInput, result: &MatchEpisodeResult) {
    match result {
        MatchEpisodeResult::Success { .. } => {
            log::info!("Matched '{}' with {} strategy", input.map_key, strategy)
        }
        MatchEpisodeResult::NotFound { cause } => log::info!(
            "{} strategy found nothing for '{}': {}",
            strategy,
            input.map_key,
            cause.as_deref().unwrap_or("no cause given")
        ),
        MatchEpisodeResult::Disambiguation { candidates } => log::info!(
            "{} candidate seasons for '{}'",
            candidates.len(),
            input.map_key
        ),
    }
}
