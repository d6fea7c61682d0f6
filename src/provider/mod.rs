//! Content providers
//!
//! A provider is one integration against an external content-metadata API
//! (or, for custom seasons, against the local database). Every provider can
//! search, list episodes and fetch comments; the remaining capabilities are
//! optional and report [`ProviderError::Unsupported`] when absent.
mod bilibili;
mod bilibili_types;
mod config;
mod custom;
mod dandanplay;
mod dandanplay_types;
mod http;
mod maccms;
mod maccms_types;
mod registry;

pub use bilibili::BilibiliProvider;
pub use config::{
    BilibiliOptions, ChConvert, DanDanPlayOptions, MacCmsOptions, ProviderConfig, ProviderOptions,
};
pub use custom::CustomProvider;
pub use dandanplay::DanDanPlayProvider;
pub use http::{HeaderRule, HeaderRuleGuard, HeaderRules, HttpClient};
pub use maccms::MacCmsProvider;
pub use registry::{ProviderFactory, ProviderRegistry, ProviderRegistryBuilder, RegistryError};

use crate::model::{EpisodeInsert, EpisodeMeta, ProviderKind, Season, SeasonInsert};
use crate::storage::StorageError;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Optional provider capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    FindEpisode,
    RefreshSeason,
    PreloadNextEpisode,
    ParseUrl,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::FindEpisode => "episode matching",
            Capability::RefreshSeason => "season refresh",
            Capability::PreloadNextEpisode => "next episode preloading",
            Capability::ParseUrl => "url parsing",
        })
    }
}

/// Errors that can occur while talking to a provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request to the provider failed
    #[error("Request failed: {0}")]
    RequestError(String),

    /// Failed to parse the provider's response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// The provider answered with an application-level error
    #[error("Provider returned an error: {0}")]
    ApiError(String),

    /// The requested item does not exist on the provider
    #[error("Not found: {0}")]
    NotFound(String),

    /// The API returned invalid or unexpected data
    #[error("API returned invalid data: {0}")]
    InvalidData(String),

    /// The provider does not implement an optional capability
    #[error("Provider {provider} does not support {capability}")]
    Unsupported {
        provider: ProviderKind,
        capability: Capability,
    },

    /// A configuration value could not be used
    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),

    /// The header rule set lock was poisoned
    #[error("Header rule lock was poisoned")]
    Poisoned,

    /// Database access failed (custom provider)
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Request for the comments of one episode
#[derive(Debug, Clone, PartialEq)]
pub struct DanmakuRequest {
    pub season: Season,
    pub episode: EpisodeMeta,
}

/// Result of resolving a direct episode URL
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEpisode {
    pub season: SeasonInsert,
    pub episode: EpisodeMeta,
}

/// Trait for content providers.
///
/// Implementors fetch seasons, episodes and comments from one external
/// source. Search results are not persisted by the provider; the caller
/// upserts them.
pub trait Provider: Send + Sync {
    /// The implementation behind this provider
    fn kind(&self) -> ProviderKind;

    /// Id of the config this instance was created from
    fn config_id(&self) -> &str;

    /// Searches seasons by keyword
    fn search(&self, keyword: &str) -> Result<Vec<SeasonInsert>, ProviderError>;

    /// Lists the episodes of a persisted season
    fn get_episodes(&self, season: &Season) -> Result<Vec<EpisodeMeta>, ProviderError>;

    /// Fetches the comments of an episode, normalized to [`crate::model::Comment`]
    fn get_danmaku(&self, request: &DanmakuRequest) -> Result<EpisodeInsert, ProviderError>;

    /// Locates the episode with the given number in a season
    ///
    /// `Ok(None)` means the season has no such episode.
    fn find_episode(
        &self,
        _season: &Season,
        _episode_number: u32,
    ) -> Result<Option<EpisodeMeta>, ProviderError> {
        Err(self.unsupported(Capability::FindEpisode))
    }

    /// Fetches fresh season details
    fn refresh_season(&self, _season: &Season) -> Result<SeasonInsert, ProviderError> {
        Err(self.unsupported(Capability::RefreshSeason))
    }

    /// Returns the episode following `current`, if there is one
    fn preload_next_episode(
        &self,
        _season: &Season,
        _current: &EpisodeMeta,
    ) -> Result<Option<EpisodeMeta>, ProviderError> {
        Err(self.unsupported(Capability::PreloadNextEpisode))
    }

    /// Whether [`Provider::parse_url`] understands this URL
    fn can_parse(&self, _url: &Url) -> bool {
        false
    }

    /// Resolves a direct episode URL into an episode and its season
    fn parse_url(&self, _url: &Url) -> Result<Option<ParsedEpisode>, ProviderError> {
        Err(self.unsupported(Capability::ParseUrl))
    }

    /// Builds the error for a missing optional capability
    fn unsupported(&self, capability: Capability) -> ProviderError {
        ProviderError::Unsupported {
            provider: self.kind(),
            capability,
        }
    }
}

/// Picks an episode by number, falling back to its ordinal position
///
/// Providers that number their episodes inconsistently (specials, missing
/// numbers) still resolve "episode 3" to the third entry.
pub(crate) fn pick_episode(episodes: Vec<EpisodeMeta>, episode_number: u32) -> Option<EpisodeMeta> {
    if let Some(position) = episodes
        .iter()
        .position(|episode| episode.episode_number == Some(episode_number))
    {
        return episodes.into_iter().nth(position);
    }

    let index = usize::try_from(episode_number).ok()?.checked_sub(1)?;
    episodes.into_iter().nth(index)
}

/// Returns the episode listed right after `current`
pub(crate) fn next_episode(episodes: Vec<EpisodeMeta>, current: &EpisodeMeta) -> Option<EpisodeMeta> {
    let position = episodes
        .iter()
        .position(|episode| episode.indexed_id == current.indexed_id)?;
    episodes.into_iter().nth(position + 1)
}
