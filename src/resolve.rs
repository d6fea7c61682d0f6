//! Episode resolution
//!
//! Turns a persisted season plus an episode number into a concrete episode
//! by asking the season's provider. No retries and no caching; callers decide
//! what a failure means.

use crate::matching::MatchOptions;
use crate::model::{EpisodeWithSeason, ProviderKind, Season};
use crate::provider::{ProviderError, ProviderRegistry, RegistryError};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while resolving an episode
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The season belongs to a provider config that no longer exists
    #[error("Provider config '{0}' not found")]
    ConfigNotFound(String),

    /// The provider could not be created
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The provider cannot look up episodes by number
    #[error("Provider {provider} does not support episode matching")]
    Unsupported { provider: ProviderKind },

    /// The season has no episode with this number
    #[error("Episode {number} not found in season '{season}'")]
    EpisodeNotFound { number: u32, season: String },

    /// The provider failed while looking up the episode
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ResolveError {
    /// Whether the failure is an expected miss or a remote failure
    ///
    /// Recoverable errors are reported as "not found" by the matching
    /// strategies. Everything else is a configuration or programming error
    /// and must reach the caller.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ResolveError::EpisodeNotFound { .. } => true,
            ResolveError::Provider(error) => matches!(
                error,
                ProviderError::RequestError(_)
                    | ProviderError::ParseError(_)
                    | ProviderError::ApiError(_)
                    | ProviderError::NotFound(_)
                    | ProviderError::InvalidData(_)
            ),
            ResolveError::ConfigNotFound(_)
            | ResolveError::Registry(_)
            | ResolveError::Unsupported { .. } => false,
        }
    }
}

/// Locates episodes inside persisted seasons
#[derive(Clone)]
pub struct EpisodeResolver {
    registry: Arc<ProviderRegistry>,
    options: Arc<MatchOptions>,
}

impl EpisodeResolver {
    pub fn new(registry: Arc<ProviderRegistry>, options: Arc<MatchOptions>) -> Self {
        Self { registry, options }
    }

    /// Finds episode `episode_number` of `season` through its provider
    pub fn resolve_episode(
        &self,
        season: &Season,
        episode_number: u32,
    ) -> Result<EpisodeWithSeason, ResolveError> {
        let config = self
            .options
            .config(&season.provider_config_id)
            .ok_or_else(|| ResolveError::ConfigNotFound(season.provider_config_id.clone()))?;
        let provider = self.registry.create(config)?;

        let episode = match provider.find_episode(season, episode_number) {
            Ok(Some(episode)) => episode,
            Ok(None) => {
                return Err(ResolveError::EpisodeNotFound {
                    number: episode_number,
                    season: season.title.clone(),
                });
            }
            Err(ProviderError::Unsupported { provider, .. }) => {
                return Err(ResolveError::Unsupported { provider });
            }
            Err(e) => return Err(e.into()),
        };

        log::debug!(
            "Resolved episode {} of '{}' to {}",
            episode_number,
            season.title,
            episode.indexed_id
        );

        Ok(EpisodeWithSeason {
            season: season.clone(),
            episode,
        })
    }
}
