//! danmaku_resolver - Resolve "now playing" context to danmaku episodes
//!
//! This library turns an observed title (plus an optional episode number or
//! an explicitly chosen season) into a canonical episode carrying overlay
//! comments. It searches pluggable content providers, caches which season a
//! title maps to, and persists seasons and episodes with versioned upserts.

pub mod config;
pub mod matching;
pub mod model;
pub mod provider;
pub mod resolve;
pub mod service;
pub mod storage;

#[cfg(test)]
mod test_support;

// Re-export error types
pub use config::ConfigError;
pub use matching::MatchError;
pub use provider::{ProviderError, RegistryError};
pub use resolve::ResolveError;
pub use service::ServiceError;
pub use storage::StorageError;

// Re-export the types most callers need
pub use config::Settings;
pub use matching::{
    EpisodeMatchingService, MatchContext, MatchEpisodeInput, MatchEpisodeResult, MatchOptions,
    ResolvedEpisode,
};
pub use service::{DanmakuService, FetchOptions};
pub use storage::Database;

use provider::{HttpClient, ProviderRegistry};
use std::sync::Arc;
use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Error while loading settings
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error in the storage layer
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Error while building or using the provider registry
    #[error("Provider registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error while resolving an episode
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Error that aborted the matching chain
    #[error("Matching error: {0}")]
    Match(#[from] MatchError),

    /// Error in the danmaku service
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

/// Opens the database and wires up a [`DanmakuService`] for `settings`
///
/// The database lives in the settings' data directory (the platform data
/// directory by default). All built-in providers share one HTTP client and
/// with it one set of header rules.
///
/// # Examples
///
/// ```no_run
/// use danmaku_resolver::{MatchEpisodeInput, MatchEpisodeResult, Settings, open_service};
///
/// let service = open_service(&Settings::load_default().unwrap()).unwrap();
/// let input = MatchEpisodeInput::new("Show A", None).with_episode_number(3);
///
/// match service.find_matching_episodes(&input).unwrap() {
///     MatchEpisodeResult::Success { .. } => println!("found it"),
///     MatchEpisodeResult::NotFound { cause } => println!("not found: {:?}", cause),
///     MatchEpisodeResult::Disambiguation { candidates } => {
///         println!("{} candidates", candidates.len())
///     }
/// }
/// ```
pub fn open_service(settings: &Settings) -> Result<DanmakuService, Error> {
    let db = Arc::new(Database::open(&settings.data_dir()?)?);
    let registry = ProviderRegistry::builtin(HttpClient::new(), Arc::clone(&db))?;
    let ctx = MatchContext::new(db, Arc::new(registry), settings.match_options());
    Ok(DanmakuService::new(ctx))
}
