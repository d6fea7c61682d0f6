use super::{
    LocalEpisodeLookup, MatchEpisodeInput, MatchEpisodeResult, MatchError, MatchMetadata,
    MatchStrategy, ResolvedEpisode, StrategyKind,
};
use std::sync::Arc;

/// Matches against locally imported comment files
///
/// A miss passes on to the next strategy; it never reports "not found".
pub struct LocalStrategy {
    enabled: bool,
    lookup: Arc<dyn LocalEpisodeLookup>,
}

impl LocalStrategy {
    pub fn new(enabled: bool, lookup: Arc<dyn LocalEpisodeLookup>) -> Self {
        Self { enabled, lookup }
    }
}

impl MatchStrategy for LocalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Local
    }

    fn try_match(
        &self,
        input: &MatchEpisodeInput,
    ) -> Result<Option<MatchEpisodeResult>, MatchError> {
        if !self.enabled {
            return Ok(None);
        }

        let title = input.original_title.as_deref().unwrap_or(&input.title);
        let Some(episode) = self.lookup.match_local_by_title(title)? else {
            return Ok(None);
        };

        log::debug!("Local episode '{}' matches '{}'", episode.title, title);
        Ok(Some(MatchEpisodeResult::Success {
            episode: ResolvedEpisode::Local(episode),
            metadata: MatchMetadata {
                strategy: StrategyKind::Local,
                provider_config_id: None,
            },
        }))
    }
}
