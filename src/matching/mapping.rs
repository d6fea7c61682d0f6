use super::{
    EPISODE_NUMBER_UNDEFINED, MatchContext, MatchEpisodeInput, MatchEpisodeResult, MatchError,
    MatchOptions, MatchStrategy, StrategyKind, resolve_or_not_found,
};
use crate::model::{Season, SeasonMapInsert};
use crate::resolve::EpisodeResolver;
use crate::storage::{Database, StorageError};
use std::sync::Arc;

/// Matches through an explicit season id or a cached title mapping
///
/// An explicit season id rewrites the mapping for the input's key right away,
/// before the episode is resolved.
pub struct MappingStrategy {
    db: Arc<Database>,
    options: Arc<MatchOptions>,
    resolver: EpisodeResolver,
}

impl MappingStrategy {
    pub fn new(ctx: &MatchContext) -> Self {
        Self {
            db: Arc::clone(&ctx.db),
            options: Arc::clone(&ctx.options),
            resolver: ctx.resolver(),
        }
    }

    /// The season cached for `map_key` under the first automatic provider
    /// that has one
    fn mapped_season(&self, map_key: &str) -> Result<Option<Season>, StorageError> {
        let Some(mapping) = self.db.season_map(map_key)? else {
            return Ok(None);
        };

        for config in self.options.automatic() {
            let Some(season_id) = mapping.season_for(&config.id) else {
                continue;
            };
            match self.db.season(season_id)? {
                Some(season) => return Ok(Some(season)),
                None => log::warn!(
                    "Mapping '{}' points to missing season {} for provider '{}'",
                    map_key,
                    season_id,
                    config.id
                ),
            }
        }
        Ok(None)
    }
}

impl MatchStrategy for MappingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Mapping
    }

    fn try_match(
        &self,
        input: &MatchEpisodeInput,
    ) -> Result<Option<MatchEpisodeResult>, MatchError> {
        let season = match input.season_id {
            Some(season_id) => {
                let season = self
                    .db
                    .season(season_id)?
                    .ok_or(MatchError::SeasonNotFound(season_id))?;
                self.db
                    .upsert_season_map(SeasonMapInsert::for_season(&input.map_key, &season))?;
                season
            }
            None => match self.mapped_season(&input.map_key)? {
                Some(season) => season,
                None => return Ok(None),
            },
        };

        log::debug!("'{}' maps to season '{}'", input.map_key, season.title);

        let Some(episode_number) = input.episode_number else {
            return Ok(Some(MatchEpisodeResult::not_found(EPISODE_NUMBER_UNDEFINED)));
        };

        resolve_or_not_found(&self.resolver, &season, episode_number, self.kind()).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::ResolvedEpisode;
    use crate::test_support::{
        FakeProvider, episode_meta, fake_options, registry_with, season_insert,
    };

    fn context(fakes: Vec<FakeProvider>) -> (MatchContext, Vec<Arc<FakeProvider>>) {
        let fakes: Vec<Arc<FakeProvider>> = fakes.into_iter().map(Arc::new).collect();
        let ctx = MatchContext::new(
            Arc::new(Database::in_memory()),
            Arc::new(registry_with(&fakes)),
            fake_options(&fakes),
        );
        (ctx, fakes)
    }

    fn episodes() -> Vec<crate::model::EpisodeMeta> {
        vec![episode_meta("11", Some(1)), episode_meta("12", Some(2))]
    }

    #[test]
    fn test_no_mapping_falls_through() {
        let (ctx, _) = context(vec![FakeProvider::dandanplay("fake")]);
        let strategy = MappingStrategy::new(&ctx);

        let input = MatchEpisodeInput::new("Show A", None).with_episode_number(1);
        assert_eq!(strategy.try_match(&input).unwrap(), None);
    }

    #[test]
    fn test_explicit_season_writes_mapping_without_episode_number() {
        let (ctx, _) = context(vec![FakeProvider::dandanplay("fake")]);
        let season = ctx
            .db
            .upsert_season(season_insert("fake", "1", "Show A"))
            .unwrap();
        let strategy = MappingStrategy::new(&ctx);

        let input = MatchEpisodeInput::new("Show A", Some("site")).with_season_id(season.id);
        let result = strategy.try_match(&input).unwrap();

        assert_eq!(
            result,
            Some(MatchEpisodeResult::not_found(EPISODE_NUMBER_UNDEFINED))
        );
        let mapping = ctx.db.season_map("site:Show A").unwrap().unwrap();
        assert_eq!(mapping.season_for("fake"), Some(season.id));
    }

    #[test]
    fn test_unknown_explicit_season_is_an_error() {
        let (ctx, _) = context(vec![FakeProvider::dandanplay("fake")]);
        let strategy = MappingStrategy::new(&ctx);

        let input = MatchEpisodeInput::new("Show A", None).with_season_id(42);
        assert!(matches!(
            strategy.try_match(&input),
            Err(MatchError::SeasonNotFound(42))
        ));
    }

    #[test]
    fn test_uses_first_automatic_provider_with_a_slot() {
        let (ctx, fakes) = context(vec![
            FakeProvider::dandanplay("first").with_episodes(episodes()),
            FakeProvider::dandanplay("manual").manual().with_episodes(episodes()),
            FakeProvider::dandanplay("second").with_episodes(episodes()),
        ]);
        let manual = ctx
            .db
            .upsert_season(season_insert("manual", "1", "Show A"))
            .unwrap();
        let second = ctx
            .db
            .upsert_season(season_insert("second", "1", "Show A"))
            .unwrap();
        ctx.db
            .upsert_season_map(SeasonMapInsert::for_season("Show A", &manual))
            .unwrap();
        ctx.db
            .upsert_season_map(SeasonMapInsert::for_season("Show A", &second))
            .unwrap();
        let strategy = MappingStrategy::new(&ctx);

        let input = MatchEpisodeInput::new("Show A", None).with_episode_number(2);
        let result = strategy.try_match(&input).unwrap().unwrap();

        match result {
            MatchEpisodeResult::Success {
                episode: ResolvedEpisode::Provider(episode),
                metadata,
            } => {
                assert_eq!(episode.season.id, second.id);
                assert_eq!(episode.episode.indexed_id, "12");
                assert_eq!(metadata.strategy, StrategyKind::Mapping);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(fakes[1].find_calls(), 0);
        assert_eq!(fakes[2].find_calls(), 1);
    }

    #[test]
    fn test_resolver_miss_becomes_not_found() {
        let (ctx, _) = context(vec![FakeProvider::dandanplay("fake").with_episodes(episodes())]);
        let season = ctx
            .db
            .upsert_season(season_insert("fake", "1", "Show A"))
            .unwrap();
        let strategy = MappingStrategy::new(&ctx);

        let input = MatchEpisodeInput::new("Show A", None)
            .with_season_id(season.id)
            .with_episode_number(7);
        let result = strategy.try_match(&input).unwrap().unwrap();

        assert!(matches!(
            result,
            MatchEpisodeResult::NotFound { cause: Some(ref cause) } if cause.contains("Episode 7")
        ));
    }

    #[test]
    fn test_missing_capability_propagates() {
        let (ctx, _) = context(vec![FakeProvider::dandanplay("fake").without_find_episode()]);
        let season = ctx
            .db
            .upsert_season(season_insert("fake", "1", "Show A"))
            .unwrap();
        let strategy = MappingStrategy::new(&ctx);

        let input = MatchEpisodeInput::new("Show A", None)
            .with_season_id(season.id)
            .with_episode_number(1);
        assert!(matches!(
            strategy.try_match(&input),
            Err(MatchError::Resolve(_))
        ));
    }
}
