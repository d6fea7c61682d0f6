use super::{
    EPISODE_NUMBER_UNDEFINED, MatchContext, MatchEpisodeInput, MatchEpisodeResult, MatchError,
    MatchOptions, MatchStrategy, StrategyKind, resolve_or_not_found,
};
use crate::model::{ProviderKind, Season, SeasonMapInsert};
use crate::provider::ProviderRegistry;
use crate::resolve::EpisodeResolver;
use crate::storage::Database;
use std::sync::Arc;

/// Matches by searching the first automatic provider for the title
///
/// A single hit is accepted and cached as the title's mapping. Several hits
/// are handed back for disambiguation without touching the mapping. Search
/// failures are not caught: nothing comes after this strategy.
pub struct SearchStrategy {
    db: Arc<Database>,
    registry: Arc<ProviderRegistry>,
    options: Arc<MatchOptions>,
    resolver: EpisodeResolver,
}

impl SearchStrategy {
    pub fn new(ctx: &MatchContext) -> Self {
        Self {
            db: Arc::clone(&ctx.db),
            registry: Arc::clone(&ctx.registry),
            options: Arc::clone(&ctx.options),
            resolver: ctx.resolver(),
        }
    }
}

impl MatchStrategy for SearchStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Search
    }

    fn try_match(
        &self,
        input: &MatchEpisodeInput,
    ) -> Result<Option<MatchEpisodeResult>, MatchError> {
        let Some(config) = self.options.automatic().next() else {
            log::debug!("No automatic provider configured");
            return Ok(None);
        };

        let provider = self.registry.create(config)?;
        let results = provider.search(&input.title)?;

        if results
            .first()
            .is_some_and(|season| season.provider == ProviderKind::Custom)
        {
            return Err(MatchError::CustomSearchResult {
                config_id: config.id.clone(),
            });
        }

        let mut candidates: Vec<Season> = self
            .db
            .bulk_upsert_seasons(results)?
            .into_iter()
            .filter(|season| season.provider != ProviderKind::Custom)
            .collect();

        log::debug!(
            "Search for '{}' on '{}' returned {} season(s)",
            input.title,
            config.id,
            candidates.len()
        );

        if candidates.len() > 1 {
            return Ok(Some(MatchEpisodeResult::Disambiguation { candidates }));
        }

        let Some(season) = candidates.pop() else {
            return Ok(Some(MatchEpisodeResult::not_found(format!(
                "No seasons found for '{}'",
                input.title
            ))));
        };

        self.db
            .upsert_season_map(SeasonMapInsert::for_season(&input.map_key, &season))?;

        let Some(episode_number) = input.episode_number else {
            return Ok(Some(MatchEpisodeResult::not_found(EPISODE_NUMBER_UNDEFINED)));
        };

        resolve_or_not_found(&self.resolver, &season, episode_number, self.kind()).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        FakeProvider, episode_meta, fake_options, registry_with, season_insert,
    };

    fn setup(
        fakes: Vec<FakeProvider>,
    ) -> (SearchStrategy, Arc<Database>, Vec<Arc<FakeProvider>>) {
        let fakes: Vec<Arc<FakeProvider>> = fakes.into_iter().map(Arc::new).collect();
        let db = Arc::new(Database::in_memory());
        let ctx = MatchContext::new(
            Arc::clone(&db),
            Arc::new(registry_with(&fakes)),
            fake_options(&fakes),
        );
        (SearchStrategy::new(&ctx), db, fakes)
    }

    #[test]
    fn test_no_automatic_provider_falls_through() {
        let (strategy, _, fakes) = setup(vec![
            FakeProvider::dandanplay("fake")
                .manual()
                .with_seasons(&[("1", "Show A")]),
        ]);

        let input = MatchEpisodeInput::new("Show A", None).with_episode_number(1);
        assert_eq!(strategy.try_match(&input).unwrap(), None);
        assert_eq!(fakes[0].search_calls(), 0);
    }

    #[test]
    fn test_searches_first_automatic_provider_only() {
        let (strategy, _, fakes) = setup(vec![
            FakeProvider::dandanplay("manual")
                .manual()
                .with_seasons(&[("1", "Show A")]),
            FakeProvider::dandanplay("auto-1").with_seasons(&[("1", "Show A")]),
            FakeProvider::dandanplay("auto-2").with_seasons(&[("1", "Show A")]),
        ]);

        let input = MatchEpisodeInput::new("Show A", None);
        strategy.try_match(&input).unwrap();

        let calls: Vec<usize> = fakes.iter().map(|fake| fake.search_calls()).collect();
        assert_eq!(calls, vec![0, 1, 0]);
    }

    #[test]
    fn test_single_result_without_episode_number_still_maps() {
        let (strategy, db, _) = setup(vec![
            FakeProvider::dandanplay("fake").with_seasons(&[("1", "Show A")]),
        ]);

        let input = MatchEpisodeInput::new("Show A", None);
        let result = strategy.try_match(&input).unwrap();

        assert_eq!(
            result,
            Some(MatchEpisodeResult::not_found(EPISODE_NUMBER_UNDEFINED))
        );
        assert!(db.season_map("Show A").unwrap().is_some());
    }

    #[test]
    fn test_single_result_falls_back_to_episode_index() {
        let (strategy, _, _) = setup(vec![
            FakeProvider::dandanplay("fake")
                .with_seasons(&[("1", "Show A")])
                .with_episodes(vec![
                    episode_meta("a", None),
                    episode_meta("b", None),
                    episode_meta("c", None),
                ]),
        ]);

        let input = MatchEpisodeInput::new("Show A", None).with_episode_number(3);
        let result = strategy.try_match(&input).unwrap().unwrap();

        match result {
            MatchEpisodeResult::Success {
                episode: crate::matching::ResolvedEpisode::Provider(episode),
                ..
            } => assert_eq!(episode.episode.indexed_id, "c"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_remote_failure_during_resolution_is_not_found() {
        let (strategy, db, _) = setup(vec![
            FakeProvider::dandanplay("fake")
                .with_seasons(&[("1", "Show A")])
                .failing_episodes(),
        ]);

        let input = MatchEpisodeInput::new("Show A", None).with_episode_number(1);
        let result = strategy.try_match(&input).unwrap();

        assert!(matches!(result, Some(MatchEpisodeResult::NotFound { .. })));
        assert_eq!(db.season_map_count().unwrap(), 1);
    }

    #[test]
    fn test_multiple_results_ask_for_disambiguation() {
        let (strategy, db, _) = setup(vec![FakeProvider::dandanplay("fake").with_seasons(&[
            ("1", "Show A"),
            ("2", "Show A Movie"),
            ("3", "Show A OVA"),
        ])]);

        let input = MatchEpisodeInput::new("Show A", None).with_episode_number(1);
        let result = strategy.try_match(&input).unwrap().unwrap();

        match result {
            MatchEpisodeResult::Disambiguation { candidates } => {
                let titles: Vec<&str> = candidates.iter().map(|s| s.title.as_str()).collect();
                assert_eq!(titles, vec!["Show A", "Show A Movie", "Show A OVA"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(db.season_map_count().unwrap(), 0);
    }

    #[test]
    fn test_custom_entries_are_dropped_from_candidates() {
        let mut custom = season_insert("fake", "c1", "Show A (custom)");
        custom.provider = ProviderKind::Custom;
        let (strategy, db, _) = setup(vec![FakeProvider::dandanplay("fake").with_search_results(
            vec![
                season_insert("fake", "1", "Show A"),
                custom,
                season_insert("fake", "2", "Show A Movie"),
            ],
        )]);

        let input = MatchEpisodeInput::new("Show A", None);
        match strategy.try_match(&input).unwrap().unwrap() {
            MatchEpisodeResult::Disambiguation { candidates } => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates.iter().all(|s| s.provider != ProviderKind::Custom));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(db.season_map_count().unwrap(), 0);
    }

    #[test]
    fn test_custom_first_result_is_rejected() {
        let (strategy, _, _) = setup(vec![
            FakeProvider::new(ProviderKind::Custom, "custom").with_seasons(&[("1", "Show A")]),
        ]);

        let input = MatchEpisodeInput::new("Show A", None);
        assert!(matches!(
            strategy.try_match(&input),
            Err(MatchError::CustomSearchResult { ref config_id }) if config_id == "custom"
        ));
    }

    #[test]
    fn test_search_error_propagates() {
        let (strategy, _, _) = setup(vec![FakeProvider::dandanplay("fake").failing_search()]);

        let input = MatchEpisodeInput::new("Show A", None);
        assert!(matches!(
            strategy.try_match(&input),
            Err(MatchError::Provider(_))
        ));
    }
}
