//! Shared fixtures for unit tests

use crate::matching::MatchOptions;
use crate::model::{
    Comment, CommentMode, EpisodeInsert, EpisodeMeta, EpisodeProviderIds, ProviderKind,
    SEASON_SCHEMA_VERSION, Season, SeasonInsert, SeasonProviderIds,
};
use crate::provider::{
    BilibiliOptions, Capability, DanDanPlayOptions, DanmakuRequest, MacCmsOptions, ParsedEpisode,
    Provider, ProviderConfig, ProviderError, ProviderOptions, ProviderRegistry, next_episode,
    pick_episode,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;

/// A DanDanPlay-shaped season for `config_id`
pub(crate) fn season_insert(config_id: &str, indexed_id: &str, title: &str) -> SeasonInsert {
    SeasonInsert {
        provider: ProviderKind::DanDanPlay,
        provider_config_id: config_id.to_string(),
        indexed_id: indexed_id.to_string(),
        provider_ids: SeasonProviderIds::DanDanPlay {
            anime_id: indexed_id.parse().unwrap_or(0),
        },
        title: title.to_string(),
        alternative_titles: Vec::new(),
        image_url: None,
        episode_count: None,
        year: None,
        schema_version: SEASON_SCHEMA_VERSION,
    }
}

pub(crate) fn episode_meta(indexed_id: &str, episode_number: Option<u32>) -> EpisodeMeta {
    EpisodeMeta {
        provider: ProviderKind::DanDanPlay,
        indexed_id: indexed_id.to_string(),
        provider_ids: EpisodeProviderIds::DanDanPlay {
            episode_id: indexed_id.parse().unwrap_or(0),
        },
        title: format!("Episode {}", indexed_id),
        episode_number,
    }
}

/// Scriptable provider that records how often it was called
pub(crate) struct FakeProvider {
    kind: ProviderKind,
    config_id: String,
    automatic: bool,
    search_results: Vec<SeasonInsert>,
    episodes: Vec<EpisodeMeta>,
    find_episode: bool,
    fail_search: bool,
    fail_episodes: bool,
    search_calls: AtomicUsize,
    find_calls: AtomicUsize,
    danmaku_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(kind: ProviderKind, config_id: &str) -> Self {
        Self {
            kind,
            config_id: config_id.to_string(),
            automatic: true,
            search_results: Vec::new(),
            episodes: Vec::new(),
            find_episode: true,
            fail_search: false,
            fail_episodes: false,
            search_calls: AtomicUsize::new(0),
            find_calls: AtomicUsize::new(0),
            danmaku_calls: AtomicUsize::new(0),
        }
    }

    pub fn dandanplay(config_id: &str) -> Self {
        Self::new(ProviderKind::DanDanPlay, config_id)
    }

    /// Search results, one season per `(indexed_id, title)`
    pub fn with_seasons(mut self, seasons: &[(&str, &str)]) -> Self {
        self.search_results = seasons
            .iter()
            .map(|(indexed_id, title)| {
                let mut season = season_insert(&self.config_id, indexed_id, title);
                season.provider = self.kind;
                season
            })
            .collect();
        self
    }

    pub fn with_search_results(mut self, results: Vec<SeasonInsert>) -> Self {
        self.search_results = results;
        self
    }

    pub fn with_episodes(mut self, episodes: Vec<EpisodeMeta>) -> Self {
        self.episodes = episodes;
        self
    }

    /// Not eligible for automatic matching
    pub fn manual(mut self) -> Self {
        self.automatic = false;
        self
    }

    pub fn without_find_episode(mut self) -> Self {
        self.find_episode = false;
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn failing_episodes(mut self) -> Self {
        self.fail_episodes = true;
        self
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn danmaku_calls(&self) -> usize {
        self.danmaku_calls.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> ProviderConfig {
        let options = match self.kind {
            ProviderKind::DanDanPlay => ProviderOptions::DanDanPlay(DanDanPlayOptions::default()),
            ProviderKind::Bilibili => ProviderOptions::Bilibili(BilibiliOptions::default()),
            ProviderKind::MacCms => ProviderOptions::MacCms(MacCmsOptions::default()),
            ProviderKind::Custom => ProviderOptions::Custom,
        };
        ProviderConfig {
            id: self.config_id.clone(),
            name: format!("Fake {}", self.config_id),
            enabled: true,
            auto_match: self.automatic,
            options,
        }
    }
}

impl Provider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn config_id(&self) -> &str {
        &self.config_id
    }

    fn search(&self, _keyword: &str) -> Result<Vec<SeasonInsert>, ProviderError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_search {
            return Err(ProviderError::RequestError("search unavailable".to_string()));
        }
        Ok(self.search_results.clone())
    }

    fn get_episodes(&self, _season: &Season) -> Result<Vec<EpisodeMeta>, ProviderError> {
        if self.fail_episodes {
            return Err(ProviderError::RequestError("episodes unavailable".to_string()));
        }
        Ok(self.episodes.clone())
    }

    fn get_danmaku(&self, request: &DanmakuRequest) -> Result<EpisodeInsert, ProviderError> {
        let call = self.danmaku_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let comment = Comment {
            cid: Some(call as u64),
            time: 1.0,
            mode: CommentMode::Scroll,
            color: 0xFFFFFF,
            uid: String::new(),
            text: format!("fetch {}", call),
        };
        Ok(EpisodeInsert::from_meta(
            request.season.id,
            request.episode.clone(),
            vec![comment],
        ))
    }

    fn find_episode(
        &self,
        season: &Season,
        episode_number: u32,
    ) -> Result<Option<EpisodeMeta>, ProviderError> {
        if !self.find_episode {
            return Err(self.unsupported(Capability::FindEpisode));
        }
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        Ok(pick_episode(self.get_episodes(season)?, episode_number))
    }

    fn refresh_season(&self, season: &Season) -> Result<SeasonInsert, ProviderError> {
        let mut refreshed = season.data.clone();
        refreshed.episode_count = Some(self.episodes.len() as u32);
        Ok(refreshed)
    }

    fn preload_next_episode(
        &self,
        season: &Season,
        current: &EpisodeMeta,
    ) -> Result<Option<EpisodeMeta>, ProviderError> {
        Ok(next_episode(self.get_episodes(season)?, current))
    }

    fn can_parse(&self, url: &Url) -> bool {
        url.host_str() == Some("fake.example")
    }

    fn parse_url(&self, _url: &Url) -> Result<Option<ParsedEpisode>, ProviderError> {
        Ok(self
            .search_results
            .first()
            .cloned()
            .zip(self.episodes.first().cloned())
            .map(|(season, episode)| ParsedEpisode { season, episode }))
    }
}

/// Registry handing out the given fakes by config id
pub(crate) fn registry_with(fakes: &[Arc<FakeProvider>]) -> ProviderRegistry {
    let by_id: Arc<BTreeMap<String, Arc<FakeProvider>>> = Arc::new(
        fakes
            .iter()
            .map(|fake| (fake.config_id.clone(), Arc::clone(fake)))
            .collect(),
    );

    let mut builder = ProviderRegistry::builder();
    for kind in ProviderKind::ALL {
        let by_id = Arc::clone(&by_id);
        builder = builder.register(kind, move |config: &ProviderConfig| {
            let fake = by_id.get(&config.id).ok_or_else(|| {
                ProviderError::InvalidConfig(format!("no fake for '{}'", config.id))
            })?;
            let provider: Arc<dyn Provider> = Arc::clone(fake) as Arc<dyn Provider>;
            Ok(provider)
        });
    }
    builder.build().expect("every kind is registered")
}

/// Match options listing the fakes' configs in order
pub(crate) fn fake_options(fakes: &[Arc<FakeProvider>]) -> MatchOptions {
    MatchOptions {
        match_local_danmaku: false,
        providers: fakes.iter().map(|fake| fake.config()).collect(),
    }
}
