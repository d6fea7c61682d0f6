/// DanDanPlay provider implementation.
use super::dandanplay_types::{
    DdpAnime, DdpBangumi, DdpBangumiResponse, DdpCommentResponse, DdpSearchResponse, DdpStatus,
};
use super::http::{HttpClient, build_url};
use super::{
    DanDanPlayOptions, DanmakuRequest, Provider, ProviderError, next_episode, pick_episode,
};
use crate::model::{
    Comment, EpisodeInsert, EpisodeMeta, EpisodeProviderIds, ProviderKind, SEASON_SCHEMA_VERSION,
    Season, SeasonInsert, SeasonProviderIds,
};

/// Provider for the DanDanPlay API.
///
/// Seasons are DanDanPlay "animes", episodes are listed through the bangumi
/// endpoint and comments come from the comment endpoint, optionally merged
/// with related third-party sources.
pub struct DanDanPlayProvider {
    config_id: String,
    options: DanDanPlayOptions,
    http: HttpClient,
}

impl DanDanPlayProvider {
    pub fn new(config_id: impl Into<String>, options: DanDanPlayOptions, http: HttpClient) -> Self {
        let config_id = config_id.into();
        Self {
            http: http.scoped(config_id.clone()),
            config_id,
            options,
        }
    }

    /// Auth and user-configured headers sent with every request
    fn headers(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .options
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if let Some(app_id) = &self.options.app_id {
            headers.push(("X-AppId".to_string(), app_id.clone()));
        }
        if let Some(secret) = &self.options.app_secret {
            headers.push(("X-AppSecret".to_string(), secret.clone()));
        }
        headers
    }

    fn anime_id(season: &Season) -> Result<u64, ProviderError> {
        match season.provider_ids {
            SeasonProviderIds::DanDanPlay { anime_id } => Ok(anime_id),
            ref other => Err(ProviderError::InvalidData(format!(
                "Season {} is not a DanDanPlay season: {:?}",
                season.id, other
            ))),
        }
    }

    fn fetch_bangumi(&self, anime_id: u64) -> Result<DdpBangumi, ProviderError> {
        let url = build_url(
            &self.options.base_url,
            &format!("api/v2/bangumi/{}", anime_id),
            &[],
        )?;
        let response: DdpBangumiResponse = self.http.get_json(&url, &self.headers())?;
        check_status(&response.status)?;

        response
            .bangumi
            .ok_or_else(|| ProviderError::NotFound(format!("DanDanPlay anime {}", anime_id)))
    }

    /// Converts a search hit to a season insert.
    fn convert_anime(&self, anime: DdpAnime) -> SeasonInsert {
        SeasonInsert {
            provider: ProviderKind::DanDanPlay,
            provider_config_id: self.config_id.clone(),
            indexed_id: anime.anime_id.to_string(),
            provider_ids: SeasonProviderIds::DanDanPlay {
                anime_id: anime.anime_id,
            },
            title: anime.anime_title,
            alternative_titles: Vec::new(),
            image_url: anime.image_url,
            episode_count: anime.episode_count,
            year: anime.start_date.as_deref().and_then(parse_year),
            schema_version: SEASON_SCHEMA_VERSION,
        }
    }

    fn convert_bangumi(&self, bangumi: DdpBangumi, previous: &Season) -> SeasonInsert {
        let alternative_titles = bangumi
            .titles
            .into_iter()
            .map(|t| t.title)
            .filter(|t| *t != bangumi.anime_title)
            .collect();

        SeasonInsert {
            provider: ProviderKind::DanDanPlay,
            provider_config_id: self.config_id.clone(),
            indexed_id: bangumi.anime_id.to_string(),
            provider_ids: SeasonProviderIds::DanDanPlay {
                anime_id: bangumi.anime_id,
            },
            title: bangumi.anime_title,
            alternative_titles,
            image_url: bangumi.image_url.or_else(|| previous.image_url.clone()),
            episode_count: Some(bangumi.episodes.len() as u32),
            year: previous.year,
            schema_version: SEASON_SCHEMA_VERSION,
        }
    }
}

/// Maps an unsuccessful status block to an error
fn check_status(status: &DdpStatus) -> Result<(), ProviderError> {
    if status.success {
        return Ok(());
    }
    Err(ProviderError::ApiError(format!(
        "{} (code {})",
        status.error_message.as_deref().unwrap_or("unknown error"),
        status.error_code
    )))
}

fn parse_year(date: &str) -> Option<i32> {
    date.get(..4)?.parse().ok()
}

fn convert_episodes(bangumi: DdpBangumi) -> Vec<EpisodeMeta> {
    bangumi
        .episodes
        .into_iter()
        .map(|episode| EpisodeMeta {
            provider: ProviderKind::DanDanPlay,
            indexed_id: episode.episode_id.to_string(),
            provider_ids: EpisodeProviderIds::DanDanPlay {
                episode_id: episode.episode_id,
            },
            title: episode.episode_title,
            episode_number: episode
                .episode_number
                .as_deref()
                .and_then(|n| n.trim().parse().ok()),
        })
        .collect()
}

impl Provider for DanDanPlayProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DanDanPlay
    }

    fn config_id(&self) -> &str {
        &self.config_id
    }

    fn search(&self, keyword: &str) -> Result<Vec<SeasonInsert>, ProviderError> {
        let url = build_url(
            &self.options.base_url,
            "api/v2/search/anime",
            &[("keyword", keyword)],
        )?;
        let response: DdpSearchResponse = self.http.get_json(&url, &self.headers())?;
        check_status(&response.status)?;

        Ok(response
            .animes
            .into_iter()
            .map(|anime| self.convert_anime(anime))
            .collect())
    }

    fn get_episodes(&self, season: &Season) -> Result<Vec<EpisodeMeta>, ProviderError> {
        let bangumi = self.fetch_bangumi(Self::anime_id(season)?)?;
        Ok(convert_episodes(bangumi))
    }

    fn get_danmaku(&self, request: &DanmakuRequest) -> Result<EpisodeInsert, ProviderError> {
        let episode_id = match request.episode.provider_ids {
            EpisodeProviderIds::DanDanPlay { episode_id } => episode_id,
            ref other => {
                return Err(ProviderError::InvalidData(format!(
                    "Not a DanDanPlay episode: {:?}",
                    other
                )));
            }
        };

        let with_related = self.options.with_related.to_string();
        let ch_convert = self.options.ch_convert.code().to_string();
        let url = build_url(
            &self.options.base_url,
            &format!("api/v2/comment/{}", episode_id),
            &[
                ("withRelated", with_related.as_str()),
                ("chConvert", ch_convert.as_str()),
            ],
        )?;
        let response: DdpCommentResponse = self.http.get_json(&url, &self.headers())?;

        Ok(EpisodeInsert::from_meta(
            request.season.id,
            request.episode.clone(),
            convert_comments(response),
        ))
    }

    fn find_episode(
        &self,
        season: &Season,
        episode_number: u32,
    ) -> Result<Option<EpisodeMeta>, ProviderError> {
        Ok(pick_episode(self.get_episodes(season)?, episode_number))
    }

    fn refresh_season(&self, season: &Season) -> Result<SeasonInsert, ProviderError> {
        let bangumi = self.fetch_bangumi(Self::anime_id(season)?)?;
        Ok(self.convert_bangumi(bangumi, season))
    }

    fn preload_next_episode(
        &self,
        season: &Season,
        current: &EpisodeMeta,
    ) -> Result<Option<EpisodeMeta>, ProviderError> {
        Ok(next_episode(self.get_episodes(season)?, current))
    }
}

/// Normalizes DanDanPlay comments, skipping entries with a malformed `p`
fn convert_comments(response: DdpCommentResponse) -> Vec<Comment> {
    let total = response.comments.len();
    let comments: Vec<Comment> = response
        .comments
        .into_iter()
        .filter_map(|c| Comment::from_dandanplay(c.cid, &c.p, &c.m))
        .collect();

    if comments.len() < total {
        log::warn!(
            "Skipped {} malformed DanDanPlay comment(s)",
            total - comments.len()
        );
    }
    comments
}
