/// MacCMS provider implementation.
use super::http::{HttpClient, build_url};
use super::maccms_types::{DanmakuResponse, VodItem, VodResponse};
use super::{DanmakuRequest, MacCmsOptions, Provider, ProviderError, next_episode, pick_episode};
use crate::model::{
    Comment, CommentMode, EpisodeInsert, EpisodeMeta, EpisodeProviderIds, ProviderKind,
    SEASON_SCHEMA_VERSION, Season, SeasonInsert, SeasonProviderIds,
};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use url::Url;

static EPISODE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:第\s*(\d+)\s*[集话話]|^\s*(?:ep?\.?\s*)?(\d+)\s*$)")
        .expect("episode number pattern is valid")
});

const WHITE: u32 = 0xFFFFFF;

/// Generic provider for MacCMS based video sites.
///
/// Episode lists come from the site's vod API; comments come from a separate
/// danmaku endpoint keyed by the episode's play URL.
pub struct MacCmsProvider {
    config_id: String,
    options: MacCmsOptions,
    http: HttpClient,
}

impl MacCmsProvider {
    pub fn new(
        config_id: impl Into<String>,
        options: MacCmsOptions,
        http: HttpClient,
    ) -> Result<Self, ProviderError> {
        for endpoint in [&options.base_url, &options.danmaku_url] {
            Url::parse(endpoint)
                .map_err(|e| ProviderError::InvalidConfig(format!("{}: {}", endpoint, e)))?;
        }

        let config_id = config_id.into();
        Ok(Self {
            http: http.scoped(config_id.clone()),
            config_id,
            options,
        })
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.options
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn vod(&self, query: &[(&str, &str)]) -> Result<Vec<VodItem>, ProviderError> {
        let url = build_url(&self.options.base_url, "api.php/provide/vod/", query)?;
        let response: VodResponse = self.http.get_json(&url, &self.headers())?;
        if response.code != 1 {
            return Err(ProviderError::ApiError(format!(
                "{} (code {})",
                response.msg, response.code
            )));
        }
        Ok(response.list)
    }

    fn convert_vod(&self, item: &VodItem) -> SeasonInsert {
        let vod_id = id_to_string(&item.vod_id);
        SeasonInsert {
            provider: ProviderKind::MacCms,
            provider_config_id: self.config_id.clone(),
            indexed_id: vod_id.clone(),
            provider_ids: SeasonProviderIds::MacCms { vod_id },
            title: item.vod_name.clone(),
            alternative_titles: Vec::new(),
            image_url: item.vod_pic.clone().filter(|pic| !pic.is_empty()),
            episode_count: Some(parse_play_list(&item.vod_play_url).len() as u32),
            year: item.vod_year.as_deref().and_then(|y| y.trim().parse().ok()),
            schema_version: SEASON_SCHEMA_VERSION,
        }
    }

    fn vod_id(season: &Season) -> Result<&str, ProviderError> {
        match &season.provider_ids {
            SeasonProviderIds::MacCms { vod_id } => Ok(vod_id),
            other => Err(ProviderError::InvalidData(format!(
                "Season {} is not a MacCMS season: {:?}",
                season.id, other
            ))),
        }
    }
}

/// Renders an id that may be a JSON number or string
fn id_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parses the first play source of `vod_play_url` into `(name, url)` pairs
fn parse_play_list(play_url: &str) -> Vec<(String, String)> {
    play_url
        .split("$$$")
        .next()
        .unwrap_or_default()
        .split('#')
        .filter_map(|entry| {
            let (name, url) = entry.split_once('$')?;
            let url = url.trim();
            (!url.is_empty()).then(|| (name.trim().to_string(), url.to_string()))
        })
        .collect()
}

fn parse_episode_number(name: &str) -> Option<u32> {
    let captures = EPISODE_NUMBER.captures(name)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

fn convert_play_list(play_url: &str) -> Vec<EpisodeMeta> {
    parse_play_list(play_url)
        .into_iter()
        .map(|(name, url)| EpisodeMeta {
            provider: ProviderKind::MacCms,
            indexed_id: url.clone(),
            provider_ids: EpisodeProviderIds::MacCms { url },
            episode_number: parse_episode_number(&name),
            title: name,
        })
        .collect()
}

/// Converts `[time, position, color, size, text]` entries
fn convert_danmaku(response: DanmakuResponse, strip_color: bool) -> Vec<Comment> {
    response
        .danmuku
        .into_iter()
        .filter_map(|entry| {
            let time = entry.first()?.as_f64().or_else(|| entry[0].as_str()?.parse().ok())?;
            let mode = match entry.get(1).and_then(Value::as_str) {
                Some("top") => CommentMode::Top,
                Some("bottom") => CommentMode::Bottom,
                _ => CommentMode::Scroll,
            };
            let color = if strip_color {
                WHITE
            } else {
                entry
                    .get(2)
                    .and_then(Value::as_str)
                    .and_then(parse_css_color)
                    .unwrap_or(WHITE)
            };
            let text = entry.get(4)?.as_str()?.to_string();

            Some(Comment {
                cid: None,
                time,
                mode,
                color,
                uid: String::new(),
                text,
            })
        })
        .collect()
}

/// Parses `#rgb`, `#rrggbb` or `rgb(r, g, b)`
fn parse_css_color(color: &str) -> Option<u32> {
    let color = color.trim();
    if let Some(hex) = color.strip_prefix('#') {
        return match hex.len() {
            6 => u32::from_str_radix(hex, 16).ok(),
            3 => {
                let expanded: String = hex.chars().flat_map(|c| [c, c]).collect();
                u32::from_str_radix(&expanded, 16).ok()
            }
            _ => None,
        };
    }

    let inner = color.strip_prefix("rgb(")?.strip_suffix(')')?;
    let channels: Vec<u32> = inner
        .split(',')
        .map(|c| c.trim().parse::<u8>().map(u32::from))
        .collect::<Result<_, _>>()
        .ok()?;
    match channels.as_slice() {
        [r, g, b] => Some((*r << 16) | (*g << 8) | *b),
        _ => None,
    }
}

impl Provider for MacCmsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::MacCms
    }

    fn config_id(&self) -> &str {
        &self.config_id
    }

    fn search(&self, keyword: &str) -> Result<Vec<SeasonInsert>, ProviderError> {
        let items = self.vod(&[("ac", "detail"), ("wd", keyword)])?;
        Ok(items.iter().map(|item| self.convert_vod(item)).collect())
    }

    fn get_episodes(&self, season: &Season) -> Result<Vec<EpisodeMeta>, ProviderError> {
        let vod_id = Self::vod_id(season)?;
        let items = self.vod(&[("ac", "detail"), ("ids", vod_id)])?;
        let item = items
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound(format!("MacCMS vod {}", vod_id)))?;
        Ok(convert_play_list(&item.vod_play_url))
    }

    fn get_danmaku(&self, request: &DanmakuRequest) -> Result<EpisodeInsert, ProviderError> {
        let play_url = match &request.episode.provider_ids {
            EpisodeProviderIds::MacCms { url } => url,
            other => {
                return Err(ProviderError::InvalidData(format!(
                    "Not a MacCMS episode: {:?}",
                    other
                )));
            }
        };

        let mut url = Url::parse(&self.options.danmaku_url)
            .map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;
        url.query_pairs_mut().append_pair("url", play_url);

        let response: DanmakuResponse = self.http.get_json(&url, &[])?;
        Ok(EpisodeInsert::from_meta(
            request.season.id,
            request.episode.clone(),
            convert_danmaku(response, self.options.strip_color),
        ))
    }

    fn find_episode(
        &self,
        season: &Season,
        episode_number: u32,
    ) -> Result<Option<EpisodeMeta>, ProviderError> {
        Ok(pick_episode(self.get_episodes(season)?, episode_number))
    }

    fn preload_next_episode(
        &self,
        season: &Season,
        current: &EpisodeMeta,
    ) -> Result<Option<EpisodeMeta>, ProviderError> {
        Ok(next_episode(self.get_episodes(season)?, current))
    }
}
