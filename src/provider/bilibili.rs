/// Bilibili provider implementation.
use super::bilibili_types::{BiliEpisode, BiliResponse, BiliSearchData, BiliSeason};
use super::http::{HeaderRuleGuard, HttpClient, build_url};
use super::{
    BilibiliOptions, DanmakuRequest, ParsedEpisode, Provider, ProviderError, next_episode,
    pick_episode,
};
use crate::model::{
    Comment, CommentMode, EpisodeInsert, EpisodeMeta, EpisodeProviderIds, ProviderKind,
    SEASON_SCHEMA_VERSION, Season, SeasonInsert, SeasonProviderIds,
};
use chrono::{DateTime, Datelike};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

const REFERER: &str = "https://www.bilibili.com/";

static PLAY_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/bangumi/play/(ep|ss)(\d+)/?$").expect("play url pattern is valid")
});

/// Which id a bangumi play URL carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayId {
    Episode(u64),
    Season(u64),
}

/// Provider for Bilibili bangumi (PGC) content.
///
/// Holds Referer (and optional Cookie) header rules for its hosts for as
/// long as the provider lives. The rules are owned by the provider's config,
/// so another Bilibili config never sends this one's cookie.
pub struct BilibiliProvider {
    config_id: String,
    options: BilibiliOptions,
    http: HttpClient,
    _rules: Vec<HeaderRuleGuard>,
}

impl BilibiliProvider {
    pub fn new(
        config_id: impl Into<String>,
        options: BilibiliOptions,
        http: HttpClient,
    ) -> Result<Self, ProviderError> {
        let config_id = config_id.into();
        let http = http.scoped(config_id.clone());
        let referer = ("Referer".to_string(), REFERER.to_string());

        let mut api_headers = vec![referer.clone()];
        if let Some(cookie) = &options.cookie {
            api_headers.push(("Cookie".to_string(), cookie.clone()));
        }

        let rules = vec![
            http.register_headers(&options.api_url, api_headers)?,
            http.register_headers(&options.comment_url, vec![referer])?,
        ];

        Ok(Self {
            config_id,
            options,
            http,
            _rules: rules,
        })
    }

    fn season_id(season: &Season) -> Result<u64, ProviderError> {
        match season.provider_ids {
            SeasonProviderIds::Bilibili { season_id } => Ok(season_id),
            ref other => Err(ProviderError::InvalidData(format!(
                "Season {} is not a Bilibili season: {:?}",
                season.id, other
            ))),
        }
    }

    fn fetch_season(&self, id: PlayId) -> Result<BiliSeason, ProviderError> {
        let value = match id {
            PlayId::Episode(ep_id) => ("ep_id", ep_id.to_string()),
            PlayId::Season(season_id) => ("season_id", season_id.to_string()),
        };
        let url = build_url(
            &self.options.api_url,
            "pgc/view/web/season",
            &[(value.0, value.1.as_str())],
        )?;
        let response: BiliResponse<BiliSeason> = self.http.get_json(&url, &[])?;
        check_code(response.code, &response.message)?;

        response
            .into_payload()
            .ok_or_else(|| ProviderError::NotFound(format!("Bilibili season {:?}", id)))
    }

    fn convert_season(&self, season: BiliSeason) -> SeasonInsert {
        SeasonInsert {
            provider: ProviderKind::Bilibili,
            provider_config_id: self.config_id.clone(),
            indexed_id: season.season_id.to_string(),
            provider_ids: SeasonProviderIds::Bilibili {
                season_id: season.season_id,
            },
            title: season.title,
            alternative_titles: Vec::new(),
            image_url: season.cover.map(absolute_url),
            episode_count: Some(season.episodes.len() as u32),
            year: None,
            schema_version: SEASON_SCHEMA_VERSION,
        }
    }
}

fn check_code(code: i64, message: &str) -> Result<(), ProviderError> {
    if code == 0 {
        Ok(())
    } else {
        Err(ProviderError::ApiError(format!("{} (code {})", message, code)))
    }
}

/// Cover URLs are protocol-relative
fn absolute_url(url: String) -> String {
    if url.starts_with("//") {
        format!("https:{}", url)
    } else {
        url
    }
}

fn convert_episode(episode: BiliEpisode) -> EpisodeMeta {
    let episode_number = episode.title.trim().parse().ok();
    let title = if episode.long_title.is_empty() {
        episode.title
    } else {
        format!("{} {}", episode.title, episode.long_title)
    };

    EpisodeMeta {
        provider: ProviderKind::Bilibili,
        indexed_id: episode.id.to_string(),
        provider_ids: EpisodeProviderIds::Bilibili {
            ep_id: episode.id,
            cid: episode.cid,
            aid: episode.aid,
        },
        title,
        episode_number,
    }
}

fn parse_play_url(url: &Url) -> Option<PlayId> {
    let host = url.host_str()?;
    if host != "bilibili.com" && !host.ends_with(".bilibili.com") {
        return None;
    }

    let captures = PLAY_URL.captures(url.path())?;
    let id = captures[2].parse().ok()?;
    match &captures[1] {
        "ep" => Some(PlayId::Episode(id)),
        _ => Some(PlayId::Season(id)),
    }
}

/// Parses the XML comment stream (`<d p="...">text</d>` elements)
///
/// The `p` attribute is `time,mode,size,color,timestamp,pool,uid,dmid,...`.
fn parse_comment_xml(xml: &[u8]) -> Result<Vec<Comment>, ProviderError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut comments = Vec::new();
    let mut buf = Vec::new();
    let mut current_p: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"d" => {
                current_p = None;
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"p" {
                        current_p = attr.unescape_value().ok().map(|v| v.to_string());
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(p) = current_p.take() {
                    let text = e.unescape().unwrap_or_default().to_string();
                    if let Some(comment) = convert_bili_comment(&p, text) {
                        comments.push(comment);
                    }
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"d" => {
                current_p = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ProviderError::ParseError(format!("XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(comments)
}

fn convert_bili_comment(p: &str, text: String) -> Option<Comment> {
    let fields: Vec<&str> = p.split(',').collect();
    if fields.len() < 4 {
        return None;
    }

    Some(Comment {
        cid: fields.get(7).and_then(|id| id.parse().ok()),
        time: fields[0].parse().ok()?,
        mode: CommentMode::from_code(fields[1].parse().ok()?),
        color: fields[3].parse().ok()?,
        uid: fields.get(6).map(|uid| uid.to_string()).unwrap_or_default(),
        text,
    })
}

impl Provider for BilibiliProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Bilibili
    }

    fn config_id(&self) -> &str {
        &self.config_id
    }

    fn search(&self, keyword: &str) -> Result<Vec<SeasonInsert>, ProviderError> {
        let url = build_url(
            &self.options.api_url,
            "x/web-interface/search/type",
            &[("search_type", "media_bangumi"), ("keyword", keyword)],
        )?;
        let response: BiliResponse<BiliSearchData> = self.http.get_json(&url, &[])?;
        check_code(response.code, &response.message)?;

        let items = response.into_payload().map(|d| d.result).unwrap_or_default();

        Ok(items
            .into_iter()
            .map(|item| {
                let title = nanohtml2text::html2text(&item.title).trim().to_string();
                SeasonInsert {
                    provider: ProviderKind::Bilibili,
                    provider_config_id: self.config_id.clone(),
                    indexed_id: item.season_id.to_string(),
                    provider_ids: SeasonProviderIds::Bilibili {
                        season_id: item.season_id,
                    },
                    alternative_titles: item
                        .org_title
                        .map(|t| nanohtml2text::html2text(&t).trim().to_string())
                        .filter(|t| !t.is_empty() && *t != title)
                        .into_iter()
                        .collect(),
                    title,
                    image_url: item.cover.map(absolute_url),
                    episode_count: item.ep_size,
                    year: item
                        .pubtime
                        .and_then(|ts| DateTime::from_timestamp(ts, 0))
                        .map(|date| date.year()),
                    schema_version: SEASON_SCHEMA_VERSION,
                }
            })
            .collect())
    }

    fn get_episodes(&self, season: &Season) -> Result<Vec<EpisodeMeta>, ProviderError> {
        let bili_season = self.fetch_season(PlayId::Season(Self::season_id(season)?))?;
        Ok(bili_season.episodes.into_iter().map(convert_episode).collect())
    }

    fn get_danmaku(&self, request: &DanmakuRequest) -> Result<EpisodeInsert, ProviderError> {
        let cid = match request.episode.provider_ids {
            EpisodeProviderIds::Bilibili { cid, .. } => cid,
            ref other => {
                return Err(ProviderError::InvalidData(format!(
                    "Not a Bilibili episode: {:?}",
                    other
                )));
            }
        };

        let url = build_url(&self.options.comment_url, &format!("{}.xml", cid), &[])?;
        let body = self.http.get_bytes(&url, &[])?;
        let comments = parse_comment_xml(&body)?;

        Ok(EpisodeInsert::from_meta(
            request.season.id,
            request.episode.clone(),
            comments,
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
        let bili_season = self.fetch_season(PlayId::Season(Self::season_id(season)?))?;
        let mut refreshed = self.convert_season(bili_season);
        refreshed.alternative_titles = season.alternative_titles.clone();
        refreshed.year = season.year;
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
        parse_play_url(url).is_some()
    }

    fn parse_url(&self, url: &Url) -> Result<Option<ParsedEpisode>, ProviderError> {
        let Some(play_id) = parse_play_url(url) else {
            return Ok(None);
        };

        let mut bili_season = self.fetch_season(play_id)?;
        let episodes = std::mem::take(&mut bili_season.episodes);
        let episode_count = episodes.len() as u32;

        // A season URL starts at its first episode
        let episode = match play_id {
            PlayId::Episode(ep_id) => episodes.into_iter().find(|e| e.id == ep_id),
            PlayId::Season(_) => episodes.into_iter().next(),
        };

        Ok(episode.map(|episode| {
            let mut season = self.convert_season(bili_season);
            season.episode_count = Some(episode_count);
            ParsedEpisode {
                season,
                episode: convert_episode(episode),
            }
        }))
    }
}
