//! Core data model
//!
//! Seasons, episodes, comments and the title-to-season cache entries that the
//! matching pipeline reads and writes. Records are split into an "insert"
//! payload (what a provider produces) and a [`Stored`] envelope carrying the
//! identity and version assigned by the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Internal id of a persisted season
pub type SeasonId = u64;

/// Internal id of a persisted episode
pub type EpisodeId = u64;

/// Current schema version written into new season rows
pub const SEASON_SCHEMA_VERSION: u32 = 1;

/// Current schema version written into new episode rows
pub const EPISODE_SCHEMA_VERSION: u32 = 4;

/// The concrete provider implementation behind a season, episode or config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    DanDanPlay,
    Bilibili,
    MacCms,
    Custom,
}

impl ProviderKind {
    /// Every implemented provider kind, in registration order
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::DanDanPlay,
        ProviderKind::Bilibili,
        ProviderKind::MacCms,
        ProviderKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::DanDanPlay => "dandanplay",
            ProviderKind::Bilibili => "bilibili",
            ProviderKind::MacCms => "maccms",
            ProviderKind::Custom => "custom",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-specific identifiers of a season
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SeasonProviderIds {
    DanDanPlay { anime_id: u64 },
    Bilibili { season_id: u64 },
    MacCms { vod_id: String },
    Custom { key: String },
}

/// Provider-specific identifiers of an episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EpisodeProviderIds {
    DanDanPlay { episode_id: u64 },
    Bilibili { ep_id: u64, cid: u64, aid: u64 },
    MacCms { url: String },
    Custom { key: String },
}

/// A season as produced by a provider, before it has been persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonInsert {
    pub provider: ProviderKind,
    pub provider_config_id: String,
    /// Provider-specific natural key, unique per provider config
    pub indexed_id: String,
    pub provider_ids: SeasonProviderIds,
    pub title: String,
    #[serde(default)]
    pub alternative_titles: Vec<String>,
    pub image_url: Option<String>,
    pub episode_count: Option<u32>,
    pub year: Option<i32>,
    pub schema_version: u32,
}

/// A persisted season
pub type Season = Stored<SeasonInsert>;

/// Lightweight description of an episode, as listed by a provider
///
/// This is what search and lookup operations deal in; comments are only
/// attached once the episode is fetched, turning it into an [`EpisodeInsert`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMeta {
    pub provider: ProviderKind,
    pub indexed_id: String,
    pub provider_ids: EpisodeProviderIds,
    pub title: String,
    /// Some providers only expose the ordinal position, not a number
    pub episode_number: Option<u32>,
}

/// An episode carrying its comments, ready to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeInsert {
    pub season_id: SeasonId,
    pub provider: ProviderKind,
    pub indexed_id: String,
    pub provider_ids: EpisodeProviderIds,
    pub title: String,
    pub episode_number: Option<u32>,
    pub comments: Vec<Comment>,
    pub comment_count: usize,
    pub last_checked: DateTime<Utc>,
    pub schema_version: u32,
}

impl EpisodeInsert {
    /// Attaches comments to an episode of the given season
    pub fn from_meta(season_id: SeasonId, meta: EpisodeMeta, comments: Vec<Comment>) -> Self {
        Self {
            season_id,
            provider: meta.provider,
            indexed_id: meta.indexed_id,
            provider_ids: meta.provider_ids,
            title: meta.title,
            episode_number: meta.episode_number,
            comment_count: comments.len(),
            comments,
            last_checked: Utc::now(),
            schema_version: EPISODE_SCHEMA_VERSION,
        }
    }

    /// Strips the comment payload back off
    pub fn meta(&self) -> EpisodeMeta {
        EpisodeMeta {
            provider: self.provider,
            indexed_id: self.indexed_id.clone(),
            provider_ids: self.provider_ids.clone(),
            title: self.title.clone(),
            episode_number: self.episode_number,
        }
    }
}

/// A persisted episode
pub type Episode = Stored<EpisodeInsert>;

/// An episode together with the season it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeWithSeason {
    pub season: Season,
    pub episode: EpisodeMeta,
}

/// Display mode of a single comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentMode {
    Scroll,
    Top,
    Bottom,
}

impl CommentMode {
    /// Maps the numeric mode used by DanDanPlay and Bilibili
    ///
    /// 4 is bottom, 5 is top; everything else (1-3 scroll, 6 reverse,
    /// 7+ special) is rendered as scrolling text.
    pub fn from_code(code: u32) -> Self {
        match code {
            4 => CommentMode::Bottom,
            5 => CommentMode::Top,
            _ => CommentMode::Scroll,
        }
    }
}

/// Canonical overlay comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub cid: Option<u64>,
    /// Offset into the episode, in seconds
    pub time: f64,
    pub mode: CommentMode,
    /// RGB color as 0xRRGGBB
    pub color: u32,
    pub uid: String,
    pub text: String,
}

impl Comment {
    /// Parses a DanDanPlay style `p` attribute (`time,mode,color,uid`)
    pub fn from_dandanplay(cid: Option<u64>, p: &str, text: &str) -> Option<Self> {
        let mut parts = p.split(',');
        let time = parts.next()?.trim().parse().ok()?;
        let mode = parts.next()?.trim().parse().ok()?;
        let color = parts.next()?.trim().parse().ok()?;
        let uid = parts.next().unwrap_or_default().trim().to_string();

        Some(Self {
            cid,
            time,
            mode: CommentMode::from_code(mode),
            color,
            uid,
            text: text.to_string(),
        })
    }
}

/// Cached association of an observed title with per-provider seasons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonMapInsert {
    pub map_key: String,
    /// One slot per provider config id
    pub seasons: BTreeMap<String, SeasonId>,
}

impl SeasonMapInsert {
    /// Creates a mapping with a single provider slot pointing at `season`
    pub fn for_season(map_key: impl Into<String>, season: &Season) -> Self {
        let mut seasons = BTreeMap::new();
        seasons.insert(season.provider_config_id.clone(), season.id);
        Self {
            map_key: map_key.into(),
            seasons,
        }
    }

    /// Season id cached for the given provider config, if any
    pub fn season_for(&self, provider_config_id: &str) -> Option<SeasonId> {
        self.seasons.get(provider_config_id).copied()
    }
}

/// A persisted title mapping
pub type SeasonMap = Stored<SeasonMapInsert>;

/// Derives the title-mapping cache key for an observed title
///
/// Titles coming from different integrations are kept apart, since the same
/// string can mean different shows on different sites.
pub fn map_key(title: &str, integration: Option<&str>) -> String {
    match integration {
        Some(source) if !source.is_empty() => format!("{}:{}", source, title),
        _ => title.to_string(),
    }
}

/// Comments imported from a local file rather than fetched from a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalEpisodeInsert {
    /// File-name style title, e.g. `Show A - 01.mkv`
    pub title: String,
    pub comments: Vec<Comment>,
    pub comment_count: usize,
    pub imported_at: DateTime<Utc>,
}

impl LocalEpisodeInsert {
    pub fn new(title: impl Into<String>, comments: Vec<Comment>) -> Self {
        Self {
            title: title.into(),
            comment_count: comments.len(),
            comments,
            imported_at: Utc::now(),
        }
    }
}

/// A persisted local episode
pub type LocalEpisode = Stored<LocalEpisodeInsert>;

/// Envelope added to every row by the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored<T> {
    pub id: u64,
    /// Starts at 1 and grows by exactly one per update
    pub version: u64,
    pub time_updated: DateTime<Utc>,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Deref for Stored<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<T> DerefMut for Stored<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}
