/// DanDanPlay API response types for deserialization.
///
/// These structures mirror the JSON response format of the DanDanPlay v2 API.
use serde::Deserialize;

/// Fields shared by every DanDanPlay response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DdpStatus {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub error_code: i64,
    pub error_message: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Response of `/api/v2/search/anime`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DdpSearchResponse {
    #[serde(flatten)]
    pub status: DdpStatus,
    #[serde(default)]
    pub animes: Vec<DdpAnime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DdpAnime {
    pub anime_id: u64,
    pub anime_title: String,
    pub image_url: Option<String>,
    /// ISO timestamp of the first airing
    pub start_date: Option<String>,
    pub episode_count: Option<u32>,
}

/// Response of `/api/v2/bangumi/{animeId}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DdpBangumiResponse {
    #[serde(flatten)]
    pub status: DdpStatus,
    pub bangumi: Option<DdpBangumi>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DdpBangumi {
    pub anime_id: u64,
    pub anime_title: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub titles: Vec<DdpTitle>,
    #[serde(default)]
    pub episodes: Vec<DdpEpisode>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DdpTitle {
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DdpEpisode {
    pub episode_id: u64,
    pub episode_title: String,
    /// Usually numeric, but specials use values like "S1" or "C2"
    pub episode_number: Option<String>,
}

/// Response of `/api/v2/comment/{episodeId}`
#[derive(Debug, Deserialize)]
pub(super) struct DdpCommentResponse {
    #[serde(default)]
    pub comments: Vec<DdpComment>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DdpComment {
    pub cid: Option<u64>,
    /// `time,mode,color,uid`
    pub p: String,
    pub m: String,
}
