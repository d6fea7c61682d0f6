/// Bilibili API response types for deserialization.
///
/// These structures mirror the JSON responses of the bangumi search and
/// season view endpoints.
use serde::Deserialize;

/// Envelope shared by Bilibili API responses
#[derive(Debug, Deserialize)]
pub(super) struct BiliResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    /// Search endpoints answer in `data`
    pub data: Option<T>,
    /// PGC endpoints answer in `result`
    pub result: Option<T>,
}

impl<T> BiliResponse<T> {
    /// The payload, from whichever field the endpoint uses
    pub fn into_payload(self) -> Option<T> {
        self.data.or(self.result)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct BiliSearchData {
    /// Absent when nothing matched
    #[serde(default)]
    pub result: Vec<BiliSearchItem>,
}

#[derive(Debug, Deserialize)]
pub(super) struct BiliSearchItem {
    pub season_id: u64,
    /// Contains `<em class="keyword">` highlight markup
    pub title: String,
    pub org_title: Option<String>,
    pub cover: Option<String>,
    pub ep_size: Option<u32>,
    /// Unix timestamp of the first release
    pub pubtime: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct BiliSeason {
    pub season_id: u64,
    pub title: String,
    pub cover: Option<String>,
    #[serde(default)]
    pub episodes: Vec<BiliEpisode>,
}

#[derive(Debug, Deserialize)]
pub(super) struct BiliEpisode {
    /// The `ep_id`
    pub id: u64,
    pub aid: u64,
    pub cid: u64,
    /// Usually the episode number, e.g. "1"
    pub title: String,
    #[serde(default)]
    pub long_title: String,
}
