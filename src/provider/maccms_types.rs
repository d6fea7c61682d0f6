/// MacCMS API response types for deserialization.
///
/// These structures mirror the `api.php/provide/vod` JSON format shared by
/// MacCMS based sites, and the array format of the danmaku endpoints they
/// are usually paired with.
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub(super) struct VodResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub list: Vec<VodItem>,
}

#[derive(Debug, Deserialize)]
pub(super) struct VodItem {
    /// A number on most sites, a string on some
    pub vod_id: Value,
    pub vod_name: String,
    pub vod_pic: Option<String>,
    pub vod_year: Option<String>,
    /// Per source `$$$`, per episode `#`, `name$url` within an episode
    #[serde(default)]
    pub vod_play_url: String,
}

/// Response of a DPlayer-style danmaku endpoint
#[derive(Debug, Deserialize)]
pub(super) struct DanmakuResponse {
    /// Each entry is `[time, position, color, size, text, ...]`
    #[serde(default)]
    pub danmuku: Vec<Vec<Value>>,
}
