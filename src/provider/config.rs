//! Provider configurations
//!
//! A [`ProviderConfig`] selects the implementation backing a logical provider
//! slot and carries that implementation's options. Several configs may share
//! one implementation (e.g. two MacCMS sites), which is why mappings and
//! seasons are keyed by config id rather than by [`ProviderKind`].

use crate::model::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted configuration of one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether the provider may be used for unattended search matching
    #[serde(default)]
    pub auto_match: bool,
    #[serde(flatten)]
    pub options: ProviderOptions,
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    pub fn kind(&self) -> ProviderKind {
        self.options.kind()
    }

    /// Whether this config is eligible for automatic matching
    pub fn is_automatic(&self) -> bool {
        self.enabled && self.auto_match
    }

    pub fn builtin_dandanplay() -> Self {
        Self {
            id: "dandanplay".to_string(),
            name: "DanDanPlay".to_string(),
            enabled: true,
            auto_match: true,
            options: ProviderOptions::DanDanPlay(DanDanPlayOptions::default()),
        }
    }

    pub fn builtin_bilibili() -> Self {
        Self {
            id: "bilibili".to_string(),
            name: "Bilibili".to_string(),
            enabled: true,
            auto_match: false,
            options: ProviderOptions::Bilibili(BilibiliOptions::default()),
        }
    }

    pub fn builtin_custom() -> Self {
        Self {
            id: "custom".to_string(),
            name: "Custom".to_string(),
            enabled: true,
            auto_match: false,
            options: ProviderOptions::Custom,
        }
    }

    /// A user-added MacCMS site, identified by a fresh ULID
    pub fn new_maccms(name: impl Into<String>, options: MacCmsOptions) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            name: name.into(),
            enabled: true,
            auto_match: false,
            options: ProviderOptions::MacCms(options),
        }
    }

    /// The built-in configs, in default priority order
    pub fn builtins() -> Vec<Self> {
        vec![
            Self::builtin_dandanplay(),
            Self::builtin_bilibili(),
            Self::builtin_custom(),
        ]
    }
}

/// Implementation-specific options, tagged by implementation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "impl", rename_all = "lowercase")]
pub enum ProviderOptions {
    DanDanPlay(DanDanPlayOptions),
    Bilibili(BilibiliOptions),
    MacCms(MacCmsOptions),
    Custom,
}

impl ProviderOptions {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderOptions::DanDanPlay(_) => ProviderKind::DanDanPlay,
            ProviderOptions::Bilibili(_) => ProviderKind::Bilibili,
            ProviderOptions::MacCms(_) => ProviderKind::MacCms,
            ProviderOptions::Custom => ProviderKind::Custom,
        }
    }
}

/// Chinese script conversion applied by DanDanPlay to comments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChConvert {
    #[default]
    None,
    Simplified,
    Traditional,
}

impl ChConvert {
    pub fn code(&self) -> u8 {
        match self {
            ChConvert::None => 0,
            ChConvert::Simplified => 1,
            ChConvert::Traditional => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DanDanPlayOptions {
    pub base_url: String,
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    /// Include comments DanDanPlay aggregates from related sources
    pub with_related: bool,
    pub ch_convert: ChConvert,
    /// Extra headers sent with every request
    pub headers: BTreeMap<String, String>,
}

impl Default for DanDanPlayOptions {
    fn default() -> Self {
        Self {
            base_url: "https://api.dandanplay.net".to_string(),
            app_id: None,
            app_secret: None,
            with_related: true,
            ch_convert: ChConvert::None,
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BilibiliOptions {
    pub api_url: String,
    pub comment_url: String,
    /// Cookie sent with API requests; search requires a `buvid3` cookie
    pub cookie: Option<String>,
}

impl Default for BilibiliOptions {
    fn default() -> Self {
        Self {
            api_url: "https://api.bilibili.com".to_string(),
            comment_url: "https://comment.bilibili.com".to_string(),
            cookie: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MacCmsOptions {
    /// Site root; the vod API lives under `api.php/provide/vod/`
    pub base_url: String,
    /// Comment endpoint queried with the episode's play URL as `url`
    pub danmaku_url: String,
    /// Drop comment colors and render everything white
    pub strip_color: bool,
    pub headers: BTreeMap<String, String>,
}
