//! Settings file handling
//!
//! Settings live in a TOML file in the platform's config directory. A
//! missing file yields the built-in provider set.

use crate::matching::MatchOptions;
use crate::provider::ProviderConfig;
use crate::storage::{self, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to determine config directory location
    #[error("Failed to determine config directory location")]
    ConfigDirectoryNotFound,

    /// Failed to read the settings file
    #[error("Failed to read settings from {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for [`Settings`]
    #[error("Failed to parse settings in {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Two provider configs share an id
    #[error("Duplicate provider id '{0}'")]
    DuplicateProviderId(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Try locally imported comments before any provider
    pub match_local_danmaku: bool,
    /// Database directory; the platform data directory when unset
    pub data_dir: Option<PathBuf>,
    /// Provider configs in priority order
    pub providers: Vec<ProviderConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            match_local_danmaku: false,
            data_dir: None,
            providers: ProviderConfig::builtins(),
        }
    }
}

impl Settings {
    /// Parses settings from TOML text
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(text).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from `path`, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// Loads settings from the platform's config directory
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(&default_config_path()?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for config in &self.providers {
            if !seen.insert(config.id.as_str()) {
                return Err(ConfigError::DuplicateProviderId(config.id.clone()));
            }
        }
        Ok(())
    }

    /// The database directory to use
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(storage::default_data_dir()?),
        }
    }

    /// Snapshot consumed by the matching chain
    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            match_local_danmaku: self.match_local_danmaku,
            providers: self.providers.clone(),
        }
    }
}

/// Returns the platform's settings file location
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let proj_dirs = directories::ProjectDirs::from("io", "danmaku", "danmaku-resolver")
        .ok_or(ConfigError::ConfigDirectoryNotFound)?;
    Ok(proj_dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProviderKind;
    use crate::provider::ProviderOptions;

    const SETTINGS: &str = r#"
match_local_danmaku = true

[[providers]]
id = "dandanplay"
name = "DanDanPlay"
auto_match = true
impl = "dandanplay"
app_id = "my-app"

[[providers]]
id = "01HZX3Y7Q8R9S0T1V2W3X4Y5Z6"
name = "Some Site"
auto_match = true
impl = "maccms"
base_url = "https://site.example"
danmaku_url = "https://dm.example/api"

[[providers]]
id = "custom"
name = "Custom"
enabled = false
impl = "custom"
"#;

    #[test]
    fn test_parse_settings() {
        let settings = Settings::from_toml(SETTINGS, Path::new("config.toml")).unwrap();

        assert!(settings.match_local_danmaku);
        assert_eq!(settings.providers.len(), 3);

        match &settings.providers[0].options {
            ProviderOptions::DanDanPlay(options) => {
                assert_eq!(options.app_id.as_deref(), Some("my-app"));
                assert_eq!(options.base_url, "https://api.dandanplay.net");
            }
            other => panic!("unexpected options: {:?}", other),
        }
        assert_eq!(settings.providers[1].kind(), ProviderKind::MacCms);
        assert!(!settings.providers[2].enabled);

        let options = settings.match_options();
        let automatic: Vec<&str> = options.automatic().map(|c| c.id.as_str()).collect();
        assert_eq!(automatic, vec!["dandanplay", "01HZX3Y7Q8R9S0T1V2W3X4Y5Z6"]);
    }

    #[test]
    fn test_duplicate_provider_ids_are_rejected() {
        let text = r#"
[[providers]]
id = "custom"
name = "A"
impl = "custom"

[[providers]]
id = "custom"
name = "B"
impl = "custom"
"#;
        assert!(matches!(
            Settings::from_toml(text, Path::new("config.toml")),
            Err(ConfigError::DuplicateProviderId(id)) if id == "custom"
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(
            settings.match_options().automatic().count(),
            1,
            "only DanDanPlay matches automatically by default"
        );
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "providers = 3").unwrap();

        match Settings::load(&path) {
            Err(ConfigError::ParseFailed { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
