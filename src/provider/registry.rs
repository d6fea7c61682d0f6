//! Provider registry
//!
//! Maps a [`ProviderConfig`] to a live provider instance. Every
//! [`ProviderKind`] must have exactly one factory; this is checked when the
//! registry is built, so a lookup can only miss on a registry that was never
//! constructed.

use super::{
    BilibiliProvider, CustomProvider, DanDanPlayProvider, HttpClient, MacCmsProvider, Provider,
    ProviderConfig, ProviderError, ProviderOptions,
};
use crate::model::ProviderKind;
use crate::storage::Database;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Constructor for one provider implementation
pub type ProviderFactory =
    Box<dyn Fn(&ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync>;

type FactoryResult = Result<Arc<dyn Provider>, ProviderError>;

/// Errors raised by the provider registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A provider kind has no factory
    #[error("No provider factory registered for '{0}'")]
    MissingFactory(ProviderKind),

    /// A provider kind was registered twice
    #[error("Provider factory for '{0}' registered more than once")]
    DuplicateFactory(ProviderKind),

    /// The factory rejected the configuration
    #[error("Failed to create provider '{config_id}': {source}")]
    Construction {
        config_id: String,
        source: ProviderError,
    },
}

/// Collects factories before validating them into a [`ProviderRegistry`]
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    factories: Vec<(ProviderKind, ProviderFactory)>,
}

impl ProviderRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, kind: ProviderKind, factory: F) -> Self
    where
        F: Fn(&ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync + 'static,
    {
        self.factories.push((kind, Box::new(factory)));
        self
    }

    /// Validates that every provider kind has exactly one factory
    pub fn build(self) -> Result<ProviderRegistry, RegistryError> {
        let mut factories = BTreeMap::new();
        for (kind, factory) in self.factories {
            if factories.insert(kind, factory).is_some() {
                return Err(RegistryError::DuplicateFactory(kind));
            }
        }

        if let Some(missing) = ProviderKind::ALL
            .iter()
            .find(|kind| !factories.contains_key(*kind))
        {
            return Err(RegistryError::MissingFactory(*missing));
        }

        Ok(ProviderRegistry { factories })
    }
}

/// Creates provider instances from their configs
pub struct ProviderRegistry {
    factories: BTreeMap<ProviderKind, ProviderFactory>,
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::new()
    }

    /// Registry with the built-in implementations
    ///
    /// Network providers share `http` (and with it the header rule set);
    /// the custom provider reads from `db`.
    pub fn builtin(http: HttpClient, db: Arc<Database>) -> Result<Self, RegistryError> {
        let dandanplay_http = http.clone();
        let bilibili_http = http.clone();
        let maccms_http = http;

        Self::builder()
            .register(ProviderKind::DanDanPlay, move |config: &ProviderConfig| -> FactoryResult {
                let ProviderOptions::DanDanPlay(options) = &config.options else {
                    return Err(wrong_options(config, ProviderKind::DanDanPlay));
                };
                Ok(Arc::new(DanDanPlayProvider::new(
                    &config.id,
                    options.clone(),
                    dandanplay_http.clone(),
                )))
            })
            .register(ProviderKind::Bilibili, move |config: &ProviderConfig| -> FactoryResult {
                let ProviderOptions::Bilibili(options) = &config.options else {
                    return Err(wrong_options(config, ProviderKind::Bilibili));
                };
                Ok(Arc::new(BilibiliProvider::new(
                    &config.id,
                    options.clone(),
                    bilibili_http.clone(),
                )?))
            })
            .register(ProviderKind::MacCms, move |config: &ProviderConfig| -> FactoryResult {
                let ProviderOptions::MacCms(options) = &config.options else {
                    return Err(wrong_options(config, ProviderKind::MacCms));
                };
                Ok(Arc::new(MacCmsProvider::new(
                    &config.id,
                    options.clone(),
                    maccms_http.clone(),
                )?))
            })
            .register(ProviderKind::Custom, move |config: &ProviderConfig| -> FactoryResult {
                let ProviderOptions::Custom = &config.options else {
                    return Err(wrong_options(config, ProviderKind::Custom));
                };
                Ok(Arc::new(CustomProvider::new(&config.id, Arc::clone(&db))))
            })
            .build()
    }

    /// Creates the provider backing `config`
    pub fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>, RegistryError> {
        let kind = config.kind();
        let factory = self
            .factories
            .get(&kind)
            .ok_or(RegistryError::MissingFactory(kind))?;

        log::debug!("Creating {} provider for config '{}'", kind, config.id);

        factory(config).map_err(|source| RegistryError::Construction {
            config_id: config.id.clone(),
            source,
        })
    }
}

fn wrong_options(config: &ProviderConfig, expected: ProviderKind) -> ProviderError {
    ProviderError::InvalidConfig(format!(
        "Config '{}' holds {} options, the {} factory cannot use them",
        config.id,
        config.kind(),
        expected
    ))
}
