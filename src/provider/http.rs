//! HTTP transport shared by all network providers
//!
//! Header overrides are registered as rules scoped to a URL prefix and to the
//! provider config that registered them. Each rule gets a numeric id; ids are
//! allocated by reading the current maximum and incrementing it under one
//! lock, and a rule stays active exactly as long as its [`HeaderRuleGuard`]
//! lives.

use super::ProviderError;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

/// Headers applied to every request whose URL starts with `url_prefix`
///
/// A rule with an `owner` only applies to requests made by that provider
/// config; an owner-less rule applies to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRule {
    pub owner: Option<String>,
    pub url_prefix: String,
    pub headers: Vec<(String, String)>,
}

/// The set of active header rules
#[derive(Debug, Default)]
pub struct HeaderRules {
    rules: Mutex<BTreeMap<u32, HeaderRule>>,
}

impl HeaderRules {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<u32, HeaderRule>>, ProviderError> {
        self.rules.lock().map_err(|_| ProviderError::Poisoned)
    }

    /// Registers a rule and returns the guard that keeps it active
    ///
    /// The id is the current maximum plus one. Reading the maximum and
    /// inserting the new rule happen under the same lock, so concurrent
    /// registrations never share an id.
    pub fn register(self: &Arc<Self>, rule: HeaderRule) -> Result<HeaderRuleGuard, ProviderError> {
        let mut rules = self.lock()?;
        let id = rules.keys().next_back().map_or(1, |max| max + 1);
        rules.insert(id, rule);

        Ok(HeaderRuleGuard {
            rules: Arc::clone(self),
            id,
        })
    }

    /// Headers of all rules matching `url` that are shared or owned by
    /// `owner`; later rules win on conflicts
    pub fn headers_for(
        &self,
        url: &str,
        owner: Option<&str>,
    ) -> Result<BTreeMap<String, String>, ProviderError> {
        let rules = self.lock()?;
        let mut headers = BTreeMap::new();
        let applicable = rules.values().filter(|rule| {
            url.starts_with(&rule.url_prefix)
                && (rule.owner.is_none() || rule.owner.as_deref() == owner)
        });
        for rule in applicable {
            for (name, value) in &rule.headers {
                headers.insert(name.to_lowercase(), value.clone());
            }
        }
        Ok(headers)
    }

    pub fn len(&self) -> Result<usize, ProviderError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, ProviderError> {
        Ok(self.lock()?.is_empty())
    }

    fn remove(&self, id: u32) {
        // Removal must happen even after a panic elsewhere poisoned the lock
        let mut rules = match self.rules.lock() {
            Ok(rules) => rules,
            Err(poisoned) => poisoned.into_inner(),
        };
        rules.remove(&id);
    }
}

/// Keeps a header rule active; the rule is removed when the guard drops
#[derive(Debug)]
pub struct HeaderRuleGuard {
    rules: Arc<HeaderRules>,
    id: u32,
}

impl HeaderRuleGuard {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for HeaderRuleGuard {
    fn drop(&mut self) {
        self.rules.remove(self.id);
    }
}

/// Blocking HTTP client applying the active header rules
///
/// Clones share the connection pool and the rule set. A client obtained
/// from [`HttpClient::scoped`] registers its rules under its owner and only
/// sees shared rules plus its own.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::blocking::Client,
    rules: Arc<HeaderRules>,
    owner: Option<String>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            rules: HeaderRules::new(),
            owner: None,
        }
    }

    /// A client sharing this one's pool and rules, acting for `owner`
    pub fn scoped(&self, owner: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            rules: Arc::clone(&self.rules),
            owner: Some(owner.into()),
        }
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn rules(&self) -> &Arc<HeaderRules> {
        &self.rules
    }

    /// Registers headers for every request under `url_prefix` made by this
    /// client's owner (by every client, if it has none)
    pub fn register_headers(
        &self,
        url_prefix: &str,
        headers: Vec<(String, String)>,
    ) -> Result<HeaderRuleGuard, ProviderError> {
        self.rules.register(HeaderRule {
            owner: self.owner.clone(),
            url_prefix: url_prefix.to_string(),
            headers,
        })
    }

    /// Headers this client sends to `url`: the applicable rules, then
    /// `extra` on top
    pub fn headers_for(
        &self,
        url: &str,
        extra: &[(String, String)],
    ) -> Result<BTreeMap<String, String>, ProviderError> {
        let mut headers = self.rules.headers_for(url, self.owner.as_deref())?;
        for (name, value) in extra {
            headers.insert(name.to_lowercase(), value.clone());
        }
        Ok(headers)
    }

    /// Performs a GET request and returns the raw body
    ///
    /// `headers` apply to this one request only and are never visible to
    /// other clients sharing the rule set.
    pub fn get_bytes(
        &self,
        url: &Url,
        headers: &[(String, String)],
    ) -> Result<Vec<u8>, ProviderError> {
        let mut request = self.client.get(url.clone());
        for (name, value) in self.headers_for(url.as_str(), headers)? {
            request = request.header(name, value);
        }

        log::debug!("GET {}", url);
        let response = request
            .send()
            .map_err(|e| ProviderError::RequestError(e.to_string()))?;

        if response.status() == 404 {
            return Err(ProviderError::NotFound(url.to_string()));
        }

        if !response.status().is_success() {
            return Err(ProviderError::RequestError(format!(
                "HTTP {} {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .bytes()
            .map(|body| body.to_vec())
            .map_err(|e| ProviderError::RequestError(e.to_string()))
    }

    /// Performs a GET request and parses the JSON body
    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        headers: &[(String, String)],
    ) -> Result<T, ProviderError> {
        let body = self.get_bytes(url, headers)?;
        serde_json::from_slice(&body).map_err(|e| ProviderError::ParseError(e.to_string()))
    }
}

/// Joins `path` onto `base` and appends query parameters
pub(crate) fn build_url(
    base: &str,
    path: &str,
    query: &[(&str, &str)],
) -> Result<Url, ProviderError> {
    let joined = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    let mut url = Url::parse(&joined)
        .map_err(|e| ProviderError::InvalidConfig(format!("{}: {}", joined, e)))?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}
