use std::collections::BTreeMap;
use std::time::Duration;

use crate::url::DEFAULT_OPENAI_BASE_URL;

/// Whole-request timeout applied unless the caller sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Transport configuration for chat-completions requests.
#[derive(Debug, Clone)]
pub struct ChatApiConfig {
    /// Secret sent as `api-key` (Azure) or as a bearer token.
    pub api_key: String,
    /// Base URL, resource endpoint, or full `chat/completions` URL.
    pub base_url: String,
    /// Model id, or the deployment name when talking to Azure.
    pub model: String,
    /// Azure `api-version`; setting it switches to deployment routing and `api-key` auth.
    pub api_version: Option<String>,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
    /// Whole-request timeout, including the streamed body. Defaults to [`DEFAULT_TIMEOUT`];
    /// `None` disables it.
    pub timeout: Option<Duration>,
    /// Optional sampling temperature.
    pub temperature: Option<f64>,
}

impl Default for ChatApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: "gpt-4o".to_string(),
            api_version: None,
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout: Some(DEFAULT_TIMEOUT),
            temperature: None,
        }
    }
}

impl ChatApiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    /// True when requests use Azure deployment routing and `api-key` auth.
    pub fn is_azure(&self) -> bool {
        self.api_version
            .as_deref()
            .is_some_and(|version| !version.trim().is_empty())
    }
}
