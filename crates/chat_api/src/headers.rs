use std::collections::BTreeMap;

use crate::config::ChatApiConfig;
use crate::error::ChatApiError;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_API_KEY: &str = "api-key";
pub const HEADER_USER_AGENT: &str = "user-agent";

/// Build a deterministic header map for chat-completions requests.
pub fn build_headers(
    config: &ChatApiConfig,
    user_agent: Option<&str>,
) -> Result<BTreeMap<String, String>, ChatApiError> {
    let api_key = config.api_key.trim();
    if api_key.is_empty() {
        return Err(ChatApiError::MissingApiKey);
    }

    let mut headers = BTreeMap::new();
    if config.is_azure() {
        headers.insert(HEADER_API_KEY.to_owned(), api_key.to_owned());
    } else {
        headers.insert(HEADER_AUTHORIZATION.to_owned(), format!("Bearer {api_key}"));
    }
    headers.insert(HEADER_ACCEPT.to_owned(), "text/event-stream".to_owned());
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );

    let ua = match (user_agent, config.user_agent.as_deref()) {
        (Some(explicit), _) if !explicit.trim().is_empty() => explicit.trim().to_owned(),
        (None, Some(explicit)) if !explicit.trim().is_empty() => explicit.trim().to_owned(),
        _ => default_user_agent(),
    };
    headers.insert(HEADER_USER_AGENT.to_owned(), ua);

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    Ok(headers)
}

fn default_user_agent() -> String {
    format!("prompt-forge/{}", env!("CARGO_PKG_VERSION"))
}
