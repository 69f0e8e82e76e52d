use std::sync::Arc;
use std::time::Duration;

use agent_provider::RunProvider;
use agent_provider_chat_api::{ChatApiProvider, ChatApiProviderConfig, CHAT_API_PROVIDER_ID};
use agent_provider_mock::{MockProvider, MOCK_PROVIDER_ID};

pub const DEFAULT_PROVIDER_ID: &str = MOCK_PROVIDER_ID;
pub const PROVIDER_ENV_VAR: &str = "FORGE_PROVIDER";

pub const AZURE_ENDPOINT_ENV_VAR: &str = "AZURE_OPENAI_ENDPOINT";
pub const OPENAI_BASE_URL_ENV_VAR: &str = "OPENAI_BASE_URL";
pub const AZURE_API_KEY_ENV_VAR: &str = "AZURE_OPENAI_API_KEY";
pub const OPENAI_API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";
pub const AZURE_API_VERSION_ENV_VAR: &str = "AZURE_OPENAI_VERSION";
pub const MODEL_ENV_VAR: &str = "FORGE_MODEL";
pub const MODEL_TIMEOUT_ENV_VAR: &str = "FORGE_MODEL_TIMEOUT_SEC";

pub const DEFAULT_AZURE_API_VERSION: &str = "2024-05-01-preview";
pub const DEFAULT_MODEL_ID: &str = "gpt-4o";

pub fn provider_from_env() -> Result<Arc<dyn RunProvider>, String> {
    let provider_id = env_value(PROVIDER_ENV_VAR);
    provider_for_id(provider_id.as_deref().unwrap_or(DEFAULT_PROVIDER_ID))
}

pub fn provider_for_id(provider_id: &str) -> Result<Arc<dyn RunProvider>, String> {
    match provider_id {
        MOCK_PROVIDER_ID => Ok(Arc::new(MockProvider::default())),
        CHAT_API_PROVIDER_ID => {
            let config = chat_api_config_from_lookup(env_value)?;
            let provider = ChatApiProvider::new(config).map_err(|error| error.to_string())?;
            Ok(Arc::new(provider))
        }
        unknown => Err(format!(
            "Unsupported provider '{unknown}'. Available providers: {MOCK_PROVIDER_ID}, {CHAT_API_PROVIDER_ID}"
        )),
    }
}

/// Builds the chat-api configuration from environment-style lookups.
///
/// `AZURE_OPENAI_ENDPOINT` selects Azure routing and takes precedence over
/// `OPENAI_BASE_URL`; Azure requests always carry an `api-version`.
pub fn chat_api_config_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ChatApiProviderConfig, String> {
    let api_key = lookup(AZURE_API_KEY_ENV_VAR)
        .or_else(|| lookup(OPENAI_API_KEY_ENV_VAR))
        .ok_or_else(|| {
            format!(
                "Provider '{CHAT_API_PROVIDER_ID}' requires {AZURE_API_KEY_ENV_VAR} or {OPENAI_API_KEY_ENV_VAR}"
            )
        })?;
    let model_id = lookup(MODEL_ENV_VAR).unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());
    let mut config = ChatApiProviderConfig::new(api_key, model_id);

    let azure_endpoint = lookup(AZURE_ENDPOINT_ENV_VAR);
    let api_version = lookup(AZURE_API_VERSION_ENV_VAR);
    match azure_endpoint {
        Some(endpoint) => {
            config = config.with_base_url(endpoint).with_api_version(
                api_version.unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            );
        }
        None => {
            if let Some(base_url) = lookup(OPENAI_BASE_URL_ENV_VAR) {
                config = config.with_base_url(base_url);
            }
            if let Some(api_version) = api_version {
                config = config.with_api_version(api_version);
            }
        }
    }

    if let Some(raw) = lookup(MODEL_TIMEOUT_ENV_VAR) {
        let seconds = raw
            .parse::<u64>()
            .ok()
            .filter(|seconds| *seconds > 0)
            .ok_or_else(|| format!("{MODEL_TIMEOUT_ENV_VAR} must be a positive integer, got '{raw}'"))?;
        config = config.with_timeout(Duration::from_secs(seconds));
    }

    Ok(config)
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
