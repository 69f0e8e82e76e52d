/// Default base URL for OpenAI-compatible requests.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const CHAT_COMPLETIONS_SUFFIX: &str = "/chat/completions";

/// Normalize a base URL to a chat-completions endpoint.
///
/// Normalization rules:
/// 1) keep a URL ending in `/chat/completions` unchanged
/// 2) with an Azure `api_version`, route through `/openai/deployments/{model}`
///    unless the base already names a deployment
/// 3) append `/chat/completions` otherwise
///
/// With an `api_version`, the `api-version` query parameter is appended when missing.
pub fn normalize_chat_url(input: &str, model: &str, api_version: Option<&str>) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_OPENAI_BASE_URL
    } else {
        input.trim()
    };
    let api_version = api_version
        .map(str::trim)
        .filter(|version| !version.is_empty());

    let trimmed = base.trim_end_matches('/');
    let endpoint = if trimmed.ends_with(CHAT_COMPLETIONS_SUFFIX) {
        trimmed.to_string()
    } else if api_version.is_some() && !trimmed.contains("/openai/deployments/") {
        format!(
            "{trimmed}/openai/deployments/{}{CHAT_COMPLETIONS_SUFFIX}",
            model.trim()
        )
    } else {
        format!("{trimmed}{CHAT_COMPLETIONS_SUFFIX}")
    };

    match api_version {
        Some(version) if !endpoint.contains("api-version=") => {
            format!("{endpoint}?api-version={version}")
        }
        _ => endpoint,
    }
}
