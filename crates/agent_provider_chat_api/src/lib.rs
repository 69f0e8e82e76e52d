//! Chat-completions-backed implementation of the shared `agent_provider` contract.
//!
//! This adapter translates `chat_api` stream semantics into the `RunEvent`
//! lifecycle expected by `coding_agent`. Deltas are emitted as they arrive.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use agent_provider::{
    ChatMessage, ProviderInitError, ProviderProfile, RunEvent, RunProvider, RunRequest,
};
use chat_api::{
    ChatApiClient, ChatApiConfig, ChatApiError, ChatRequest, ChatRequestMessage, ChatStreamEvent,
    FinishReason,
};

/// Stable provider identifier used by `coding_agent` startup selection.
pub const CHAT_API_PROVIDER_ID: &str = "chat-api";

pub const DEFAULT_MODEL_ID: &str = "gpt-4o";

/// Runtime configuration for the chat-completions provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatApiProviderConfig {
    pub api_key: String,
    pub model_id: String,
    pub base_url: Option<String>,
    /// Azure `api-version`; when set, requests go to the deployment named by `model_id`.
    pub api_version: Option<String>,
    pub timeout: Option<Duration>,
    pub temperature: Option<f64>,
}

impl ChatApiProviderConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model_id: model_id.into(),
            base_url: None,
            api_version: None,
            timeout: None,
            temperature: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn into_chat_api_config(self, model_id: &str) -> ChatApiConfig {
        let mut config = ChatApiConfig::new(self.api_key, model_id);

        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }

        if let Some(api_version) = self.api_version {
            config = config.with_api_version(api_version);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        if let Some(temperature) = self.temperature {
            config = config.with_temperature(temperature);
        }

        config
    }
}

trait StreamClient: Send + Sync {
    fn stream(
        &self,
        request: &ChatRequest,
        on_event: &mut dyn FnMut(ChatStreamEvent),
    ) -> Result<Option<FinishReason>, ChatApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: ChatApiClient,
    fallback_runtime: OnceLock<tokio::runtime::Runtime>,
}

impl DefaultStreamClient {
    fn fallback_runtime(&self) -> Result<&tokio::runtime::Runtime, ChatApiError> {
        if let Some(runtime) = self.fallback_runtime.get() {
            return Ok(runtime);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                ChatApiError::Runtime(format!("failed to initialize tokio runtime: {error}"))
            })?;
        Ok(self.fallback_runtime.get_or_init(|| runtime))
    }
}

impl StreamClient for DefaultStreamClient {
    fn stream(
        &self,
        request: &ChatRequest,
        on_event: &mut dyn FnMut(ChatStreamEvent),
    ) -> Result<Option<FinishReason>, ChatApiError> {
        let future = self.client.stream_with_handler(request, on_event);

        // Runs are driven from blocking threads; reuse the server's runtime when there is one
        // so pooled connections stay bound to a live reactor.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle.block_on(future),
            Err(_) => self.fallback_runtime()?.block_on(future),
        }
    }
}

/// `RunProvider` adapter backed by `chat_api` transport primitives.
pub struct ChatApiProvider {
    model_id: String,
    stream_client: Arc<dyn StreamClient>,
}

impl ChatApiProvider {
    /// Creates a provider using real chat-completions transport.
    pub fn new(config: ChatApiProviderConfig) -> Result<Self, ProviderInitError> {
        let model_id = sanitize_model_id(&config.model_id);
        let client =
            ChatApiClient::new(config.into_chat_api_config(&model_id)).map_err(map_init_error)?;
        if client.config().api_key.trim().is_empty() {
            return Err(map_init_error(ChatApiError::MissingApiKey));
        }

        tracing::info!(
            model = %model_id,
            endpoint = %client.normalized_endpoint(),
            "chat-api provider ready"
        );

        Ok(Self {
            model_id,
            stream_client: Arc::new(DefaultStreamClient {
                client,
                fallback_runtime: OnceLock::new(),
            }),
        })
    }

    fn build_request(&self, req: &RunRequest) -> ChatRequest {
        let messages = req.messages.iter().map(to_request_message).collect();
        let mut request = ChatRequest::new(self.model_id.clone(), messages);
        if req.json_response {
            request = request.with_json_object_response();
        }
        request
    }

    fn emit_terminal_event(
        &self,
        run_id: u64,
        terminal: Option<FinishReason>,
        emit: &mut dyn FnMut(RunEvent),
    ) {
        match terminal {
            Some(FinishReason::Stop) => emit(RunEvent::Finished { run_id }),
            Some(reason) => emit(RunEvent::Failed {
                run_id,
                error: format!(
                    "chat completion ended with finish_reason '{}'",
                    reason.as_str()
                ),
            }),
            None => emit(RunEvent::Failed {
                run_id,
                error: "chat completion stream ended without finish_reason".to_string(),
            }),
        }
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(model_id: &str, stream_client: Arc<dyn StreamClient>) -> Self {
        Self {
            model_id: sanitize_model_id(model_id),
            stream_client,
        }
    }
}

impl RunProvider for ChatApiProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: CHAT_API_PROVIDER_ID.to_string(),
            model_id: self.model_id.clone(),
        }
    }

    fn run(&self, req: RunRequest, emit: &mut dyn FnMut(RunEvent)) -> Result<(), String> {
        let run_id = req.run_id;

        emit(RunEvent::Started { run_id });

        let request = self.build_request(&req);
        let outcome = self.stream_client.stream(&request, &mut |event| {
            if let ChatStreamEvent::ContentDelta { delta } = event {
                if !delta.is_empty() {
                    emit(RunEvent::Chunk { run_id, text: delta });
                }
            }
        });

        match outcome {
            Ok(terminal) => self.emit_terminal_event(run_id, terminal, emit),
            Err(error) => {
                tracing::warn!(run_id, %error, "chat completion request failed");
                emit(RunEvent::Failed {
                    run_id,
                    error: format!("chat completion request failed: {error}"),
                });
            }
        }

        Ok(())
    }
}

fn to_request_message(message: &ChatMessage) -> ChatRequestMessage {
    ChatRequestMessage::new(message.role.as_str(), message.content.clone())
}

fn sanitize_model_id(model_id: &str) -> String {
    let trimmed = model_id.trim();
    if trimmed.is_empty() {
        DEFAULT_MODEL_ID.to_string()
    } else {
        trimmed.to_string()
    }
}

fn map_init_error(error: ChatApiError) -> ProviderInitError {
    ProviderInitError::new(format!("Failed to initialize chat-api provider: {error}"))
}
