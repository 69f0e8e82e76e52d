use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};

use crate::config::ChatApiConfig;
use crate::error::{parse_error_message, ChatApiError};
use crate::events::{ChatStreamEvent, FinishReason};
use crate::headers::build_headers;
use crate::payload::ChatRequest;
use crate::sse::SseStreamParser;
use crate::url::normalize_chat_url;

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
}

#[derive(Debug, Clone)]
pub struct StreamResult {
    pub events: Vec<ChatStreamEvent>,
    pub terminal: Option<FinishReason>,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChatApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn normalized_endpoint(&self) -> String {
        normalize_chat_url(
            &self.config.base_url,
            &self.config.model,
            self.config.api_version.as_deref(),
        )
    }

    pub fn build_headers(&self, user_agent: Option<&str>) -> Result<HeaderMap, ChatApiError> {
        let headers = build_headers(&self.config, user_agent)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ChatApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::RequestBuilder, ChatApiError> {
        validate_request_payload_shape(request)?;

        let endpoint = self.normalized_endpoint();
        reqwest::Url::parse(&endpoint)
            .map_err(|error| ChatApiError::InvalidBaseUrl(format!("{endpoint}: {error}")))?;

        let headers = self.build_headers(self.config.user_agent.as_deref())?;
        let payload = self.request_with_transport_defaults(request);
        Ok(self.http.post(endpoint).headers(headers).json(&payload))
    }

    fn request_with_transport_defaults(&self, request: &ChatRequest) -> ChatRequest {
        let mut payload = request.clone();
        payload.stream = true;
        if payload.model.trim().is_empty() {
            payload.model = self.config.model.clone();
        }
        if payload.temperature.is_none() {
            payload.temperature = self.config.temperature;
        }
        payload
    }

    /// Sends the request once; non-success statuses become [`ChatApiError::Status`].
    pub async fn send(&self, request: &ChatRequest) -> Result<Response, ChatApiError> {
        let response = self.build_request(request)?.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = parse_error_message(status, &body);
        tracing::warn!(%status, %message, "chat completion request rejected");
        Err(ChatApiError::Status(status, message))
    }

    pub async fn stream_with_handler<F>(
        &self,
        request: &ChatRequest,
        mut on_event: F,
    ) -> Result<Option<FinishReason>, ChatApiError>
    where
        F: FnMut(ChatStreamEvent),
    {
        let response = self.send(request).await?;
        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();
        let mut terminal = None;

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(ChatApiError::from)?;
            for event in parser.feed(&chunk) {
                process_stream_event(event, &mut terminal, &mut on_event)?;
            }
        }

        Ok(terminal)
    }

    pub async fn stream(&self, request: &ChatRequest) -> Result<StreamResult, ChatApiError> {
        let mut events = Vec::new();
        let terminal = self
            .stream_with_handler(request, |event| {
                events.push(event);
            })
            .await?;

        Ok(StreamResult { events, terminal })
    }
}

fn validate_request_payload_shape(request: &ChatRequest) -> Result<(), ChatApiError> {
    if request.messages.is_empty() {
        return Err(ChatApiError::InvalidRequestPayload(
            "'messages' must contain at least one message".to_string(),
        ));
    }

    Ok(())
}

fn process_stream_event<F>(
    event: ChatStreamEvent,
    terminal: &mut Option<FinishReason>,
    on_event: &mut F,
) -> Result<(), ChatApiError>
where
    F: FnMut(ChatStreamEvent),
{
    match &event {
        ChatStreamEvent::Error { code, message } => {
            return Err(ChatApiError::StreamFailed {
                code: code.clone(),
                message: message
                    .clone()
                    .or_else(|| code.clone())
                    .unwrap_or_else(|| "chat completion stream error".to_owned()),
            });
        }
        ChatStreamEvent::Finished { reason: Some(reason) } => {
            *terminal = Some(*reason);
        }
        ChatStreamEvent::Finished { reason: None } => {
            return Err(ChatApiError::StreamFailed {
                code: None,
                message: "chat completion finished with an unrecognized finish_reason".to_owned(),
            });
        }
        // Some compatible servers only send the sentinel.
        ChatStreamEvent::Done => {
            if terminal.is_none() {
                *terminal = Some(FinishReason::Stop);
            }
        }
        ChatStreamEvent::ContentDelta { .. } => {}
    }

    on_event(event);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::process_stream_event;
    use crate::error::ChatApiError;
    use crate::events::{ChatStreamEvent, FinishReason};
    use crate::sse::SseStreamParser;

    fn run(events: Vec<ChatStreamEvent>) -> (Result<(), ChatApiError>, Option<FinishReason>) {
        let mut terminal = None;
        let mut observed = Vec::new();
        let mut outcome = Ok(());
        for event in events {
            outcome = process_stream_event(event, &mut terminal, &mut |event| observed.push(event));
            if outcome.is_err() {
                break;
            }
        }
        (outcome, terminal)
    }

    #[test]
    fn finish_reason_becomes_terminal() {
        let (outcome, terminal) = run(vec![
            ChatStreamEvent::ContentDelta {
                delta: "{}".to_owned(),
            },
            ChatStreamEvent::Finished {
                reason: Some(FinishReason::Length),
            },
            ChatStreamEvent::Done,
        ]);

        assert!(outcome.is_ok());
        assert_eq!(terminal, Some(FinishReason::Length));
    }

    #[test]
    fn done_sentinel_alone_counts_as_stop() {
        let (outcome, terminal) = run(vec![ChatStreamEvent::Done]);
        assert!(outcome.is_ok());
        assert_eq!(terminal, Some(FinishReason::Stop));
    }

    #[test]
    fn missing_terminal_is_reported_as_none() {
        let (_, terminal) = run(vec![ChatStreamEvent::ContentDelta {
            delta: "partial".to_owned(),
        }]);
        assert_eq!(terminal, None);
    }

    #[test]
    fn unrecognized_finish_reason_fails_the_stream() {
        let (outcome, terminal) = run(vec![
            ChatStreamEvent::ContentDelta {
                delta: "{}".to_owned(),
            },
            ChatStreamEvent::Finished { reason: None },
            ChatStreamEvent::Done,
        ]);

        assert!(matches!(
            outcome,
            Err(ChatApiError::StreamFailed { code: None, ref message })
                if message.contains("unrecognized finish_reason")
        ));
        assert_eq!(terminal, None);
    }

    #[test]
    fn error_frame_fails_the_stream() {
        let (outcome, _) = run(vec![ChatStreamEvent::Error {
            code: Some("server_error".to_owned()),
            message: Some("overloaded".to_owned()),
        }]);

        match outcome {
            Err(ChatApiError::StreamFailed { code, message }) => {
                assert_eq!(code.as_deref(), Some("server_error"));
                assert_eq!(message, "overloaded");
            }
            other => panic!("expected stream failure, got {other:?}"),
        }
    }

    #[test]
    fn process_stream_event_emits_deltas_in_parser_order() {
        let frames = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n\n",
        );
        let mut parser = SseStreamParser::default();
        let parsed = parser.feed(frames.as_bytes());

        let mut terminal = None;
        let mut observed = Vec::new();
        for event in parsed {
            process_stream_event(event, &mut terminal, &mut |event| observed.push(event))
                .expect("deltas should process successfully");
        }

        assert!(terminal.is_none());
        assert_eq!(
            observed,
            vec![
                ChatStreamEvent::ContentDelta {
                    delta: "A".to_string(),
                },
                ChatStreamEvent::ContentDelta {
                    delta: "B".to_string(),
                },
            ]
        );
    }
}
