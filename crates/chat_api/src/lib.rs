//! Transport-only chat-completions client primitives.
//!
//! This crate owns request building, response streaming, and SSE parsing for
//! OpenAI-compatible `chat/completions` endpoints, including Azure OpenAI
//! deployments. It contains no prompt construction and no interpretation of the
//! model's text beyond splitting it into deltas.
//!
//! Requests are sent exactly once. Callers decide what a failure means for
//! their turn; nothing here retries.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod sse;
pub mod url;

pub use client::ChatApiClient;
pub use client::StreamResult;
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use events::{ChatStreamEvent, FinishReason};
pub use payload::{ChatRequest, ChatRequestMessage, ResponseFormat};
pub use sse::SseStreamParser;
pub use reqwest::StatusCode;
pub use url::normalize_chat_url;
