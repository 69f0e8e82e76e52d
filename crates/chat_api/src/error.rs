use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum ChatApiError {
    MissingApiKey,
    InvalidBaseUrl(String),
    InvalidHeader(String),
    InvalidRequestPayload(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
    StreamFailed {
        code: Option<String>,
        message: String,
    },
    Runtime(String),
    Unknown(String),
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(rename = "error")]
    pub value: Option<ErrorPayloadFields>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayloadFields {
    pub message: Option<String>,
    pub code: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
}

impl ErrorPayloadFields {
    fn code_label(&self) -> Option<String> {
        let code = match self.code.as_ref() {
            Some(serde_json::Value::String(code)) => non_empty_string(code).map(ToOwned::to_owned),
            Some(serde_json::Value::Number(code)) => Some(code.to_string()),
            _ => None,
        };
        code.or_else(|| {
            self.type_
                .as_deref()
                .and_then(non_empty_string)
                .map(ToOwned::to_owned)
        })
    }

    fn describe(&self) -> Option<String> {
        let message = self.message.as_deref().and_then(non_empty_string)?;
        Some(match self.code_label() {
            Some(code) => format!("{message} ({code})"),
            None => message.to_owned(),
        })
    }
}

impl fmt::Display for ChatApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "api key is required"),
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::InvalidHeader(value) => write!(f, "invalid header: {value}"),
            Self::InvalidRequestPayload(message) => {
                write!(f, "invalid request payload: {message}")
            }
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::StreamFailed { code, message } => match code {
                Some(code) if !code.trim().is_empty() => {
                    write!(f, "stream failed ({code}): {message}")
                }
                _ => write!(f, "stream failed: {message}"),
            },
            Self::Runtime(message) => write!(f, "runtime error: {message}"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ChatApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(error) => Some(error),
            Self::Serde(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChatApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for ChatApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Extract a human-readable message from an error response body.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let fallback = || {
        if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            body.to_string()
        }
    };

    match serde_json::from_str::<ErrorPayload>(body) {
        Ok(ErrorPayload { value: Some(error) }) => error.describe().unwrap_or_else(fallback),
        _ => fallback(),
    }
}

fn non_empty_string(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
