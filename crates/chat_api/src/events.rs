use serde::{Deserialize, Serialize};

/// Why the model stopped producing a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    FunctionCall,
}

impl FinishReason {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            "tool_calls" => Self::ToolCalls,
            "function_call" => Self::FunctionCall,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::ToolCalls => "tool_calls",
            Self::FunctionCall => "function_call",
        }
    }
}

/// Stream event emitted by the parser after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatStreamEvent {
    #[serde(rename = "content.delta")]
    ContentDelta { delta: String },
    /// `finish_reason` was set on the first choice; `None` for unrecognized reasons.
    #[serde(rename = "choice.finished")]
    Finished {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<FinishReason>,
    },
    /// The `[DONE]` sentinel.
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "error")]
    Error {
        code: Option<String>,
        message: Option<String>,
    },
}
