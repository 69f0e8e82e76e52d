use agent_provider::{ChatMessage, Role};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::instruction::SYSTEM_INSTRUCTION;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
    /// UTC time the entry was appended.
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
}

impl ConversationEntry {
    fn now(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            ts: OffsetDateTime::now_utc(),
        }
    }
}

/// Ordered, role-tagged history for one project.
#[derive(Debug, Clone)]
pub struct ConversationLog {
    entries: Vec<ConversationEntry>,
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new(SYSTEM_INSTRUCTION)
    }
}

impl ConversationLog {
    pub fn new(system_instruction: impl Into<String>) -> Self {
        Self {
            entries: vec![ConversationEntry::now(Role::System, system_instruction.into())],
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.entries
            .push(ConversationEntry::now(Role::User, content.into()));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.entries
            .push(ConversationEntry::now(Role::Assistant, content.into()));
    }

    pub fn system_instruction(&self) -> &str {
        &self.entries[0].content
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Never true: the system instruction is always present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// History as provider messages, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.entries
            .iter()
            .map(|entry| ChatMessage {
                role: entry.role,
                content: entry.content.clone(),
            })
            .collect()
    }
}
