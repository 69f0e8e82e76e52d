//! Per-project prompt history.
//!
//! A [`ConversationLog`] always starts with the system instruction that fixes the
//! response shape; turns append one user entry and, once the model stream
//! completes, one assistant entry holding the raw response text.

mod instruction;
mod log;

pub use instruction::SYSTEM_INSTRUCTION;
pub use log::{ConversationEntry, ConversationLog};
