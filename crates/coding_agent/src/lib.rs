//! Prompt-to-project turn engine.
//!
//! `coding_agent` owns the resident project registry, the turn orchestrator that
//! streams a model response and applies it to a project's files, and the command
//! runner used for model-requested shell commands.
//!
//! ## Provider bootstrap
//!
//! The model provider is chosen once at startup:
//!
//! - `FORGE_PROVIDER=mock` (default) streams a canned instruction set, for local runs
//!   and tests.
//! - `FORGE_PROVIDER=chat-api` streams from an OpenAI-compatible chat-completions
//!   endpoint.
//!
//! With `chat-api`, set:
//!
//! - `AZURE_OPENAI_ENDPOINT` + `AZURE_OPENAI_API_KEY` for Azure OpenAI. The deployment
//!   is `FORGE_MODEL` and `AZURE_OPENAI_VERSION` defaults to `2024-05-01-preview`.
//! - or `OPENAI_API_KEY`, with an optional `OPENAI_BASE_URL`, for OpenAI-compatible
//!   servers.
//! - `FORGE_MODEL` (default `gpt-4o`) and `FORGE_MODEL_TIMEOUT_SEC` (optional, > 0).
//!
//! ## Turn contract
//!
//! Every model run receives the project's conversation log, then a system message
//! listing every known file with 1-based line numbers, then the new prompt. The
//! response must be a single JSON object with optional `files`, `patches` and
//! `commands` arrays. Commands are split on whitespace; quoting is not supported.

pub mod commands;
pub mod project;
pub mod providers;
pub mod runtime;
pub mod tools;

pub use project::{
    generate_project_id, lock_unpoisoned, LoadOutcome, Project, ProjectListing,
    ProjectRegistry, RegistryError, SharedProject,
};
pub use runtime::{ErrorKind, TurnEvent, TurnOrchestrator, TurnState};
pub use tools::{CommandError, CommandRunner, OutputLine, OutputStream};
