//! HTTP front end for prompt-driven project generation.
//!
//! Clients create or load a project, then post prompts to `/update-project`. Each
//! prompt runs one turn through [`coding_agent::TurnOrchestrator`] and the turn's
//! events stream back as server-sent events (`status`, `partial`, `file-written`,
//! `file-patched`, `command-output`, `error`, `done`).
//!
//! # Routes
//! - `POST /create-project {projectName?}` -> `{projectId}`
//! - `POST /load-project {projectId}` -> `{projectId, status, files}`
//! - `GET /list-projects` -> `{projects: [{projectId, inMemory}]}`
//! - `GET /projects/:projectId/conversation` -> `{projectId, entries}`
//! - `POST /update-project {projectId, prompt}` -> SSE stream
//! - `GET /health` -> `{healthy, version}`

pub mod config;
pub mod logging;
pub mod server;

pub use config::ServerConfig;
pub use server::{app_router, serve, shutdown_signal, ApiError, AppState};
