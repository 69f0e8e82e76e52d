//! Turn orchestration: prompt in, applied changes out.
//!
//! A turn moves through [`TurnState`]s in a fixed order and reports everything it
//! does as [`TurnEvent`]s. Per-item failures while applying files, patches and
//! commands are reported and do not end the turn; upstream and decode failures do.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use agent_provider::{ChatMessage, RunEvent, RunId, RunProvider, RunRequest};
use apply_patch_engine::{decode, InstructionSet, InvalidItem, PatchWarning, WorkspaceError};
use serde::Serialize;
use serde_json::{json, Value};

use crate::project::{lock_unpoisoned, Project, ProjectRegistry};
use crate::tools::{CommandError, CommandRunner, OutputLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidInput,
    UpstreamFailure,
    MalformedResponse,
    InvalidInstruction,
    InvalidPath,
    UnknownFile,
    OutOfRange,
    NotFound,
    IoError,
    CommandFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "InvalidInput",
            Self::UpstreamFailure => "UpstreamFailure",
            Self::MalformedResponse => "MalformedResponse",
            Self::InvalidInstruction => "InvalidInstruction",
            Self::InvalidPath => "InvalidPath",
            Self::UnknownFile => "UnknownFile",
            Self::OutOfRange => "OutOfRange",
            Self::NotFound => "NotFound",
            Self::IoError => "IoError",
            Self::CommandFailed => "CommandFailed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingModel,
    StreamingTokens,
    ParsingResponse,
    ApplyingFiles,
    ApplyingPatches,
    RunningCommands,
    Done,
    Errored(ErrorKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Status {
        message: String,
    },
    Partial {
        text: String,
    },
    FileWritten {
        path: String,
    },
    FilePatched {
        file: String,
        applied: usize,
        warnings: Vec<PatchWarning>,
    },
    CommandOutput {
        command: String,
        output: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
        fatal: bool,
        exit_code: Option<i32>,
    },
    Done {
        project_id: String,
    },
}

impl TurnEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    fn error(kind: ErrorKind, message: impl Into<String>, fatal: bool) -> Self {
        Self::Error {
            kind,
            message: message.into(),
            fatal,
            exit_code: None,
        }
    }

    /// SSE event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Partial { .. } => "partial",
            Self::FileWritten { .. } => "file-written",
            Self::FilePatched { .. } => "file-patched",
            Self::CommandOutput { .. } => "command-output",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }

    /// camelCase JSON payload for the event's `data` field.
    pub fn payload(&self) -> Value {
        match self {
            Self::Status { message } => json!({ "status": message }),
            Self::Partial { text } => json!({ "text": text }),
            Self::FileWritten { path } => json!({ "path": path }),
            Self::FilePatched {
                file,
                applied,
                warnings,
            } => json!({ "file": file, "applied": applied, "warnings": warnings }),
            Self::CommandOutput { command, output } => {
                json!({ "command": command, "output": output })
            }
            Self::Error {
                kind,
                message,
                fatal,
                exit_code,
            } => {
                let mut payload = json!({ "kind": kind, "message": message, "fatal": fatal });
                if *kind == ErrorKind::CommandFailed {
                    payload["exitCode"] = json!(exit_code);
                }
                payload
            }
            Self::Done { project_id } => json!({ "projectId": project_id }),
        }
    }
}

/// Drives turns against resident projects with one shared provider.
pub struct TurnOrchestrator {
    provider: Arc<dyn RunProvider>,
    commands: Option<CommandRunner>,
    next_run_id: AtomicU64,
}

impl TurnOrchestrator {
    pub fn new(provider: Arc<dyn RunProvider>) -> Self {
        Self {
            provider,
            commands: Some(CommandRunner::default()),
            next_run_id: AtomicU64::new(1),
        }
    }

    /// `None` disables command execution; requested commands are skipped with a status event.
    #[must_use]
    pub fn with_command_runner(mut self, commands: Option<CommandRunner>) -> Self {
        self.commands = commands;
        self
    }

    /// Looks up the project and runs one turn while holding its lock.
    ///
    /// A second turn against the same project waits until the first returns.
    pub fn run_turn_for(
        &self,
        registry: &ProjectRegistry,
        project_id: &str,
        prompt: &str,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> TurnState {
        let Some(project) = registry.get(project_id) else {
            tracing::warn!(project_id, "turn requested for a project that is not resident");
            emit(TurnEvent::error(
                ErrorKind::InvalidInput,
                format!("project '{project_id}' is not loaded"),
                true,
            ));
            return TurnState::Errored(ErrorKind::InvalidInput);
        };

        let mut project = lock_unpoisoned(&project);
        self.run_turn(&mut project, prompt, emit)
    }

    pub fn run_turn(
        &self,
        project: &mut Project,
        prompt: &str,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> TurnState {
        let mut turn = Turn {
            project_id: project.id().to_string(),
            state: TurnState::Idle,
        };

        if prompt.trim().is_empty() {
            emit(TurnEvent::error(ErrorKind::InvalidInput, "prompt is empty", true));
            return turn.fail(ErrorKind::InvalidInput);
        }

        turn.advance(TurnState::AwaitingModel);
        emit(TurnEvent::status("Contacting model..."));

        let mut messages = project.conversation().messages();
        messages.push(ChatMessage::system(project.workspace().file_context()));
        messages.push(ChatMessage::user(prompt));

        let response = match self.stream_response(&mut turn, messages, emit) {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(project_id = %turn.project_id, %error, "model stream failed");
                emit(TurnEvent::error(ErrorKind::UpstreamFailure, error, true));
                return turn.fail(ErrorKind::UpstreamFailure);
            }
        };

        // The exchange is recorded even when the response fails to decode.
        project.conversation_mut().push_user(prompt);
        project.conversation_mut().push_assistant(response.as_str());

        turn.advance(TurnState::ParsingResponse);
        let instructions = match decode(&response) {
            Ok(instructions) => instructions,
            Err(error) => {
                tracing::warn!(project_id = %turn.project_id, %error, "model response rejected");
                emit(TurnEvent::error(
                    ErrorKind::MalformedResponse,
                    format!("could not parse model response: {error}"),
                    true,
                ));
                return turn.fail(ErrorKind::MalformedResponse);
            }
        };

        self.apply(&mut turn, project, instructions, emit);

        turn.advance(TurnState::Done);
        emit(TurnEvent::status("Done"));
        emit(TurnEvent::Done {
            project_id: turn.project_id.clone(),
        });
        turn.state
    }

    fn stream_response(
        &self,
        turn: &mut Turn,
        messages: Vec<ChatMessage>,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> Result<String, String> {
        let run_id: RunId = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let request = RunRequest {
            run_id,
            messages,
            json_response: true,
        };

        let mut response = String::new();
        let mut finished = false;
        let mut failure: Option<String> = None;

        let outcome = {
            let mut on_event = |event: RunEvent| {
                if event.run_id() != run_id || finished || failure.is_some() {
                    return;
                }
                match event {
                    RunEvent::Started { .. } => turn.advance(TurnState::StreamingTokens),
                    RunEvent::Chunk { text, .. } => {
                        if text.is_empty() {
                            return;
                        }
                        response.push_str(&text);
                        emit(TurnEvent::Partial { text });
                    }
                    RunEvent::Finished { .. } => finished = true,
                    RunEvent::Failed { error, .. } => failure = Some(error),
                }
            };

            catch_unwind(AssertUnwindSafe(|| self.provider.run(request, &mut on_event)))
        };

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => failure = failure.or(Some(error)),
            Err(_) => failure = Some("model provider panicked".to_string()),
        }

        if let Some(error) = failure {
            return Err(error);
        }
        if !finished {
            return Err("model stream ended without a finished signal".to_string());
        }
        Ok(response)
    }

    fn apply(
        &self,
        turn: &mut Turn,
        project: &mut Project,
        instructions: InstructionSet,
        emit: &mut dyn FnMut(TurnEvent),
    ) {
        turn.advance(TurnState::ApplyingFiles);
        for item in instructions.files {
            let file = match item {
                Ok(file) => file,
                Err(invalid) => {
                    emit(invalid_item_event("files", &invalid));
                    continue;
                }
            };
            match project.workspace_mut().put_file(&file.path, &file.content) {
                Ok(path) => emit(TurnEvent::FileWritten { path }),
                Err(error) => emit(workspace_error_event(&error)),
            }
        }

        turn.advance(TurnState::ApplyingPatches);
        for item in instructions.patches {
            let patch = match item {
                Ok(patch) => patch,
                Err(invalid) => {
                    emit(invalid_item_event("patches", &invalid));
                    continue;
                }
            };
            match project
                .workspace_mut()
                .patch_file(&patch.file, &patch.instructions)
            {
                Ok(report) => emit(TurnEvent::FilePatched {
                    file: report.path,
                    applied: report.applied,
                    warnings: report.warnings,
                }),
                Err(error) => emit(workspace_error_event(&error)),
            }
        }

        turn.advance(TurnState::RunningCommands);
        if instructions.commands.is_empty() {
            return;
        }
        let Some(runner) = &self.commands else {
            emit(TurnEvent::status(format!(
                "Command execution is disabled; skipped {} command(s)",
                instructions.commands.len()
            )));
            return;
        };

        let cwd = project.workspace().root().to_path_buf();
        for item in instructions.commands {
            let command = match item {
                Ok(command) => command,
                Err(invalid) => {
                    emit(invalid_item_event("commands", &invalid));
                    continue;
                }
            };

            emit(TurnEvent::status(format!("Running command: {command}")));
            let outcome = runner.run(&command, &cwd, &mut |line: OutputLine| {
                emit(TurnEvent::CommandOutput {
                    command: command.clone(),
                    output: line.text,
                })
            });

            if let Err(error) = outcome {
                tracing::warn!(project_id = %turn.project_id, %command, %error, "command failed");
                emit(command_error_event(&command, &error));
                break;
            }
        }
    }
}

struct Turn {
    project_id: String,
    state: TurnState,
}

impl Turn {
    fn advance(&mut self, next: TurnState) {
        tracing::debug!(project_id = %self.project_id, from = ?self.state, to = ?next, "turn transition");
        self.state = next;
    }

    fn fail(&mut self, kind: ErrorKind) -> TurnState {
        self.advance(TurnState::Errored(kind));
        self.state
    }
}

fn invalid_item_event(section: &str, invalid: &InvalidItem) -> TurnEvent {
    TurnEvent::error(
        ErrorKind::InvalidInstruction,
        format!("{section}[{}]: {}", invalid.index, invalid.reason),
        false,
    )
}

fn workspace_error_event(error: &WorkspaceError) -> TurnEvent {
    let kind = match error {
        WorkspaceError::InvalidPath { .. } => ErrorKind::InvalidPath,
        WorkspaceError::UnknownFile { .. } => ErrorKind::UnknownFile,
        WorkspaceError::Io { .. } => ErrorKind::IoError,
    };
    tracing::warn!(%error, "workspace item failed");
    TurnEvent::error(kind, error.to_string(), false)
}

fn command_error_event(command: &str, error: &CommandError) -> TurnEvent {
    TurnEvent::Error {
        kind: ErrorKind::CommandFailed,
        message: format!("command \"{command}\" failed: {error}"),
        fatal: false,
        exit_code: error.exit_code(),
    }
}
