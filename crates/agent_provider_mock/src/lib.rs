//! Deterministic mock implementation of the shared `agent_provider` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and contract-level integration testing. Responses are streamed
//! token by token (split after spaces and newlines) exactly like a live model.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use agent_provider::{ProviderProfile, RunEvent, RunProvider, RunRequest};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

const MOCK_MODEL_ID: &str = "mock";

#[derive(Debug)]
enum Script {
    /// Every run streams the same response.
    Repeat(Vec<String>),
    /// Each run pops the next response; once drained, runs fail.
    Queue(VecDeque<String>),
    /// Every run fails before producing output.
    Fail(String),
    /// Every run streams the response but never signals completion.
    Truncate(Vec<String>),
}

/// Deterministic mock provider used by `coding_agent` tests and local runs.
#[derive(Debug)]
pub struct MockProvider {
    script: Mutex<Script>,
    token_delay: Duration,
    observed: Mutex<Vec<RunRequest>>,
}

impl MockProvider {
    /// Creates a mock provider that streams `chunks` on every run.
    #[must_use]
    pub fn new(chunks: Vec<String>) -> Self {
        Self::from_script(Script::Repeat(chunks))
    }

    /// Creates a mock provider that answers successive runs with successive responses.
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self::from_script(Script::Queue(responses.into()))
    }

    /// Creates a mock provider whose runs fail with `error`.
    #[must_use]
    pub fn failing(error: impl Into<String>) -> Self {
        Self::from_script(Script::Fail(error.into()))
    }

    /// Creates a mock provider whose stream stops without a finished signal.
    #[must_use]
    pub fn truncated(chunks: Vec<String>) -> Self {
        Self::from_script(Script::Truncate(chunks))
    }

    /// Sleeps between emitted tokens, mimicking a live stream.
    #[must_use]
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Requests received so far, in order.
    pub fn observed_requests(&self) -> Vec<RunRequest> {
        lock_unpoisoned(&self.observed).clone()
    }

    fn from_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            token_delay: Duration::ZERO,
            observed: Mutex::new(Vec::new()),
        }
    }

    fn next_response(&self) -> Result<(Vec<String>, bool), String> {
        let mut script = lock_unpoisoned(&self.script);
        match &mut *script {
            Script::Repeat(chunks) => Ok((chunks.clone(), true)),
            Script::Queue(responses) => responses
                .pop_front()
                .map(|response| (vec![response], true))
                .ok_or_else(|| "mock provider has no scripted responses left".to_string()),
            Script::Fail(error) => Err(error.clone()),
            Script::Truncate(chunks) => Ok((chunks.clone(), false)),
        }
    }

    fn emit_tokens(&self, run_id: u64, chunk: &str, emit: &mut dyn FnMut(RunEvent)) {
        let mut pending_token = String::new();
        for ch in chunk.chars() {
            pending_token.push(ch);

            if matches!(ch, ' ' | '\n') {
                emit(RunEvent::Chunk {
                    run_id,
                    text: std::mem::take(&mut pending_token),
                });
                self.pause();
            }
        }

        if !pending_token.is_empty() {
            emit(RunEvent::Chunk {
                run_id,
                text: pending_token,
            });
            self.pause();
        }
    }

    fn pause(&self) {
        if !self.token_delay.is_zero() {
            thread::sleep(self.token_delay);
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(vec![
            "{\n".to_string(),
            "  \"files\": [\n".to_string(),
            "    {\n".to_string(),
            "      \"path\": \"index.html\",\n".to_string(),
            "      \"content\": \"<!DOCTYPE html>\\n<html>\\n<head>\\n  <title>Hello</title>\\n  <link rel=\\\"stylesheet\\\" href=\\\"style.css\\\">\\n</head>\\n<body>\\n  <h1>Hello from the mock model</h1>\\n</body>\\n</html>\\n\"\n".to_string(),
            "    },\n".to_string(),
            "    {\n".to_string(),
            "      \"path\": \"style.css\",\n".to_string(),
            "      \"content\": \"body {\\n  font-family: sans-serif;\\n}\\n\"\n".to_string(),
            "    }\n".to_string(),
            "  ],\n".to_string(),
            "  \"patches\": [],\n".to_string(),
            "  \"commands\": []\n".to_string(),
            "}\n".to_string(),
        ])
    }
}

impl RunProvider for MockProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: MOCK_MODEL_ID.to_string(),
        }
    }

    fn run(&self, req: RunRequest, emit: &mut dyn FnMut(RunEvent)) -> Result<(), String> {
        let run_id = req.run_id;
        lock_unpoisoned(&self.observed).push(req);

        emit(RunEvent::Started { run_id });

        let (chunks, finishes) = match self.next_response() {
            Ok(response) => response,
            Err(error) => {
                emit(RunEvent::Failed { run_id, error });
                return Ok(());
            }
        };

        for chunk in &chunks {
            self.emit_tokens(run_id, chunk, emit);
        }

        if finishes {
            emit(RunEvent::Finished { run_id });
        }

        Ok(())
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
