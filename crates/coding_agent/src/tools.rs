use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use wait_timeout::ChildExt;

use crate::commands::split_command_line;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command is empty")]
    EmptyCommand,

    #[error("failed to launch '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command exited with {}", format_exit_code(.exit_code))]
    CommandFailed { exit_code: Option<i32> },

    #[error("command timed out after {}s", .timeout.as_secs())]
    TimedOut { timeout: Duration },

    #[error("failed waiting for command: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { exit_code } => *exit_code,
            _ => None,
        }
    }
}

/// Runs one command line in a project directory, streaming its output.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Spawns the command with stdin closed and forwards each output line to `on_line`
    /// as it arrives. Stdout and stderr lines interleave in arrival order.
    pub fn run(
        &self,
        command_line: &str,
        cwd: &Path,
        on_line: &mut dyn FnMut(OutputLine),
    ) -> Result<(), CommandError> {
        let command = split_command_line(command_line).ok_or(CommandError::EmptyCommand)?;
        // A timeout too large to represent as an instant means no deadline.
        let deadline = Instant::now().checked_add(self.timeout);

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::SpawnFailed {
                program: command.program.clone(),
                source,
            })?;
        tracing::info!(command = %command_line, pid = child.id(), "command started");

        let (sender, receiver) = mpsc::channel();
        spawn_line_reader(child.stdout.take(), OutputStream::Stdout, sender.clone());
        spawn_line_reader(child.stderr.take(), OutputStream::Stderr, sender);

        loop {
            let received = match deadline {
                Some(deadline) => {
                    receiver.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => receiver
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(line) => on_line(line),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => return Err(self.kill_timed_out(&mut child)),
            }
        }

        let waited = match deadline {
            Some(deadline) => {
                child.wait_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => child.wait().map(Some),
        };
        let status = match waited {
            Ok(Some(status)) => status,
            Ok(None) => return Err(self.kill_timed_out(&mut child)),
            Err(source) => {
                let _ = child.kill();
                return Err(CommandError::Wait { source });
            }
        };

        tracing::info!(command = %command_line, status = %format_exit_status(status), "command finished");
        if status.success() {
            Ok(())
        } else {
            Err(CommandError::CommandFailed {
                exit_code: status.code(),
            })
        }
    }

    fn kill_timed_out(&self, child: &mut Child) -> CommandError {
        let _ = child.kill();
        let _ = child.wait();
        tracing::warn!(timeout_sec = self.timeout.as_secs(), "command timed out and was killed");
        CommandError::TimedOut {
            timeout: self.timeout,
        }
    }
}

fn spawn_line_reader(
    pipe: Option<impl Read + Send + 'static>,
    stream: OutputStream,
    sender: Sender<OutputLine>,
) {
    let Some(pipe) = pipe else {
        return;
    };

    thread::spawn(move || {
        for chunk in BufReader::new(pipe).split(b'\n') {
            let Ok(mut bytes) = chunk else {
                break;
            };
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
            let line = OutputLine {
                stream,
                text: String::from_utf8_lossy(&bytes).into_owned(),
            };
            if sender.send(line).is_err() {
                break;
            }
        }
    });
}

fn format_exit_code(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

fn format_exit_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit_code={code}"),
        None => "exit_code=terminated_by_signal".to_string(),
    }
}
