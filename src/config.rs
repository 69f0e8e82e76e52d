//! Environment configuration.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use coding_agent::CommandRunner;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_PROJECTS_ROOT: &str = "./projects";
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub projects_root: PathBuf,
    pub commands_enabled: bool,
    pub command_timeout: Duration,
    /// `FORGE_LOG`; `RUST_LOG` still wins when set.
    pub log_filter: Option<String>,
    pub log_json: bool,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = env_string_opt("FORGE_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("FORGE_BIND_ADDR is not a socket address: {bind_addr}"))?;

        let command_timeout = match env_string_opt("FORGE_COMMAND_TIMEOUT_SEC") {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().ok().filter(|secs| *secs > 0);
                let secs = secs.with_context(|| {
                    format!("FORGE_COMMAND_TIMEOUT_SEC must be a positive integer, got '{raw}'")
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        };

        Ok(Self {
            bind_addr,
            projects_root: env_string_opt("FORGE_PROJECTS_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROJECTS_ROOT)),
            commands_enabled: !env_flag("FORGE_DISABLE_COMMANDS"),
            command_timeout,
            log_filter: env_string_opt("FORGE_LOG"),
            log_json: env_flag("FORGE_LOG_JSON"),
        })
    }

    /// `None` when command execution is disabled.
    pub fn command_runner(&self) -> Option<CommandRunner> {
        self.commands_enabled
            .then(|| CommandRunner::new(self.command_timeout))
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
