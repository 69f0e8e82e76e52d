//! Tracing subscriber bootstrap for the server binary.

use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

const DEFAULT_FILTER: &str = "info";

/// Installs the global fmt subscriber. Calling it again is a no-op.
pub fn init(config: &ServerConfig) -> anyhow::Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = env_filter(config.log_filter.as_deref());
    let installed = if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };

    // Losing a race with another initializer is fine.
    if let Err(error) = installed {
        if !tracing::dispatcher::has_been_set() {
            return Err(anyhow::anyhow!("failed to install tracing subscriber: {error}"));
        }
    }
    Ok(())
}

/// `RUST_LOG`, then `FORGE_LOG`, then `info`.
fn env_filter(fallback: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback.unwrap_or(DEFAULT_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::init;
    use crate::config::ServerConfig;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".parse().expect("socket address"),
            projects_root: PathBuf::from("projects"),
            commands_enabled: false,
            command_timeout: Duration::from_secs(1),
            log_filter: Some("not a [valid filter".to_string()),
            log_json: false,
        }
    }

    #[test]
    fn init_is_idempotent() {
        init(&config()).expect("first init succeeds");
        init(&config()).expect("second init is a no-op");
        tracing::info!("logging initialized twice");
    }
}
