use anyhow::Context;
use coding_agent::{providers, ProjectRegistry, TurnOrchestrator};
use prompt_forge::{logging, server, AppState, ServerConfig};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;
    logging::init(&config)?;

    let provider = providers::provider_from_env().map_err(anyhow::Error::msg)?;
    let orchestrator =
        TurnOrchestrator::new(provider).with_command_runner(config.command_runner());
    let state = AppState::new(ProjectRegistry::new(config.projects_root.clone()), orchestrator);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        projects_root = %config.projects_root.display(),
        commands_enabled = config.commands_enabled,
        "prompt-forge listening"
    );

    server::serve(listener, state, server::shutdown_signal()).await
}
