//! HTTP surface: project management routes plus the SSE turn stream.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use coding_agent::{
    lock_unpoisoned, ProjectListing, ProjectRegistry, RegistryError, TurnEvent, TurnOrchestrator,
};
use conversation_store::ConversationEntry;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

#[derive(Clone)]
pub struct AppState {
    registry: Arc<ProjectRegistry>,
    orchestrator: Arc<TurnOrchestrator>,
}

impl AppState {
    pub fn new(registry: ProjectRegistry, orchestrator: TurnOrchestrator) -> Self {
        Self {
            registry: Arc::new(registry),
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProjectInput {
    #[serde(default)]
    project_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadProjectInput {
    project_id: String,
}

/// Missing fields reach the orchestrator as empty strings and fail the turn on the stream.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UpdateProjectInput {
    project_id: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadProjectOutput {
    project_id: String,
    status: &'static str,
    files: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversationOutput {
    project_id: String,
    entries: Vec<ConversationEntry>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        let status = match &error {
            RegistryError::InvalidProjectId { .. } => StatusCode::BAD_REQUEST,
            RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
            RegistryError::Workspace(_) | RegistryError::Io { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = %self.status, error = %self.message, "request failed");
        }
        (
            self.status,
            Json(ErrorEnvelope {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// API routes, plus the generated projects served read-only under `/projects`.
pub fn app_router(state: AppState) -> Router {
    // Its own router, so the static tree never collides with the conversation route.
    let preview = Router::new().nest_service(
        "/projects",
        ServeDir::new(state.registry.projects_root()),
    );

    Router::new()
        .route("/health", get(health))
        .route("/create-project", post(create_project))
        .route("/load-project", post(load_project))
        .route("/list-projects", get(list_projects))
        .route("/projects/:project_id/conversation", get(conversation))
        .route("/update-project", post(update_project))
        .with_state(state)
        .fallback_service(preview)
        .layer(CorsLayer::permissive())
}

/// Serves until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

async fn health() -> Json<Value> {
    Json(json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<CreateProjectInput>,
) -> Result<Json<Value>, ApiError> {
    let project_id = blocking(move || {
        state
            .registry
            .create(input.project_name.as_deref())
            .map_err(ApiError::from)
    })
    .await?;
    Ok(Json(json!({ "projectId": project_id })))
}

async fn load_project(
    State(state): State<AppState>,
    Json(input): Json<LoadProjectInput>,
) -> Result<Json<LoadProjectOutput>, ApiError> {
    let outcome = blocking(move || {
        state
            .registry
            .load(&input.project_id)
            .map_err(ApiError::from)
    })
    .await?;

    Ok(Json(LoadProjectOutput {
        status: if outcome.already_resident {
            "already-loaded"
        } else {
            "loaded"
        },
        project_id: outcome.project_id,
        files: outcome.files,
    }))
}

async fn list_projects(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let projects: Vec<ProjectListing> =
        blocking(move || state.registry.list().map_err(ApiError::from)).await?;
    Ok(Json(json!({ "projects": projects })))
}

async fn conversation(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<ConversationOutput>, ApiError> {
    // Waits for any running turn on the project to release its lock.
    blocking(move || {
        let project = state.registry.get(&project_id).ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                format!("project '{project_id}' is not loaded"),
            )
        })?;
        let project = lock_unpoisoned(&project);
        Ok(Json(ConversationOutput {
            entries: project.conversation().entries().to_vec(),
            project_id,
        }))
    })
    .await
}

async fn update_project(
    State(state): State<AppState>,
    Json(input): Json<UpdateProjectInput>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel::<TurnEvent>();

    tracing::info!(project_id = %input.project_id, "turn requested");
    tokio::task::spawn_blocking(move || {
        let mut emit = |event: TurnEvent| {
            // The client may have gone away; the turn still completes.
            let _ = tx.send(event);
        };
        state
            .orchestrator
            .run_turn_for(&state.registry, &input.project_id, &input.prompt, &mut emit);
    });

    let events = UnboundedReceiverStream::new(rx).map(|event| Ok(sse_event(&event)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn sse_event(event: &TurnEvent) -> Event {
    Event::default()
        .event(event.event_name())
        .data(event.payload().to_string())
}

async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|error| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("worker task failed: {error}"),
        )
    })?
}
