use std::net::SocketAddr;

use agent_provider_mock::MockProvider;
use coding_agent::{ProjectRegistry, TurnOrchestrator};
use prompt_forge::{app_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

const SITE_RESPONSE: &str =
    r#"{"files":[{"path":"index.html","content":"<h1>Hello</h1>"}],"commands":["npm install"]}"#;

struct TestServer {
    dir: TempDir,
    base: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(provider: MockProvider) -> Self {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        Self::start_in(dir, provider).await
    }

    async fn start_in(dir: TempDir, provider: MockProvider) -> Self {
        let registry = ProjectRegistry::new(dir.path().join("projects"));
        let orchestrator = TurnOrchestrator::new(Arc::new(provider)).with_command_runner(None);
        let state = AppState::new(registry, orchestrator);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr: SocketAddr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app_router(state))
                .await
                .expect("server should run");
        });

        Self {
            dir,
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .expect("request should complete")
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .expect("request should complete")
    }

    async fn create_project(&self, name: &str) -> String {
        let body: Value = self
            .post("/create-project", json!({ "projectName": name }))
            .await
            .json()
            .await
            .expect("create response is JSON");
        body["projectId"]
            .as_str()
            .expect("projectId is a string")
            .to_string()
    }

    /// Posts a prompt and collects the whole SSE stream as `(event, data)` pairs.
    async fn update(&self, project_id: &str, prompt: &str) -> Vec<(String, Value)> {
        let response = self
            .post(
                "/update-project",
                json!({ "projectId": project_id, "prompt": prompt }),
            )
            .await;
        assert_eq!(response.status(), 200);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("text/event-stream"), "{content_type}");

        let body = response.text().await.expect("stream body");
        parse_sse(&body)
    }
}

fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|frame| {
            let mut name = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    name = Some(value.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data = Some(value.trim().to_string());
                }
            }
            let data = serde_json::from_str(&data?).expect("event data is JSON");
            Some((name?, data))
        })
        .collect()
}

#[tokio::test]
async fn health_reports_version() {
    let server = TestServer::start(MockProvider::default()).await;

    let body: Value = server.get("/health").await.json().await.expect("JSON");
    assert_eq!(body["healthy"], true);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn created_project_is_listed_and_resident() {
    let server = TestServer::start(MockProvider::default()).await;
    let project_id = server.create_project("My Site").await;
    assert!(project_id.starts_with("My_Site_"), "{project_id}");
    assert!(server.dir.path().join("projects").join(&project_id).is_dir());

    let listing: Value = server.get("/list-projects").await.json().await.expect("JSON");
    assert_eq!(
        listing,
        json!({ "projects": [{ "projectId": project_id, "inMemory": true }] })
    );

    let conversation: Value = server
        .get(&format!("/projects/{project_id}/conversation"))
        .await
        .json()
        .await
        .expect("JSON");
    let entries = conversation["entries"].as_array().expect("entries array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["role"], "system");
}

#[tokio::test]
async fn update_streams_events_and_applies_files() {
    let server = TestServer::start(MockProvider::new(vec![SITE_RESPONSE.to_string()])).await;
    let project_id = server.create_project("site").await;

    let events = server.update(&project_id, "build a hello page").await;
    let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();

    assert_eq!(names.first(), Some(&"status"));
    assert!(names.contains(&"partial"));
    assert_eq!(names.last(), Some(&"done"));
    let written = events
        .iter()
        .find(|(name, _)| name == "file-written")
        .expect("file-written event");
    assert_eq!(written.1, json!({ "path": "index.html" }));
    assert!(events.iter().any(|(name, data)| name == "status"
        && data["status"] == "Command execution is disabled; skipped 1 command(s)"));
    assert_eq!(events.last().map(|(_, data)| data.clone()), Some(json!({ "projectId": project_id })));

    let html = std::fs::read_to_string(
        server
            .dir
            .path()
            .join("projects")
            .join(&project_id)
            .join("index.html"),
    )
    .expect("index.html written");
    assert_eq!(html, "<h1>Hello</h1>");

    let conversation: Value = server
        .get(&format!("/projects/{project_id}/conversation"))
        .await
        .json()
        .await
        .expect("JSON");
    let roles: Vec<&str> = conversation["entries"]
        .as_array()
        .expect("entries array")
        .iter()
        .map(|entry| entry["role"].as_str().expect("role"))
        .collect();
    assert_eq!(roles, vec!["system", "user", "assistant"]);
}

#[tokio::test]
async fn update_for_unknown_project_streams_a_fatal_error() {
    let server = TestServer::start(MockProvider::default()).await;

    let events = server.update("never_created", "hello").await;

    assert_eq!(events.len(), 1);
    let (name, data) = &events[0];
    assert_eq!(name, "error");
    assert_eq!(data["kind"], "InvalidInput");
    assert_eq!(data["fatal"], true);
}

#[tokio::test]
async fn malformed_model_output_streams_error_without_done() {
    let server =
        TestServer::start(MockProvider::new(vec!["definitely not json".to_string()])).await;
    let project_id = server.create_project("site").await;

    let events = server.update(&project_id, "hello").await;

    let (name, data) = events.last().expect("at least one event");
    assert_eq!(name, "error");
    assert_eq!(data["kind"], "MalformedResponse");
    assert!(!events.iter().any(|(name, _)| name == "done"));
}

#[tokio::test]
async fn load_rehydrates_projects_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let project_dir = dir.path().join("projects").join("existing_site");
    std::fs::create_dir_all(project_dir.join("css")).expect("project dir");
    std::fs::write(project_dir.join("index.html"), "<p>hi</p>").expect("seed html");
    std::fs::write(project_dir.join("css/site.css"), "p {}").expect("seed css");

    let server = TestServer::start_in(dir, MockProvider::default()).await;

    let listing: Value = server.get("/list-projects").await.json().await.expect("JSON");
    assert_eq!(listing["projects"][0]["inMemory"], false);

    let first: Value = server
        .post("/load-project", json!({ "projectId": "existing_site" }))
        .await
        .json()
        .await
        .expect("JSON");
    assert_eq!(
        first,
        json!({
            "projectId": "existing_site",
            "status": "loaded",
            "files": ["css/site.css", "index.html"]
        })
    );

    let second: Value = server
        .post("/load-project", json!({ "projectId": "existing_site" }))
        .await
        .json()
        .await
        .expect("JSON");
    assert_eq!(second["status"], "already-loaded");
}

#[tokio::test]
async fn load_rejects_missing_and_invalid_ids() {
    let server = TestServer::start(MockProvider::default()).await;

    let missing = server
        .post("/load-project", json!({ "projectId": "nope" }))
        .await;
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.expect("JSON");
    assert!(body["error"].as_str().expect("error").contains("nope"));

    let invalid = server
        .post("/load-project", json!({ "projectId": "../etc" }))
        .await;
    assert_eq!(invalid.status(), 400);

    let conversation = server.get("/projects/nope/conversation").await;
    assert_eq!(conversation.status(), 404);
}

#[tokio::test]
async fn update_without_prompt_streams_invalid_input() {
    let server = TestServer::start(MockProvider::default()).await;
    let project_id = server.create_project("site").await;

    let response = server
        .post("/update-project", json!({ "projectId": project_id }))
        .await;
    assert_eq!(response.status(), 200);
    let events = parse_sse(&response.text().await.expect("stream body"));

    assert_eq!(events.len(), 1);
    let (name, data) = &events[0];
    assert_eq!(name, "error");
    assert_eq!(data["kind"], "InvalidInput");
    assert_eq!(data["fatal"], true);

    let events = server.update("", "hello").await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1["kind"], "InvalidInput");
}

#[tokio::test]
async fn generated_files_are_served_for_preview() {
    let server = TestServer::start(MockProvider::new(vec![SITE_RESPONSE.to_string()])).await;
    let project_id = server.create_project("site").await;
    server.update(&project_id, "build a hello page").await;

    let page = server.get(&format!("/projects/{project_id}/index.html")).await;
    assert_eq!(page.status(), 200);
    assert_eq!(page.text().await.expect("page body"), "<h1>Hello</h1>");

    let missing = server.get(&format!("/projects/{project_id}/nope.html")).await;
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn cross_origin_requests_are_allowed() {
    let server = TestServer::start(MockProvider::default()).await;

    let response = server
        .client
        .get(format!("{}/health", server.base))
        .header("Origin", "http://localhost:5173")
        .send()
        .await
        .expect("request should complete");

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok()),
        Some("*")
    );
}
