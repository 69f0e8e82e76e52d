#![allow(dead_code)]

use std::sync::Arc;

use agent_provider::RunProvider;
use agent_provider_mock::MockProvider;
use coding_agent::{CommandRunner, ProjectRegistry, TurnEvent, TurnOrchestrator, TurnState};
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    pub registry: ProjectRegistry,
    pub provider: Arc<MockProvider>,
    pub orchestrator: TurnOrchestrator,
}

impl Harness {
    pub fn new(provider: MockProvider) -> Self {
        Self::with_commands(provider, Some(CommandRunner::default()))
    }

    pub fn with_commands(provider: MockProvider, commands: Option<CommandRunner>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let registry = ProjectRegistry::new(dir.path().join("projects"));
        let provider = Arc::new(provider);
        let orchestrator = TurnOrchestrator::new(Arc::clone(&provider) as Arc<dyn RunProvider>)
            .with_command_runner(commands);

        Self {
            dir,
            registry,
            provider,
            orchestrator,
        }
    }

    pub fn create_project(&self) -> String {
        self.registry
            .create(Some("test site"))
            .expect("project should be created")
    }

    pub fn seed_file(&self, project_id: &str, path: &str, content: &str) {
        let project = self.registry.get(project_id).expect("project is resident");
        let mut project = project.lock().expect("project lock");
        project
            .workspace_mut()
            .put_file(path, content)
            .expect("seed file should be written");
    }

    pub fn run(&self, project_id: &str, prompt: &str) -> (TurnState, Vec<TurnEvent>) {
        let mut events = Vec::new();
        let state = self
            .orchestrator
            .run_turn_for(&self.registry, project_id, prompt, &mut |event| {
                events.push(event)
            });
        (state, events)
    }

    pub fn disk(&self, project_id: &str, path: &str) -> String {
        std::fs::read_to_string(self.registry.projects_root().join(project_id).join(path))
            .expect("file should exist on disk")
    }

    pub fn conversation_len(&self, project_id: &str) -> usize {
        let project = self.registry.get(project_id).expect("project is resident");
        let project = project.lock().expect("project lock");
        project.conversation().len()
    }
}

pub fn responding(response: &str) -> MockProvider {
    MockProvider::new(vec![response.to_string()])
}

/// Event names with consecutive `partial` events collapsed into one.
pub fn event_names(events: &[TurnEvent]) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = Vec::new();
    for event in events {
        let name = event.event_name();
        if name == "partial" && names.last() == Some(&"partial") {
            continue;
        }
        names.push(name);
    }
    names
}

pub fn partial_text(events: &[TurnEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            TurnEvent::Partial { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

pub fn errors(events: &[TurnEvent]) -> Vec<(coding_agent::ErrorKind, bool)> {
    events
        .iter()
        .filter_map(|event| match event {
            TurnEvent::Error { kind, fatal, .. } => Some((*kind, *fatal)),
            _ => None,
        })
        .collect()
}
