//! Process-wide registry of resident projects.
//!
//! Projects are inserted on create or load and never evicted. Each resident
//! project sits behind its own mutex so turns against one project serialize while
//! turns against different projects run in parallel.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use apply_patch_engine::{Workspace, WorkspaceError};
use conversation_store::ConversationLog;
use serde::Serialize;
use thiserror::Error;

const PROJECT_ID_SUFFIX_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid project id '{id}'")]
    InvalidProjectId { id: String },

    #[error("project folder not found for '{id}'")]
    NotFound { id: String },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One resident project: its file tree and its prompt history.
#[derive(Debug)]
pub struct Project {
    id: String,
    workspace: Workspace,
    conversation: ConversationLog,
}

impl Project {
    pub fn new(id: impl Into<String>, workspace: Workspace) -> Self {
        Self {
            id: id.into(),
            workspace,
            conversation: ConversationLog::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }

    pub fn conversation(&self) -> &ConversationLog {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut ConversationLog {
        &mut self.conversation
    }
}

pub type SharedProject = Arc<Mutex<Project>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListing {
    pub project_id: String,
    pub in_memory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOutcome {
    pub project_id: String,
    /// True when the project was already resident and nothing was read.
    pub already_resident: bool,
    pub files: Vec<String>,
}

#[derive(Debug)]
pub struct ProjectRegistry {
    projects_root: PathBuf,
    projects: Mutex<BTreeMap<String, SharedProject>>,
}

impl ProjectRegistry {
    pub fn new(projects_root: impl Into<PathBuf>) -> Self {
        Self {
            projects_root: projects_root.into(),
            projects: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn projects_root(&self) -> &Path {
        &self.projects_root
    }

    /// Creates the project directory and makes the project resident.
    pub fn create(&self, name: Option<&str>) -> Result<String, RegistryError> {
        let id = generate_project_id(name);
        let workspace = Workspace::materialize(self.projects_root.join(&id))?;

        lock_unpoisoned(&self.projects).insert(
            id.clone(),
            Arc::new(Mutex::new(Project::new(id.clone(), workspace))),
        );
        tracing::info!(project_id = %id, "project created");
        Ok(id)
    }

    /// Rehydrates a project from disk unless it is already resident.
    pub fn load(&self, id: &str) -> Result<LoadOutcome, RegistryError> {
        validate_project_id(id)?;

        if let Some(project) = self.get(id) {
            let files = paths_of(&lock_unpoisoned(&project));
            return Ok(LoadOutcome {
                project_id: id.to_string(),
                already_resident: true,
                files,
            });
        }

        let root = self.projects_root.join(id);
        if !root.is_dir() {
            return Err(RegistryError::NotFound { id: id.to_string() });
        }

        let project = Project::new(id, Workspace::load_from_disk(&root)?);
        let files = paths_of(&project);

        // A concurrent load may have won the race; keep the first resident copy.
        let mut projects = lock_unpoisoned(&self.projects);
        let already_resident = projects.contains_key(id);
        if !already_resident {
            projects.insert(id.to_string(), Arc::new(Mutex::new(project)));
            tracing::info!(project_id = %id, files = files.len(), "project loaded from disk");
        }

        Ok(LoadOutcome {
            project_id: id.to_string(),
            already_resident,
            files,
        })
    }

    pub fn get(&self, id: &str) -> Option<SharedProject> {
        lock_unpoisoned(&self.projects).get(id).cloned()
    }

    pub fn is_resident(&self, id: &str) -> bool {
        lock_unpoisoned(&self.projects).contains_key(id)
    }

    /// Project folders on disk, plus any resident project, sorted by id.
    pub fn list(&self) -> Result<Vec<ProjectListing>, RegistryError> {
        let mut ids: Vec<String> = lock_unpoisoned(&self.projects).keys().cloned().collect();

        match fs::read_dir(&self.projects_root) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry.map_err(|source| RegistryError::Io {
                        operation: "listing projects",
                        path: self.projects_root.clone(),
                        source,
                    })?;
                    let is_dir = entry.file_type().is_ok_and(|kind| kind.is_dir());
                    if is_dir {
                        ids.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(RegistryError::Io {
                    operation: "listing projects",
                    path: self.projects_root.clone(),
                    source,
                })
            }
        }

        ids.sort();
        ids.dedup();

        let resident = lock_unpoisoned(&self.projects);
        Ok(ids
            .into_iter()
            .map(|project_id| ProjectListing {
                in_memory: resident.contains_key(&project_id),
                project_id,
            })
            .collect())
    }
}

/// `<name>_<suffix>` where whitespace runs in `name` become `_` and other characters
/// outside `[A-Za-z0-9_-]` are dropped; `project_<suffix>` when nothing remains.
pub fn generate_project_id(name: Option<&str>) -> String {
    let base = name.map(sanitize_project_name).unwrap_or_default();
    let base = if base.is_empty() {
        "project".to_string()
    } else {
        base
    };

    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(PROJECT_ID_SUFFIX_LEN)
        .collect();
    format!("{base}_{suffix}")
}

fn sanitize_project_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut in_whitespace = false;

    for ch in name.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                sanitized.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            sanitized.push(ch);
        }
    }

    sanitized
}

/// A project id names exactly one directory below the projects root.
pub fn validate_project_id(id: &str) -> Result<(), RegistryError> {
    let valid = !id.trim().is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
        && !Path::new(id).is_absolute();

    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidProjectId { id: id.to_string() })
    }
}

fn paths_of(project: &Project) -> Vec<String> {
    project
        .workspace()
        .paths()
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Locks `mutex`, recovering the guard if a previous holder panicked.
pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffix_of(id: &str) -> &str {
        id.rsplit('_').next().expect("id has a suffix")
    }

    #[test]
    fn generated_ids_sanitize_names() {
        let id = generate_project_id(Some("  My Cool   Site! v2"));
        assert!(id.starts_with("_My_Cool_Site_v2_"), "unexpected id {id}");

        let suffix = suffix_of(&id);
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn generated_ids_fall_back_to_project_prefix() {
        assert!(generate_project_id(None).starts_with("project_"));
        assert!(generate_project_id(Some("")).starts_with("project_"));
        assert!(generate_project_id(Some("!!!")).starts_with("project_"));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(generate_project_id(Some("a")), generate_project_id(Some("a")));
    }

    #[test]
    fn project_ids_must_name_a_single_directory() {
        for id in ["", " ", ".", "..", "a/b", "..\\x", "/abs"] {
            assert!(
                matches!(
                    validate_project_id(id),
                    Err(RegistryError::InvalidProjectId { .. })
                ),
                "id {id:?} should be rejected"
            );
        }
        validate_project_id("site_0123456789ab").expect("generated ids are valid");
    }

    #[test]
    fn create_then_list_marks_project_resident() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = ProjectRegistry::new(dir.path());
        std::fs::create_dir(dir.path().join("old_project")).expect("seed folder");
        std::fs::write(dir.path().join("stray-file.txt"), "").expect("seed file");

        let id = registry.create(Some("demo")).expect("create");
        assert!(dir.path().join(&id).is_dir());

        let listing = registry.list().expect("list");
        assert_eq!(
            listing,
            vec![
                ProjectListing {
                    project_id: id.clone(),
                    in_memory: true
                },
                ProjectListing {
                    project_id: "old_project".to_string(),
                    in_memory: false
                },
            ]
        );
    }

    #[test]
    fn list_of_missing_root_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = ProjectRegistry::new(dir.path().join("not-created-yet"));
        assert!(registry.list().expect("list").is_empty());
    }

    #[test]
    fn load_reads_files_once_and_reports_residency() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("site");
        std::fs::create_dir_all(root.join("css")).expect("mkdir");
        std::fs::write(root.join("index.html"), "<h1>x</h1>").expect("seed");
        std::fs::write(root.join("css/site.css"), "body{}").expect("seed");
        let registry = ProjectRegistry::new(dir.path());

        let first = registry.load("site").expect("first load");
        assert!(!first.already_resident);
        assert_eq!(first.files, vec!["css/site.css", "index.html"]);

        std::fs::write(root.join("late.txt"), "ignored").expect("seed");
        let second = registry.load("site").expect("second load");
        assert!(second.already_resident);
        assert_eq!(second.files, first.files);
        assert!(registry.is_resident("site"));
    }

    #[test]
    fn load_of_missing_folder_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = ProjectRegistry::new(dir.path());

        assert!(matches!(
            registry.load("ghost"),
            Err(RegistryError::NotFound { .. })
        ));
        assert!(matches!(
            registry.load("../etc"),
            Err(RegistryError::InvalidProjectId { .. })
        ));
    }

    #[test]
    fn poisoned_project_lock_is_recovered() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = ProjectRegistry::new(dir.path());
        let id = registry.create(Some("poison")).expect("create");
        let project = registry.get(&id).expect("resident");

        let holder = Arc::clone(&project);
        let panicked = std::thread::spawn(move || {
            let _guard = holder.lock().expect("first lock");
            panic!("turn panicked while holding the project");
        })
        .join();
        assert!(panicked.is_err());
        assert!(project.is_poisoned());

        let guard = lock_unpoisoned(&project);
        assert_eq!(guard.id(), id);
    }
}
