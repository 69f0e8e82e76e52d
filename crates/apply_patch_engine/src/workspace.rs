use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::instruction::PatchInstruction;
use crate::line_store::{LineError, LineStore, Replacement};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("cannot patch unknown file '{path}'")]
    UnknownFile { path: String },

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of applying one patch entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchReport {
    pub path: String,
    /// Instructions that changed the line (`NotFound` and `OutOfRange` do not count).
    pub applied: usize,
    pub warnings: Vec<PatchWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchWarning {
    /// Position of the instruction within the patch entry.
    pub index: usize,
    pub line_number: usize,
    pub kind: PatchWarningKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PatchWarningKind {
    NotFound,
    OutOfRange,
}

/// In-memory file tree for one project, written through to `root`.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    files: BTreeMap<String, LineStore>,
}

impl Workspace {
    /// Creates the project directory (idempotent) with no known files.
    pub fn materialize(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| WorkspaceError::Io {
            operation: "creating project directory",
            path: root.clone(),
            source,
        })?;

        Ok(Self {
            root,
            files: BTreeMap::new(),
        })
    }

    /// Reads every regular file below `root` into memory. Symlinks are skipped.
    pub fn load_from_disk(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        let mut files = BTreeMap::new();

        for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|error| {
                let path = error
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.clone());
                WorkspaceError::Io {
                    operation: "walking project directory",
                    path,
                    source: error.into(),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(key) = relative_key(&root, entry.path()) else {
                continue;
            };
            let bytes = fs::read(entry.path()).map_err(|source| WorkspaceError::Io {
                operation: "reading project file",
                path: entry.path().to_path_buf(),
                source,
            })?;
            files.insert(key, LineStore::from_text(&String::from_utf8_lossy(&bytes)));
        }

        tracing::debug!(root = %root.display(), files = files.len(), "loaded workspace from disk");
        Ok(Self { root, files })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Known paths in sorted order.
    pub fn paths(&self) -> Vec<&str> {
        self.files.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        normalize_relative_path(path).is_ok_and(|key| self.files.contains_key(&key))
    }

    pub fn read(&self, path: &str) -> Option<String> {
        let key = normalize_relative_path(path).ok()?;
        self.files.get(&key).map(LineStore::to_text)
    }

    /// Create-or-overwrite. Returns the canonical key the file is stored under.
    pub fn put_file(&mut self, path: &str, content: &str) -> Result<String, WorkspaceError> {
        let key = normalize_relative_path(path)?;
        let store = LineStore::from_text(content);
        self.write_through(&key, &store)?;

        tracing::debug!(path = %key, bytes = content.len(), "file written");
        self.files.insert(key.clone(), store);
        Ok(key)
    }

    /// Applies line instructions in order to a known file and writes the result.
    pub fn patch_file(
        &mut self,
        path: &str,
        instructions: &[PatchInstruction],
    ) -> Result<PatchReport, WorkspaceError> {
        let key = normalize_relative_path(path)?;
        let Some(current) = self.files.get(&key) else {
            return Err(WorkspaceError::UnknownFile { path: key });
        };

        let mut updated = current.clone();
        let mut applied = 0;
        let mut warnings = Vec::new();

        for (index, instruction) in instructions.iter().enumerate() {
            let line_number = instruction.line_number;
            match updated.replace_line(line_number, &instruction.old_text, &instruction.new_text) {
                Ok(Replacement::Applied) => applied += 1,
                Ok(Replacement::NotFound) => warnings.push(PatchWarning {
                    index,
                    line_number,
                    kind: PatchWarningKind::NotFound,
                    message: format!(
                        "oldText not found in line {line_number} of {key}; line left unchanged"
                    ),
                }),
                Err(error @ LineError::OutOfRange { .. }) => warnings.push(PatchWarning {
                    index,
                    line_number,
                    kind: PatchWarningKind::OutOfRange,
                    message: format!("{error} in {key}"),
                }),
            }
        }

        self.write_through(&key, &updated)?;
        tracing::debug!(
            path = %key,
            applied,
            warnings = warnings.len(),
            "file patched"
        );
        self.files.insert(key.clone(), updated);

        Ok(PatchReport {
            path: key,
            applied,
            warnings,
        })
    }

    /// Renders every known file with 1-based line numbers, sorted by path.
    pub fn file_context(&self) -> String {
        let mut context = String::from("Here are the current files with line numbers:\n\n");
        for (path, store) in &self.files {
            let _ = writeln!(context, "File: {path}");
            for (index, line) in store.lines().enumerate() {
                let _ = writeln!(context, "{}: {line}", index + 1);
            }
            context.push('\n');
        }
        context
    }

    fn write_through(&self, key: &str, store: &LineStore) -> Result<(), WorkspaceError> {
        let target = self.root.join(key);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| WorkspaceError::Io {
                operation: "creating parent directory",
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(&target, store.to_text()).map_err(|source| WorkspaceError::Io {
            operation: "writing project file",
            path: target,
            source,
        })
    }
}

/// Canonicalizes a model-supplied relative path to its `/`-separated key.
///
/// Backslashes become `/`, empty and `.` segments are dropped. Absolute paths and
/// any `..` segment are rejected so writes stay inside the project root.
pub fn normalize_relative_path(path: &str) -> Result<String, WorkspaceError> {
    let invalid = |reason| WorkspaceError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    let unified = path.replace('\\', "/");
    if unified.trim().is_empty() {
        return Err(invalid("path is empty"));
    }
    if unified.starts_with('/') || Path::new(path).is_absolute() || has_drive_prefix(&unified) {
        return Err(invalid("path must be relative"));
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(invalid("path must not contain '..'")),
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(invalid("path does not name a file"));
    }
    Ok(segments.join("/"))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}
