use std::path::{Component, Path, PathBuf};

use path_clean::PathClean;

use crate::error::AgentError;

/// Directory (relative to the project root) holding local backups.
pub const BACKUP_DIR: &str = ".patch-backups";

const FORBIDDEN_DIRS: &[&str] = &[".git", "node_modules", BACKUP_DIR];

/// Package-manager lock files, regenerated by installs and never hand-edited.
pub const LOCK_FILES: &[&str] = &["package-lock.json", "pnpm-lock.yaml", "yarn.lock"];

/// Guards the working tree against paths a patch must never touch.
#[derive(Debug, Clone, Default)]
pub struct PathProtection {
    extra_forbidden_files: Vec<PathBuf>,
}

impl PathProtection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also refuse these exact relative paths.
    pub fn with_forbidden_files(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.extra_forbidden_files.extend(files);
        self
    }

    /// Check `path` and return its cleaned relative form.
    pub fn validate(&self, path: &str) -> Result<PathBuf, AgentError> {
        let raw = Path::new(path);
        for component in raw.components() {
            match component {
                Component::RootDir | Component::Prefix(_) => {
                    return Err(AgentError::InvalidPatch(format!(
                        "Absolute path '{path}' is not allowed"
                    )))
                }
                Component::ParentDir => {
                    return Err(AgentError::InvalidPatch(format!(
                        "Path traversal ('..') in '{path}' is not allowed"
                    )))
                }
                _ => {}
            }
        }

        let cleaned = raw.clean();
        if cleaned.as_os_str().is_empty() || cleaned == Path::new(".") {
            return Err(AgentError::InvalidPatch(format!("Path '{path}' names no file")));
        }

        if let Some(Component::Normal(first)) = cleaned.components().next() {
            let first = first.to_string_lossy();
            if FORBIDDEN_DIRS.contains(&first.as_ref()) {
                return Err(AgentError::InvalidPatch(format!(
                    "Modification of '{first}/' is not allowed"
                )));
            }
        }

        let is_env_file = cleaned
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with(".env"));
        if is_env_file {
            return Err(AgentError::InvalidPatch(format!(
                "Modification of environment file '{path}' is not allowed"
            )));
        }

        if self.extra_forbidden_files.contains(&cleaned) {
            return Err(AgentError::InvalidPatch(format!(
                "Modification of critical file '{path}' is not allowed"
            )));
        }

        Ok(cleaned)
    }
}
