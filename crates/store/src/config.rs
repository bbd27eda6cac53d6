//! Where the store keeps its files.

use std::path::{Path, PathBuf};

/// Default state root, relative to the working directory.
pub const DEFAULT_ROOT: &str = ".runbook";

/// Filesystem layout of the state root:
///
/// ```text
/// <root>/workflows/<name>.json
/// <root>/executions/<id>.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.root.join("workflows")
    }

    pub fn executions_dir(&self) -> PathBuf {
        self.root.join("executions")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}
