//! Workflow definition storage and discovery.

use std::path::{Path, PathBuf};

use chrono::Utc;
use engine::WorkflowDefinition;
use tracing::{debug, info, warn};

use super::{json_files, json_path, read_json, write_json};
use crate::StoreError;

/// `<dir>/<name>.json`, after checking that `name` stays inside `dir`.
pub fn workflow_path(dir: &Path, name: &str) -> Result<PathBuf, StoreError> {
    json_path(dir, name)
}

/// Load the definition stored under `name`.
pub async fn load_workflow(dir: &Path, name: &str) -> Result<WorkflowDefinition, StoreError> {
    let path = workflow_path(dir, name)?;
    debug!("loading workflow '{}' from {}", name, path.display());
    read_json(&path, "workflow", name).await
}

/// Persist `definition` under its own name, stamping `last_updated`.
///
/// Returns the path written.
pub async fn save_workflow(
    dir: &Path,
    definition: &mut WorkflowDefinition,
) -> Result<PathBuf, StoreError> {
    let path = workflow_path(dir, &definition.name)?;
    definition.last_updated = Some(Utc::now());
    write_json(&path, definition).await?;
    info!("saved workflow '{}' to {}", definition.name, path.display());
    Ok(path)
}

/// Every definition that parses, from the `*.json` files directly under
/// `dir`. Unparsable files are skipped; a missing directory yields nothing.
pub async fn discover_workflows(dir: &Path) -> Result<Vec<WorkflowDefinition>, StoreError> {
    let mut definitions = Vec::new();
    for path in json_files(dir).await? {
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("skipping unreadable {}: {}", path.display(), e);
                continue;
            }
        };
        match serde_json::from_slice::<WorkflowDefinition>(&bytes) {
            Ok(definition) => definitions.push(definition),
            Err(e) => debug!("skipping {}: {}", path.display(), e),
        }
    }
    Ok(definitions)
}
