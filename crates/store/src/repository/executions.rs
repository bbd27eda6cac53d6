//! Execution record storage and history queries.

use std::path::{Path, PathBuf};

use engine::WorkflowExecution;
use tracing::{debug, info};

use super::{json_files, json_path, read_json, write_json};
use crate::StoreError;

/// Persist `execution` as `<dir>/<id>.json`, replacing any earlier
/// snapshot of the same run. Returns the path written.
pub async fn save_execution(dir: &Path, execution: &WorkflowExecution) -> Result<PathBuf, StoreError> {
    let path = json_path(dir, &execution.id)?;
    write_json(&path, execution).await?;
    info!(
        "recorded execution {} of '{}' ({})",
        execution.id,
        execution.workflow.name,
        execution.status
    );
    Ok(path)
}

/// Fetch a single execution record by ID.
pub async fn load_execution(dir: &Path, id: &str) -> Result<WorkflowExecution, StoreError> {
    let path = json_path(dir, id)?;
    read_json(&path, "execution", id).await
}

/// Recorded executions, newest first.
///
/// `workflow` restricts the result to runs of one definition; `limit == 0`
/// means no limit. Records that cannot be read or parsed are skipped.
pub async fn workflow_history(
    dir: &Path,
    workflow: Option<&str>,
    limit: usize,
) -> Result<Vec<WorkflowExecution>, StoreError> {
    let mut history = Vec::new();
    for path in json_files(dir).await? {
        let record = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<WorkflowExecution>(&bytes)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match record {
            Ok(execution) => {
                if workflow.map_or(true, |name| execution.workflow.name == name) {
                    history.push(execution);
                }
            }
            Err(e) => debug!("skipping execution record {}: {}", path.display(), e),
        }
    }

    history.sort_by(|a, b| b.start_time.cmp(&a.start_time).then_with(|| b.id.cmp(&a.id)));
    if limit > 0 {
        history.truncate(limit);
    }
    Ok(history)
}
