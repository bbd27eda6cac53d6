//! `store` crate: filesystem persistence for workflow definitions and
//! execution records.
//!
//! Everything is plain JSON on disk, one file per definition and one per
//! execution. No business logic lives here beyond naming rules.

pub mod config;
pub mod error;
pub mod repository;

pub use config::StoreConfig;
pub use error::StoreError;
pub use repository::executions::{load_execution, save_execution, workflow_history};
pub use repository::workflows::{discover_workflows, load_workflow, save_workflow, workflow_path};
