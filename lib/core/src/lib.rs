//! Core identifiers and error handling shared by the canvasflow crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{HistoryEntryId, WorkflowRunId};
