//! Errors that stop the runner before or after a run.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum RunnerError {
    /// A `CANVASFLOW__*` variable is present but invalid.
    Config { details: String },
    /// The engine client could not be built.
    Engine { details: String },
    /// The store directory could not be opened.
    Store { details: String },
    /// The workflow document could not be read.
    ReadDocument { path: PathBuf, details: String },
    /// The workflow document was rejected.
    Import { details: String },
    /// The workspace could not be serialized or written.
    Export { path: PathBuf, details: String },
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {details}"),
            Self::Engine { details } => write!(f, "engine client setup failed: {details}"),
            Self::Store { details } => write!(f, "store unavailable: {details}"),
            Self::ReadDocument { path, details } => {
                write!(f, "failed to read {}: {details}", path.display())
            }
            Self::Import { details } => write!(f, "import failed: {details}"),
            Self::Export { path, details } => {
                write!(f, "failed to export to {}: {details}", path.display())
            }
        }
    }
}

impl std::error::Error for RunnerError {}
