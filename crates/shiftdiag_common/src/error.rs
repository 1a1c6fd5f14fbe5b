//! Error types for shiftdiag.
//!
//! Only preconditions that make the rest of a run meaningless are errors here.
//! Tool failures during collection are warnings carried in the run summary.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code for a run that reached the end, warnings included
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for a fatal precondition failure
pub const EXIT_FATAL: i32 = 1;

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Cannot create workspace {path}: {source}")]
    WorkspaceCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workspace {0} does not exist or is not a directory")]
    WorkspaceMissing(PathBuf),

    #[error("Kubeconfig not found at {0}")]
    CredentialNotFound(PathBuf),

    #[error("Kubeconfig at {path} is not readable: {source}")]
    CredentialUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("Inventory error: {0}")]
    Inventory(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollectError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        EXIT_FATAL
    }
}

pub type Result<T> = std::result::Result<T, CollectError>;
