//! Exit status for shiftdiagctl
//!
//! Warnings never change the exit code; only fatal preconditions do.

pub use shiftdiag_common::error::{EXIT_FATAL, EXIT_SUCCESS};

use shiftdiag_common::CollectError;

/// Exit code for an error that ended the command
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<CollectError>()
        .map(CollectError::exit_code)
        .unwrap_or(EXIT_FATAL)
}
