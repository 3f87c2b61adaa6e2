//! Error types for sapstate-control.
//!
//! Errors distinguish between causes the caller reports differently:
//! - Authentication failures (`InvalidCredentials`)
//! - Connection failures (`Unreachable`), which may trigger an HTTP fallback
//! - Everything the control interface itself rejected (`Failed`)
//! - Local problems: missing executables, spawn errors, timeouts, unparsable output

use sapstate_types::FailureKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("executable '{name}' not found (searched: {searched})")]
    ExecutableNotFound { name: String, searched: String },

    #[error("credentials rejected by {function}: {message}")]
    InvalidCredentials { function: String, message: String },

    #[error("control interface unreachable ({function}): {message}")]
    Unreachable { function: String, message: String },

    #[error("{function} failed: {message}")]
    Failed { function: String, message: String },

    #[error("{program} did not finish within {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("cannot run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {function} output: {message}")]
    Parse { function: String, message: String },

    #[error("unknown status '{status}' for {subject}")]
    UnknownStatus { subject: String, status: String },
}

impl ControlError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ControlError::Unreachable { .. })
    }

    pub fn is_credentials(&self) -> bool {
        matches!(self, ControlError::InvalidCredentials { .. })
    }

    /// Failure token reported in a state result.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ControlError::ExecutableNotFound { .. } => FailureKind::ExecutableNotFound,
            ControlError::InvalidCredentials { .. } => FailureKind::CredentialsRejected,
            ControlError::Unreachable { .. } | ControlError::Timeout { .. } => {
                FailureKind::ControlUnreachable
            }
            ControlError::Failed { .. }
            | ControlError::Spawn { .. }
            | ControlError::Parse { .. }
            | ControlError::UnknownStatus { .. } => FailureKind::ControlFailed,
        }
    }
}

pub type ControlResult<T> = Result<T, ControlError>;
