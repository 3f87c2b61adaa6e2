//! State-level errors.
//!
//! Each variant corresponds to one [`FailureKind`] token. Pipelines fold these
//! into the returned [`sapstate_types::StateResult`] instead of returning them.

use sapstate_control::ControlError;
use sapstate_types::{FailureKind, StateResult};
use thiserror::Error;

/// Process exit code for a failure: bad input is a tool error (1), anything
/// else a failed state (2).
pub fn exit_code_for(kind: FailureKind) -> u8 {
    match kind {
        FailureKind::InvalidInput => 1,
        _ => 2,
    }
}

/// Process exit code for a finished state.
pub fn state_exit_code(ret: &StateResult) -> u8 {
    if ret.is_success() {
        0
    } else {
        ret.failure.map_or(2, exit_code_for)
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("{0}")]
    ExecutableNotFound(String),

    #[error("{0}")]
    CredentialsRejected(String),

    #[error("{0}")]
    ControlUnreachable(String),

    #[error("{0}")]
    ControlFailed(String),

    #[error("cannot read configuration {path}: {message}")]
    ConfigUnreadable { path: String, message: String },

    #[error("Could not update configuration {path}: {message}")]
    ConfigUnwritable { path: String, message: String },

    #[error("cannot remove log file {path}: {message}")]
    LogCleanupFailed { path: String, message: String },

    #[error(
        "SLD data transfer not successful: no success marker within {secs}s in {}",
        pending.join(", ")
    )]
    ConfirmationTimeout { secs: u64, pending: Vec<String> },

    #[error("{}", problems.join("\n"))]
    HealthDegraded { problems: Vec<String> },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl StateError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StateError::ExecutableNotFound(_) => FailureKind::ExecutableNotFound,
            StateError::CredentialsRejected(_) => FailureKind::CredentialsRejected,
            StateError::ControlUnreachable(_) => FailureKind::ControlUnreachable,
            StateError::ControlFailed(_) => FailureKind::ControlFailed,
            StateError::ConfigUnreadable { .. } => FailureKind::ConfigUnreadable,
            StateError::ConfigUnwritable { .. } => FailureKind::ConfigUnwritable,
            StateError::LogCleanupFailed { .. } => FailureKind::LogCleanupFailed,
            StateError::ConfirmationTimeout { .. } => FailureKind::ConfirmationTimeout,
            StateError::HealthDegraded { .. } => FailureKind::HealthDegraded,
            StateError::InvalidInput(_) => FailureKind::InvalidInput,
        }
    }

    /// Exit code for a state that stopped with this error.
    pub fn exit_code(&self) -> u8 {
        exit_code_for(self.kind())
    }

    /// Prefix the message of a control-interface failure.
    pub fn context(self, prefix: &str) -> Self {
        let wrap = |m: String| format!("{prefix}: {m}");
        match self {
            StateError::ExecutableNotFound(m) => StateError::ExecutableNotFound(wrap(m)),
            StateError::CredentialsRejected(m) => StateError::CredentialsRejected(wrap(m)),
            StateError::ControlUnreachable(m) => StateError::ControlUnreachable(wrap(m)),
            StateError::ControlFailed(m) => StateError::ControlFailed(wrap(m)),
            other => other,
        }
    }

    /// Classify an adapter error. Control errors keep their own kind;
    /// anything else becomes `fallback`.
    pub fn from_adapter(err: anyhow::Error, fallback: impl FnOnce(String) -> StateError) -> Self {
        match err.downcast::<ControlError>() {
            Ok(control) => match control {
                ControlError::Failed { .. } | ControlError::Parse { .. } => {
                    fallback(control.to_string())
                }
                other => other.into(),
            },
            Err(other) => fallback(format!("{other:#}")),
        }
    }
}

impl From<ControlError> for StateError {
    fn from(err: ControlError) -> Self {
        let message = err.to_string();
        match err.failure_kind() {
            FailureKind::ExecutableNotFound => StateError::ExecutableNotFound(message),
            FailureKind::CredentialsRejected => StateError::CredentialsRejected(message),
            FailureKind::ControlUnreachable => StateError::ControlUnreachable(message),
            _ => StateError::ControlFailed(message),
        }
    }
}
