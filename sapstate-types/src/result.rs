use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Machine-readable cause attached to a failed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ExecutableNotFound,
    CredentialsRejected,
    ControlUnreachable,
    ControlFailed,
    ConfigUnreadable,
    ConfigUnwritable,
    LogCleanupFailed,
    ConfirmationTimeout,
    HealthDegraded,
    InvalidInput,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::ExecutableNotFound => "executable_not_found",
            FailureKind::CredentialsRejected => "credentials_rejected",
            FailureKind::ControlUnreachable => "control_unreachable",
            FailureKind::ControlFailed => "control_failed",
            FailureKind::ConfigUnreadable => "config_unreadable",
            FailureKind::ConfigUnwritable => "config_unwritable",
            FailureKind::LogCleanupFailed => "log_cleanup_failed",
            FailureKind::ConfirmationTimeout => "confirmation_timeout",
            FailureKind::HealthDegraded => "health_degraded",
            FailureKind::InvalidInput => "invalid_input",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a declarative state, in the shape automation runtimes expect.
///
/// `result` is tri-state: `Some(true)` on success, `Some(false)` on failure and
/// `None` for a test run that would have made changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResult {
    pub schema: String,
    pub name: String,
    pub result: Option<bool>,

    #[serde(default)]
    pub changed: bool,

    #[serde(default)]
    pub changes: BTreeMap<String, serde_json::Value>,

    pub comment: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl StateResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: crate::schema::SAPSTATE_RESULT_V1.to_string(),
            name: name.into(),
            result: Some(false),
            changed: false,
            changes: BTreeMap::new(),
            comment: String::new(),
            failure: None,
        }
    }

    pub fn record_change(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.changes.insert(key.into(), value.into());
        self.changed = true;
    }

    /// Append `entry` to the JSON array stored under `key`.
    pub fn push_change(&mut self, key: &str, entry: impl Into<serde_json::Value>) {
        let slot = self
            .changes
            .entry(key.to_string())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        if let Some(arr) = slot.as_array_mut() {
            arr.push(entry.into());
        }
        self.changed = true;
    }

    /// Mark success. In test mode a result with pending changes becomes `None`.
    pub fn succeed(&mut self, comment: impl Into<String>, test: bool) {
        self.comment = comment.into();
        self.failure = None;
        self.result = if test && self.changed { None } else { Some(true) };
    }

    pub fn fail(&mut self, kind: FailureKind, comment: impl Into<String>) {
        self.comment = comment.into();
        self.failure = Some(kind);
        self.result = Some(false);
    }

    pub fn is_success(&self) -> bool {
        self.result != Some(false)
    }
}
