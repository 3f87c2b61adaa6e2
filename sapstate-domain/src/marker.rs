use crate::ports::LogView;
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use sapstate_types::LogFileSet;
use thiserror::Error;

pub const DEFAULT_MARKER_PATTERN: &str = r"Return code: ([0-9]{3})";
pub const DEFAULT_EXPECTED_CODE: &str = "200";

#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("invalid marker pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("marker pattern '{0}' needs a capture group for the return code")]
    NoCaptureGroup(String),
}

/// Success marker searched for in registration logs.
///
/// Only the last match in a file counts: an earlier `200` followed by a
/// `401` means the latest attempt failed.
#[derive(Debug, Clone)]
pub struct SuccessMarker {
    pattern: Regex,
    expected: String,
}

impl Default for SuccessMarker {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_MARKER_PATTERN).expect("static regex"),
            expected: DEFAULT_EXPECTED_CODE.to_string(),
        }
    }
}

impl SuccessMarker {
    pub fn new(pattern: &str, expected: &str) -> Result<Self, MarkerError> {
        let pattern = Regex::new(pattern)?;
        if pattern.captures_len() < 2 {
            return Err(MarkerError::NoCaptureGroup(pattern.as_str().to_string()));
        }
        Ok(Self {
            pattern,
            expected: expected.trim().to_string(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    /// Code captured by the last match, if any.
    pub fn last_code<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.pattern
            .captures_iter(text)
            .last()
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    pub fn is_confirmed(&self, text: &str) -> bool {
        self.last_code(text)
            .is_some_and(|code| codes_equal(code, &self.expected))
    }
}

fn codes_equal(a: &str, b: &str) -> bool {
    match (a.trim().parse::<u32>(), b.trim().parse::<u32>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a.trim() == b.trim(),
    }
}

/// Confirmation state of one log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogState {
    Missing,
    Pending { last_code: Option<String> },
    Confirmed,
}

impl LogState {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, LogState::Confirmed)
    }
}

/// Evaluate every log in `logs`, in order. Unreadable files count as missing.
pub fn evaluate_logs(
    marker: &SuccessMarker,
    view: &dyn LogView,
    logs: &LogFileSet,
) -> Vec<(Utf8PathBuf, LogState)> {
    logs.iter()
        .map(|path| (path.to_path_buf(), evaluate_one(marker, view, path)))
        .collect()
}

fn evaluate_one(marker: &SuccessMarker, view: &dyn LogView, path: &Utf8Path) -> LogState {
    if !view.exists(path) {
        return LogState::Missing;
    }
    match view.read_to_string(path) {
        Ok(text) => {
            if marker.is_confirmed(&text) {
                LogState::Confirmed
            } else {
                LogState::Pending {
                    last_code: marker.last_code(&text).map(str::to_string),
                }
            }
        }
        Err(err) => {
            tracing::debug!(path = %path, error = %err, "log not readable yet");
            LogState::Missing
        }
    }
}
