use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use sapstate_types::control::{DispStatus, SyslogEntry, WorkProcess};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use thiserror::Error;

/// SM21 texts that never count as a problem.
pub const DEFAULT_NON_CRITICAL: &[&str] =
    &["Monitoring: Program RSUSR003 Reports \"Security check passed\" "];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthError {
    #[error("invalid check_from '{0}': expected DDMMYYYY")]
    CheckFrom(String),
}

/// Parse `DDMMYYYY` into midnight of that day.
pub fn parse_check_from(s: &str) -> Result<NaiveDateTime, HealthError> {
    let t = s.trim();
    if t.len() != 8 || !t.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HealthError::CheckFrom(s.to_string()));
    }
    NaiveDate::parse_from_str(t, "%d%m%Y")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| HealthError::CheckFrom(s.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthPolicy {
    pub severities: Vec<DispStatus>,
    pub non_critical: Vec<String>,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            severities: vec![DispStatus::Red],
            non_critical: DEFAULT_NON_CRITICAL.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl HealthPolicy {
    fn is_non_critical(&self, text: &str) -> bool {
        self.non_critical.iter().any(|n| n.trim() == text.trim())
    }
}

/// Problems found by a health check, one line each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub problems: Vec<String>,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(" {2,}").expect("static regex"));

fn collapse_spaces(s: &str) -> String {
    SPACE_RUNS.replace_all(s, " ").into_owned()
}

/// SM21 lines newer than `since` with a selected severity, deduplicated in
/// first-seen order.
pub fn syslog_problems(
    entries: &[SyslogEntry],
    since: NaiveDateTime,
    policy: &HealthPolicy,
) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for entry in entries {
        if entry.time <= since || !policy.severities.contains(&entry.severity) {
            continue;
        }
        if policy.is_non_critical(&entry.text) {
            continue;
        }
        let line = collapse_spaces(&format!("SM21: {}", entry.text));
        if seen.insert(line.clone()) {
            out.push(line);
        }
    }
    out
}

/// SM50 lines for work processes that ended or report an error.
pub fn workprocess_problems(table: &[WorkProcess]) -> Vec<String> {
    table
        .iter()
        .filter(|wp| wp.status == "Ended" || !wp.err.trim().is_empty())
        .map(|wp| {
            let reason = if wp.reason.trim().is_empty() {
                String::new()
            } else {
                format!(" (reason: {})", wp.reason)
            };
            let pid = wp
                .pid
                .map(|p| p.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            format!(
                "SM50: {} work process {} (PID: {}) is in status {}{} with error '{}'",
                wp.typ, wp.no, pid, wp.status, reason, wp.err
            )
        })
        .collect()
}

pub fn evaluate_health(
    syslog: &[SyslogEntry],
    workprocesses: &[WorkProcess],
    since: NaiveDateTime,
    policy: &HealthPolicy,
) -> HealthReport {
    let mut problems = syslog_problems(syslog, since, policy);
    problems.extend(workprocess_problems(workprocesses));
    HealthReport { problems }
}
