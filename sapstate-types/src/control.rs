//! Records returned by the `sapcontrol` web-service functions.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dispatcher status colour reported for instances and processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DispStatus {
    Gray,
    Green,
    Yellow,
    Red,
}

impl DispStatus {
    /// Numeric code used by the control interface (`GRAY`=1 .. `RED`=4).
    pub fn code(self) -> u8 {
        match self {
            DispStatus::Gray => 1,
            DispStatus::Green => 2,
            DispStatus::Yellow => 3,
            DispStatus::Red => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DispStatus::Gray => "GRAY",
            DispStatus::Green => "GREEN",
            DispStatus::Yellow => "YELLOW",
            DispStatus::Red => "RED",
        }
    }
}

impl fmt::Display for DispStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispStatus {
    type Err = String;

    /// Accepts `GREEN` as well as the prefixed `SAPControl-GREEN` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let t = t.strip_prefix("SAPControl-").unwrap_or(t);
        match t.to_ascii_uppercase().as_str() {
            "GRAY" => Ok(DispStatus::Gray),
            "GREEN" => Ok(DispStatus::Green),
            "YELLOW" => Ok(DispStatus::Yellow),
            "RED" => Ok(DispStatus::Red),
            _ => Err(s.to_string()),
        }
    }
}

/// Start/stop scope for `StartSystem` / `StopSystem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SystemLevel {
    All,
    Scs,
    Dialog,
    Abap,
    J2ee,
    Trex,
    Enqrep,
    Hdb,
    Allnohdb,
}

impl SystemLevel {
    pub const ALL_LEVELS: [SystemLevel; 9] = [
        SystemLevel::All,
        SystemLevel::Scs,
        SystemLevel::Dialog,
        SystemLevel::Abap,
        SystemLevel::J2ee,
        SystemLevel::Trex,
        SystemLevel::Enqrep,
        SystemLevel::Hdb,
        SystemLevel::Allnohdb,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SystemLevel::All => "ALL",
            SystemLevel::Scs => "SCS",
            SystemLevel::Dialog => "DIALOG",
            SystemLevel::Abap => "ABAP",
            SystemLevel::J2ee => "J2EE",
            SystemLevel::Trex => "TREX",
            SystemLevel::Enqrep => "ENQREP",
            SystemLevel::Hdb => "HDB",
            SystemLevel::Allnohdb => "ALLNOHDB",
        }
    }
}

impl FromStr for SystemLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let up = s.trim().to_ascii_uppercase();
        SystemLevel::ALL_LEVELS
            .into_iter()
            .find(|l| l.as_str() == up)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for SystemLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `GetSystemInstanceList`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInstance {
    pub hostname: String,
    pub instance_nr: u8,
    pub http_port: Option<u16>,
    pub https_port: Option<u16>,
    pub start_priority: String,
    pub features: Vec<String>,
    pub disp_status: DispStatus,
}

/// One row of `GetInstanceProperties`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceProperty {
    pub property: String,
    pub property_type: String,
    pub value: String,
}

/// One row of `GetProcessList`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: String,
    pub description: String,
    pub disp_status: DispStatus,
    pub text_status: String,
    pub start_time: String,
    pub elapsed_time: String,
    pub pid: Option<u32>,
}

/// One row of `ABAPGetComponentList`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbapComponent {
    pub component: String,
    pub release: String,
    pub patchlevel: String,
    pub component_type: String,
    pub description: String,
}

/// One SM21 entry from `ABAPReadSyslog`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyslogEntry {
    pub time: NaiveDateTime,
    pub severity: DispStatus,
    pub text: String,
}

/// One row of `ABAPGetSystemWPTable`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkProcess {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    pub no: u32,
    pub typ: String,
    pub pid: Option<u32>,
    pub status: String,
    pub reason: String,
    pub start: String,
    pub err: String,
    pub sem: String,
    pub cpu: String,
    pub time: String,
    pub program: String,
    pub client: String,
    pub user: String,
    pub action: String,
    pub table: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disp_status_parses_prefixed_and_plain() {
        assert_eq!("GREEN".parse::<DispStatus>().unwrap(), DispStatus::Green);
        assert_eq!("SAPControl-RED".parse::<DispStatus>().unwrap(), DispStatus::Red);
        assert_eq!("gray".parse::<DispStatus>().unwrap(), DispStatus::Gray);
        assert!("BLUE".parse::<DispStatus>().is_err());
    }

    #[test]
    fn disp_status_codes_are_ordered() {
        let codes: Vec<u8> = [
            DispStatus::Gray,
            DispStatus::Green,
            DispStatus::Yellow,
            DispStatus::Red,
        ]
        .into_iter()
        .map(DispStatus::code)
        .collect();
        assert_eq!(codes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn system_level_parses_case_insensitive() {
        let lvl: SystemLevel = "allnohdb".parse().unwrap();
        assert_eq!(lvl, SystemLevel::Allnohdb);
        assert_eq!(lvl.to_string(), "ALLNOHDB");
        assert!("NOPE".parse::<SystemLevel>().is_err());
    }
}
