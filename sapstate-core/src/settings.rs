//! Clap-free settings for the state pipelines.

use camino::Utf8PathBuf;
use sapstate_domain::{DEFAULT_EXPECTED_CODE, DEFAULT_MARKER_PATTERN, DEFAULT_NON_CRITICAL};
use sapstate_types::control::DispStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Where the SLD destination config is read from and written to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationBackend {
    /// `sldreg -showconnect` / `sldreg -configure`.
    #[default]
    Sldreg,
    /// Plain `key=value` file.
    File,
}

impl FromStr for DestinationBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sldreg" => Ok(Self::Sldreg),
            "file" => Ok(Self::File),
            other => Err(format!("unknown backend '{other}' (expected sldreg or file)")),
        }
    }
}

impl fmt::Display for DestinationBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sldreg => "sldreg",
            Self::File => "file",
        })
    }
}

/// How to reach `sapcontrol`.
#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub executable: Option<Utf8PathBuf>,
    pub fqdn: Option<String>,
    pub fallback: bool,
    pub timeout: Duration,
    pub run_as: Option<String>,
    /// How long `start` waits for the service to answer.
    pub start_timeout: Duration,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            executable: None,
            fqdn: None,
            fallback: true,
            timeout: Duration::from_secs(300),
            run_as: None,
            start_timeout: Duration::from_secs(60),
        }
    }
}

/// Settings for `sld_registered`.
#[derive(Debug, Clone)]
pub struct RegistrationSettings {
    pub backend: DestinationBackend,
    pub sldreg: Option<Utf8PathBuf>,
    /// Per call to `sldreg`.
    pub sldreg_timeout: Duration,
    pub remove_logs: bool,
    pub overwrite: bool,
    pub check_timeout: Duration,
    pub poll_interval: Duration,
    pub marker: String,
    pub expected_code: String,
    pub test: bool,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            backend: DestinationBackend::default(),
            sldreg: None,
            sldreg_timeout: Duration::from_secs(60),
            remove_logs: true,
            overwrite: false,
            check_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
            marker: DEFAULT_MARKER_PATTERN.to_string(),
            expected_code: DEFAULT_EXPECTED_CODE.to_string(),
            test: false,
        }
    }
}

/// Settings for `running` and `dead`.
#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub restart: bool,
    pub test: bool,
}

/// Settings for `system_health_ok`.
#[derive(Debug, Clone)]
pub struct HealthSettings {
    pub severities: Vec<DispStatus>,
    pub non_critical: Vec<String>,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            severities: vec![DispStatus::Red],
            non_critical: DEFAULT_NON_CRITICAL.iter().map(|s| s.to_string()).collect(),
        }
    }
}
