//! Configuration file loading for sapstate.
//!
//! Discovers and loads `sapstate.toml` from the working directory (or the
//! path given with `--config`) and merges it with CLI arguments. CLI flags
//! take precedence.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use sapstate_core::settings::{
    ControlSettings, DestinationBackend, HealthSettings, RegistrationSettings,
};
use sapstate_types::control::DispStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "sapstate.toml";

/// Top-level configuration from sapstate.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SapstateConfig {
    pub sapcontrol: SapcontrolConfig,
    pub sldreg: SldregConfig,
    pub registration: RegistrationConfig,
    pub health: HealthConfig,
}

/// `[sapcontrol]`: how to reach the control interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SapcontrolConfig {
    /// Path to the `sapcontrol` executable. Looked up on `PATH` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Utf8PathBuf>,

    /// Remote host. Unset means the local `sapstartsrv`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,

    /// Retry over HTTP when HTTPS cannot connect.
    pub fallback: bool,

    pub timeout_secs: u64,

    /// OS user for `StartService` / `StopService` (default `<sid>adm`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_as: Option<String>,
}

impl Default for SapcontrolConfig {
    fn default() -> Self {
        Self {
            path: None,
            fqdn: None,
            fallback: true,
            timeout_secs: 300,
            run_as: None,
        }
    }
}

/// `[sldreg]`: where the destination config lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SldregConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Utf8PathBuf>,

    pub backend: DestinationBackend,
    pub timeout_secs: u64,
}

impl Default for SldregConfig {
    fn default() -> Self {
        let d = RegistrationSettings::default();
        Self {
            path: None,
            backend: d.backend,
            timeout_secs: d.sldreg_timeout.as_secs(),
        }
    }
}

/// `[registration]`: behaviour of `sld-registered`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub remove_logs: bool,
    pub overwrite: bool,
    pub check_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub marker: String,
    pub expected_code: String,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        let d = RegistrationSettings::default();
        Self {
            remove_logs: d.remove_logs,
            overwrite: d.overwrite,
            check_timeout_secs: d.check_timeout.as_secs(),
            poll_interval_ms: d.poll_interval.as_millis() as u64,
            marker: d.marker,
            expected_code: d.expected_code,
        }
    }
}

/// `[health]`: what `system-health-ok` treats as a problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub severities: Vec<String>,
    pub non_critical: Vec<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        let d = HealthSettings::default();
        Self {
            severities: d.severities.iter().map(|s| s.to_string()).collect(),
            non_critical: d.non_critical,
        }
    }
}

/// Discover the sapstate.toml config file in `dir`.
pub fn discover_config(dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path);
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path);
        None
    }
}

/// Load and parse a sapstate.toml config file.
pub fn load_config(path: &Utf8Path) -> anyhow::Result<SapstateConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

/// Parse a config file from a string.
pub fn parse_config(contents: &str) -> anyhow::Result<SapstateConfig> {
    let config: SapstateConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load the explicit `--config` file, or sapstate.toml from `dir`, or defaults.
pub fn load_or_default(
    explicit: Option<&Utf8Path>,
    dir: &Utf8Path,
) -> anyhow::Result<SapstateConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match discover_config(dir) {
        Some(path) => load_config(&path),
        None => Ok(SapstateConfig::default()),
    }
}

/// Sample config with every key at its default.
pub fn sample_config() -> anyhow::Result<String> {
    toml::to_string_pretty(&SapstateConfig::default()).context("serialize sample config")
}

/// `[sapcontrol]` overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct ControlOverrides {
    pub path: Option<Utf8PathBuf>,
    pub fqdn: Option<String>,
    pub no_fallback: bool,
    pub timeout_secs: Option<u64>,
    pub run_as: Option<String>,
}

/// `sld-registered` overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct RegistrationOverrides {
    pub backend: Option<DestinationBackend>,
    pub sldreg: Option<Utf8PathBuf>,
    pub overwrite: bool,
    pub keep_logs: bool,
    pub check_timeout_secs: Option<u64>,
    pub test: bool,
}

/// Builder for merging the config file with CLI arguments.
pub struct ConfigMerger {
    config: SapstateConfig,
}

impl ConfigMerger {
    pub fn new(config: SapstateConfig) -> Self {
        Self { config }
    }

    /// CLI values replace file values; `--no-fallback` can only turn the
    /// fallback off.
    pub fn merge_control(&self, cli: &ControlOverrides) -> ControlSettings {
        let file = &self.config.sapcontrol;
        ControlSettings {
            executable: cli.path.clone().or_else(|| file.path.clone()),
            fqdn: cli.fqdn.clone().or_else(|| file.fqdn.clone()),
            fallback: file.fallback && !cli.no_fallback,
            timeout: Duration::from_secs(cli.timeout_secs.unwrap_or(file.timeout_secs)),
            run_as: cli.run_as.clone().or_else(|| file.run_as.clone()),
            ..ControlSettings::default()
        }
    }

    /// Boolean flags only ever switch behaviour on (`--overwrite`) or off
    /// (`--keep-logs`) relative to the file.
    pub fn merge_registration(&self, cli: &RegistrationOverrides) -> RegistrationSettings {
        let file = &self.config.registration;
        RegistrationSettings {
            backend: cli.backend.unwrap_or(self.config.sldreg.backend),
            sldreg: cli.sldreg.clone().or_else(|| self.config.sldreg.path.clone()),
            sldreg_timeout: Duration::from_secs(self.config.sldreg.timeout_secs),
            remove_logs: file.remove_logs && !cli.keep_logs,
            overwrite: file.overwrite || cli.overwrite,
            check_timeout: Duration::from_secs(
                cli.check_timeout_secs.unwrap_or(file.check_timeout_secs),
            ),
            poll_interval: Duration::from_millis(file.poll_interval_ms),
            marker: file.marker.clone(),
            expected_code: file.expected_code.clone(),
            test: cli.test,
        }
    }

    /// CLI severities replace the file's list when given.
    pub fn merge_health(&self, cli_severities: &[DispStatus]) -> anyhow::Result<HealthSettings> {
        let severities = if cli_severities.is_empty() {
            self.config
                .health
                .severities
                .iter()
                .map(|s| {
                    s.parse::<DispStatus>()
                        .map_err(|bad| anyhow::anyhow!("invalid severity '{}' in [health]", bad))
                })
                .collect::<anyhow::Result<Vec<_>>>()?
        } else {
            cli_severities.to_vec()
        };
        Ok(HealthSettings {
            severities,
            non_critical: self.config.health.non_critical.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_example_config() {
        let contents = r#"
[sapcontrol]
path = "/usr/sap/hostctrl/exe/sapcontrol"
fqdn = "s4h-app.my.domain"
fallback = false
timeout_secs = 120
run_as = "s4hadm"

[sldreg]
backend = "file"
timeout_secs = 30

[registration]
remove_logs = false
check_timeout_secs = 90
poll_interval_ms = 250
expected_code = "200"

[health]
severities = ["RED", "YELLOW"]
non_critical = []
"#;

        let config = parse_config(contents).unwrap();
        assert_eq!(
            config.sapcontrol.path.as_deref(),
            Some(Utf8Path::new("/usr/sap/hostctrl/exe/sapcontrol"))
        );
        assert!(!config.sapcontrol.fallback);
        assert_eq!(config.sapcontrol.timeout_secs, 120);
        assert_eq!(config.sldreg.backend, DestinationBackend::File);
        assert_eq!(config.sldreg.timeout_secs, 30);
        assert!(!config.registration.remove_logs);
        assert_eq!(config.registration.check_timeout_secs, 90);
        assert_eq!(config.health.severities, vec!["RED", "YELLOW"]);
        assert!(config.health.non_critical.is_empty());
    }

    #[test]
    fn test_parse_empty_config() {
        let config = parse_config("").unwrap();
        assert!(config.sapcontrol.fallback);
        assert_eq!(config.sapcontrol.timeout_secs, 300);
        assert_eq!(config.sldreg.backend, DestinationBackend::Sldreg);
        assert_eq!(config.sldreg.timeout_secs, 60);
        assert!(config.registration.remove_logs);
        assert_eq!(config.registration.check_timeout_secs, 60);
        assert_eq!(config.registration.poll_interval_ms, 500);
        assert_eq!(config.registration.marker, r"Return code: ([0-9]{3})");
        assert_eq!(config.health.severities, vec!["RED"]);
        assert_eq!(config.health.non_critical.len(), 1);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(parse_config("[sldreg]\nbackend = \"ldap\"\n").is_err());
    }

    #[test]
    fn test_merge_control_cli_wins() {
        let config =
            parse_config("[sapcontrol]\nfqdn = \"from-file\"\ntimeout_secs = 10\n").unwrap();
        let merged = ConfigMerger::new(config).merge_control(&ControlOverrides {
            fqdn: Some("from-cli".to_string()),
            no_fallback: true,
            ..Default::default()
        });
        assert_eq!(merged.fqdn.as_deref(), Some("from-cli"));
        assert_eq!(merged.timeout, Duration::from_secs(10));
        assert!(!merged.fallback);
    }

    #[test]
    fn test_merge_registration_flags() {
        let config = SapstateConfig::default();
        let merged = ConfigMerger::new(config).merge_registration(&RegistrationOverrides {
            backend: Some(DestinationBackend::File),
            overwrite: true,
            keep_logs: true,
            check_timeout_secs: Some(5),
            test: true,
            ..Default::default()
        });
        assert_eq!(merged.backend, DestinationBackend::File);
        assert!(merged.overwrite);
        assert!(!merged.remove_logs);
        assert_eq!(merged.check_timeout, Duration::from_secs(5));
        assert_eq!(merged.sldreg_timeout, Duration::from_secs(60));
        assert!(merged.test);
    }

    #[test]
    fn test_merge_health_severities() {
        let config = parse_config("[health]\nseverities = [\"yellow\"]\n").unwrap();
        let merger = ConfigMerger::new(config);
        assert_eq!(merger.merge_health(&[]).unwrap().severities, vec![DispStatus::Yellow]);
        assert_eq!(
            merger.merge_health(&[DispStatus::Red]).unwrap().severities,
            vec![DispStatus::Red]
        );

        let bad = parse_config("[health]\nseverities = [\"PURPLE\"]\n").unwrap();
        assert!(ConfigMerger::new(bad).merge_health(&[]).is_err());
    }

    #[test]
    fn test_explicit_config_path() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let other = dir.join("elsewhere.toml");
        fs::write(&other, "[sapcontrol]\ntimeout_secs = 7\n").unwrap();

        let config = load_or_default(Some(&other), dir).unwrap();
        assert_eq!(config.sapcontrol.timeout_secs, 7);
    }

    #[test]
    fn test_discover_in_dir() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        assert!(discover_config(dir).is_none());
        assert_eq!(load_or_default(None, dir).unwrap().sapcontrol.timeout_secs, 300);

        fs::write(dir.join(CONFIG_FILE_NAME), "[sapcontrol]\ntimeout_secs = 30\n").unwrap();
        assert!(discover_config(dir).is_some());
        assert_eq!(load_or_default(None, dir).unwrap().sapcontrol.timeout_secs, 30);
    }

    #[test]
    fn test_sample_config_parses_back() {
        let sample = sample_config().unwrap();
        let config = parse_config(&sample).unwrap();
        assert_eq!(config.registration.expected_code, "200");
    }
}
