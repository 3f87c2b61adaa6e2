//! Port traits abstracting all I/O away from the state pipelines.

use camino::Utf8Path;
use chrono::NaiveDateTime;
use sapstate_control::ControlResult;
use sapstate_domain::LogView;
use sapstate_types::control::{DispStatus, SyslogEntry, WorkProcess};
use sapstate_types::{InstanceTarget, ObservedDestination, Secret, SldDestination};

/// The slice of the control interface the states need.
pub trait ControlPort {
    /// `true` when `sapstartsrv` answers for the instance.
    fn status(&self, target: &InstanceTarget) -> ControlResult<bool>;
    fn start(&self, target: &InstanceTarget) -> ControlResult<bool>;
    fn stop(&self, target: &InstanceTarget) -> ControlResult<bool>;
    /// Restart the service, or start it when it is down.
    fn restart(&self, target: &InstanceTarget) -> ControlResult<bool>;
    fn syslog_errors(
        &self,
        target: &InstanceTarget,
        since: NaiveDateTime,
        severities: &[DispStatus],
    ) -> ControlResult<Vec<SyslogEntry>>;
    fn workprocess_table(&self, target: &InstanceTarget) -> ControlResult<Vec<WorkProcess>>;
}

/// Reads and writes the SLD destination config.
pub trait DestinationStore {
    /// `None` when no config exists yet at `dest.config_path`.
    fn read(&self, dest: &SldDestination) -> anyhow::Result<Option<ObservedDestination>>;
    fn write(&self, dest: &SldDestination) -> anyhow::Result<()>;
}

/// Registration logs: read through [`LogView`], plus removal.
pub trait LogStore: LogView {
    /// Remove `path`. `Ok(false)` when it did not exist.
    fn remove(&self, path: &Utf8Path) -> anyhow::Result<bool>;
}

/// Resolves password references into secrets.
pub trait CredentialProvider {
    fn resolve(&self, reference: &str) -> anyhow::Result<Secret>;
}
