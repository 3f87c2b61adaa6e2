//! Default port implementations backed by the vendor binaries and the local
//! filesystem.

use crate::ports::{ControlPort, CredentialProvider, DestinationStore, LogStore};
use crate::settings::{ControlSettings, RegistrationSettings};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use fs_err as fs;
use sapstate_control::{
    CommandRunner, ControlResult, ProcessRunner, SAPCONTROL_FALLBACK_PATH, SapControl,
    SapControlOptions, Sldreg, find_executable, sldreg_kernel_path,
};
use sapstate_domain::{FsLogView, LogView, parse_destination_file, parse_showconnect};
use sapstate_types::control::{DispStatus, SyslogEntry, WorkProcess};
use sapstate_types::{InstanceTarget, ObservedDestination, Secret, Sid, SldDestination};
use std::cell::OnceCell;
use std::io::ErrorKind;
use std::time::Duration;
use tracing::debug;

/// Locate `sapcontrol` and build a client for it.
pub fn sapcontrol_client(
    settings: &ControlSettings,
    sid: &Sid,
) -> ControlResult<SapControl<ProcessRunner>> {
    let executable = find_executable(
        "sapcontrol",
        settings.executable.as_deref(),
        &[Utf8PathBuf::from(SAPCONTROL_FALLBACK_PATH)],
    )?;
    debug!(path = %executable, "using sapcontrol");
    let mut opts = SapControlOptions::new(executable);
    opts.fqdn = settings.fqdn.clone();
    opts.fallback = settings.fallback;
    opts.timeout = settings.timeout;
    opts.run_as = Some(
        settings
            .run_as
            .clone()
            .unwrap_or_else(|| sid.adm_user()),
    );
    Ok(SapControl::new(ProcessRunner::default(), opts))
}

/// Locate `sldreg`: configured path, `PATH`, then the system's kernel directory.
pub fn sldreg_client(
    settings: &RegistrationSettings,
    sid: &Sid,
) -> ControlResult<Sldreg<ProcessRunner>> {
    let executable = find_executable(
        "sldreg",
        settings.sldreg.as_deref(),
        &[sldreg_kernel_path(sid.as_str())],
    )?;
    debug!(path = %executable, "using sldreg");
    Ok(Sldreg::new(ProcessRunner::default(), executable, Some(sid.adm_user()))
        .with_timeout(settings.sldreg_timeout))
}

/// [`ControlPort`] over the `sapcontrol` CLI.
pub struct SapControlPort<R> {
    client: SapControl<R>,
    start_timeout: Duration,
}

impl<R: CommandRunner> SapControlPort<R> {
    pub fn new(client: SapControl<R>, start_timeout: Duration) -> Self {
        Self {
            client,
            start_timeout,
        }
    }
}

impl<R: CommandRunner> ControlPort for SapControlPort<R> {
    fn status(&self, target: &InstanceTarget) -> ControlResult<bool> {
        self.client.status(target)
    }

    fn start(&self, target: &InstanceTarget) -> ControlResult<bool> {
        self.client.start(target, self.start_timeout)
    }

    fn stop(&self, target: &InstanceTarget) -> ControlResult<bool> {
        self.client.stop(target)
    }

    fn restart(&self, target: &InstanceTarget) -> ControlResult<bool> {
        self.client.restart(target, self.start_timeout)
    }

    fn syslog_errors(
        &self,
        target: &InstanceTarget,
        since: NaiveDateTime,
        severities: &[DispStatus],
    ) -> ControlResult<Vec<SyslogEntry>> {
        self.client.get_syslog_errors(target, since, severities)
    }

    fn workprocess_table(&self, target: &InstanceTarget) -> ControlResult<Vec<WorkProcess>> {
        self.client.get_workprocess_table(target)
    }
}

/// [`ControlPort`] that locates `sapcontrol` on first use, so a state that
/// never calls the control interface runs without the binary.
pub struct LazySapControlPort {
    settings: ControlSettings,
    sid: Sid,
    port: OnceCell<SapControlPort<ProcessRunner>>,
}

impl LazySapControlPort {
    pub fn new(settings: ControlSettings, sid: Sid) -> Self {
        Self {
            settings,
            sid,
            port: OnceCell::new(),
        }
    }

    fn port(&self) -> ControlResult<&SapControlPort<ProcessRunner>> {
        if let Some(port) = self.port.get() {
            return Ok(port);
        }
        let client = sapcontrol_client(&self.settings, &self.sid)?;
        Ok(self
            .port
            .get_or_init(|| SapControlPort::new(client, self.settings.start_timeout)))
    }
}

impl ControlPort for LazySapControlPort {
    fn status(&self, target: &InstanceTarget) -> ControlResult<bool> {
        self.port()?.status(target)
    }

    fn start(&self, target: &InstanceTarget) -> ControlResult<bool> {
        self.port()?.start(target)
    }

    fn stop(&self, target: &InstanceTarget) -> ControlResult<bool> {
        self.port()?.stop(target)
    }

    fn restart(&self, target: &InstanceTarget) -> ControlResult<bool> {
        self.port()?.restart(target)
    }

    fn syslog_errors(
        &self,
        target: &InstanceTarget,
        since: NaiveDateTime,
        severities: &[DispStatus],
    ) -> ControlResult<Vec<SyslogEntry>> {
        self.port()?.syslog_errors(target, since, severities)
    }

    fn workprocess_table(&self, target: &InstanceTarget) -> ControlResult<Vec<WorkProcess>> {
        self.port()?.workprocess_table(target)
    }
}

/// Destination config maintained by `sldreg`.
pub struct SldregDestinationStore<R> {
    sldreg: Sldreg<R>,
}

impl<R: CommandRunner> SldregDestinationStore<R> {
    pub fn new(sldreg: Sldreg<R>) -> Self {
        Self { sldreg }
    }
}

impl<R: CommandRunner> DestinationStore for SldregDestinationStore<R> {
    fn read(&self, dest: &SldDestination) -> anyhow::Result<Option<ObservedDestination>> {
        if !dest.config_path.exists() {
            return Ok(None);
        }
        let out = self.sldreg.show_connect(&dest.config_path)?;
        Ok(Some(parse_showconnect(&out)))
    }

    fn write(&self, dest: &SldDestination) -> anyhow::Result<()> {
        if let Some(parent) = dest.config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent dir for {}", dest.config_path))?;
        }
        self.sldreg.configure(dest)?;
        Ok(())
    }
}

/// Destination config as a plain `key=value` file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDestinationStore;

impl DestinationStore for FsDestinationStore {
    fn read(&self, dest: &SldDestination) -> anyhow::Result<Option<ObservedDestination>> {
        let path = &dest.config_path;
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        let observed = parse_destination_file(&text).with_context(|| format!("parse {path}"))?;
        Ok(Some(observed))
    }

    fn write(&self, dest: &SldDestination) -> anyhow::Result<()> {
        let contents = sapstate_domain::render_destination_file(dest)?;
        let path = &dest.config_path;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create parent dir for {path}"))?;
        }
        write_private(path, contents.as_bytes())
    }
}

/// Write through a sibling file created with mode 0600 and renamed over
/// `path`, so the password is never readable under a wider mode.
#[cfg(unix)]
fn write_private(path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let file_name = path.file_name().unwrap_or("slddest.cfg");
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    match fs::remove_file(&tmp) {
        Err(err) if err.kind() != ErrorKind::NotFound => return Err(err.into()),
        _ => {}
    }
    let written = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(&tmp)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        })
        .with_context(|| format!("write {tmp}"));
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
    fs::write(path, contents)?;
    Ok(())
}

/// Registration logs on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLogStore;

impl LogView for FsLogStore {
    fn exists(&self, path: &Utf8Path) -> bool {
        FsLogView.exists(path)
    }

    fn read_to_string(&self, path: &Utf8Path) -> anyhow::Result<String> {
        FsLogView.read_to_string(path)
    }
}

impl LogStore for FsLogStore {
    fn remove(&self, path: &Utf8Path) -> anyhow::Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

/// Resolves `env:NAME`, `file:PATH` or a literal value.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefCredentialProvider;

impl CredentialProvider for RefCredentialProvider {
    fn resolve(&self, reference: &str) -> anyhow::Result<Secret> {
        if let Some(name) = reference.strip_prefix("env:") {
            let value = std::env::var(name)
                .with_context(|| format!("environment variable {name} is not set"))?;
            return Ok(Secret::new(value));
        }
        if let Some(path) = reference.strip_prefix("file:") {
            let raw = fs::read_to_string(path)?;
            let value = raw.strip_suffix('\n').unwrap_or(&raw);
            let value = value.strip_suffix('\r').unwrap_or(value);
            return Ok(Secret::new(value));
        }
        Ok(Secret::new(reference))
    }
}
