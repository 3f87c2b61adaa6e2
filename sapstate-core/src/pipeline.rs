//! State pipelines.
//!
//! Every entry point returns a [`StateResult`]. State-level failures are folded
//! into it (`result = Some(false)`, `failure = Some(kind)`) together with the
//! changes made before the failure.

use crate::error::StateError;
use crate::ports::{ControlPort, DestinationStore, LogStore};
use crate::settings::{HealthSettings, RegistrationSettings, ServiceSettings};
use sapstate_control::ControlError;
use sapstate_domain::{
    CodecError, HealthPolicy, LogState, SuccessMarker, UpdateReason, destination_fingerprint,
    evaluate_health, evaluate_logs, parse_check_from, plan_update,
};
use sapstate_types::{InstanceTarget, LogFileSet, SldDestination, StateResult};
use serde_json::json;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Inputs of [`sld_registered`].
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub target: InstanceTarget,
    pub destination: SldDestination,
    pub logs: LogFileSet,
}

/// Build a failed result for a state that could not start, e.g. because a
/// binary is missing.
pub fn failed(name: impl Into<String>, err: &StateError) -> StateResult {
    let mut ret = StateResult::new(name);
    ret.fail(err.kind(), err.to_string());
    ret
}

fn finish(mut ret: StateResult, outcome: Result<String, StateError>, test: bool) -> StateResult {
    match outcome {
        Ok(comment) => ret.succeed(comment, test),
        Err(err) => {
            error!(state = %ret.name, failure = %err.kind(), "{err}");
            ret.fail(err.kind(), err.to_string());
        }
    }
    ret
}

/// Ensure the SLD destination config matches `req.destination` and that the
/// instance re-sent its landscape data.
pub fn sld_registered(
    req: &RegistrationRequest,
    settings: &RegistrationSettings,
    store: &dyn DestinationStore,
    logs: &dyn LogStore,
    control: &dyn ControlPort,
) -> StateResult {
    let mut ret = StateResult::new(req.destination.config_path.as_str());
    let outcome = register(req, settings, store, logs, control, &mut ret);
    finish(ret, outcome, settings.test)
}

fn register(
    req: &RegistrationRequest,
    settings: &RegistrationSettings,
    store: &dyn DestinationStore,
    logs: &dyn LogStore,
    control: &dyn ControlPort,
    ret: &mut StateResult,
) -> Result<String, StateError> {
    let dest = &req.destination;
    let name = dest.config_path.as_str();
    let test = settings.test;

    let marker = SuccessMarker::new(&settings.marker, &settings.expected_code)
        .map_err(|e| StateError::InvalidInput(e.to_string()))?;

    let reason = if settings.overwrite {
        UpdateReason::Overwrite
    } else {
        debug!(config = %name, "checking for existing config");
        match store.read(dest) {
            Ok(observed) => match plan_update(dest, observed.as_ref(), false) {
                Some(reason) => reason,
                None => return Ok("No changes required".to_string()),
            },
            Err(err) if is_unparseable(&err) => {
                warn!(
                    config = %name,
                    error = %format!("{err:#}"),
                    "existing config cannot be parsed"
                );
                UpdateReason::Unreadable
            }
            Err(err) => {
                return Err(StateError::from_adapter(err, |message| {
                    StateError::ConfigUnreadable {
                        path: name.to_string(),
                        message,
                    }
                }));
            }
        }
    };
    debug!(config = %name, %reason, "updating configuration");

    if test {
        ret.record_change("config", format!("Configuration {name} would have been updated"));
    } else {
        store.write(dest).map_err(|err| {
            StateError::from_adapter(err, |message| StateError::ConfigUnwritable {
                path: name.to_string(),
                message,
            })
        })?;
        ret.record_change("config", format!("Configuration {name} updated"));
    }
    ret.record_change(
        "destination",
        json!({
            "endpoint": dest.endpoint(),
            "user": dest.user,
            "fingerprint": destination_fingerprint(dest),
            "reason": reason.to_string(),
        }),
    );

    if settings.remove_logs {
        remove_logs(&req.logs, logs, test, ret)?;
    }

    debug!(instance = %req.target.label(), "restarting sapcontrol to trigger SLD data transfer");
    if test {
        ret.record_change("sapcontrol", "Would have been restarted");
    } else {
        let restarted = control
            .restart(&req.target)
            .map_err(|e| StateError::from(e).context("Could not restart sapcontrol"))?;
        if !restarted {
            return Err(StateError::ControlFailed(
                "Could not restart sapcontrol".to_string(),
            ));
        }
        ret.record_change("sapcontrol", "Restarted");
    }

    if req.logs.is_empty() {
        return Ok(if test {
            "SLD registration would have been successful".to_string()
        } else {
            "SLD registration successful".to_string()
        });
    }
    if test {
        return Ok("SLD registration and data transfer would have been successful".to_string());
    }

    await_confirmation(&marker, &req.logs, logs, settings)?;
    info!(config = %name, "SLD data transfer confirmed");
    Ok("SLD registration and data transfer successful".to_string())
}

/// Content the backend rejected, as opposed to a file it could not access.
fn is_unparseable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<CodecError>().is_some()
        || matches!(
            err.downcast_ref::<ControlError>(),
            Some(ControlError::Failed { .. } | ControlError::Parse { .. })
        )
}

fn remove_logs(
    set: &LogFileSet,
    logs: &dyn LogStore,
    test: bool,
    ret: &mut StateResult,
) -> Result<(), StateError> {
    for path in set.iter() {
        if test {
            if logs.exists(path) {
                ret.push_change("log_files", format!("Would have removed {path}"));
            }
            continue;
        }
        let removed = logs
            .remove(path)
            .map_err(|err| StateError::LogCleanupFailed {
                path: path.to_string(),
                message: format!("{err:#}"),
            })?;
        if removed {
            debug!(%path, "removed log file");
            ret.push_change("log_files", format!("Removed {path}"));
        }
    }
    Ok(())
}

/// Poll until every log's last marker carries the expected code.
fn await_confirmation(
    marker: &SuccessMarker,
    set: &LogFileSet,
    logs: &dyn LogStore,
    settings: &RegistrationSettings,
) -> Result<(), StateError> {
    let deadline = Instant::now() + settings.check_timeout;
    loop {
        let states = evaluate_logs(marker, logs, set);
        if states.iter().all(|(_, s)| s.is_confirmed()) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            let pending = states
                .into_iter()
                .filter_map(|(path, state)| match state {
                    LogState::Confirmed => None,
                    LogState::Missing => Some(format!("{path} (missing)")),
                    LogState::Pending { last_code: None } => Some(format!("{path} (no marker)")),
                    LogState::Pending {
                        last_code: Some(code),
                    } => Some(format!("{path} (last code {code})")),
                })
                .collect();
            return Err(StateError::ConfirmationTimeout {
                secs: settings.check_timeout.as_secs(),
                pending,
            });
        }
        thread::sleep(settings.poll_interval);
    }
}

/// Status errors other than "not running" mean the state cannot tell.
fn status_error(err: ControlError, target: &InstanceTarget) -> StateError {
    let prefix = format!(
        "Cannot retrieve status for sapcontrol / instance {}",
        target.instance_number
    );
    match StateError::from(err) {
        StateError::ControlFailed(m) => StateError::ControlUnreachable(m),
        other => other,
    }
    .context(&prefix)
}

/// Ensure `sapstartsrv` is up for the instance.
pub fn running(
    target: &InstanceTarget,
    settings: &ServiceSettings,
    control: &dyn ControlPort,
) -> StateResult {
    let mut ret = StateResult::new(target.sid.as_str());
    let outcome = ensure_running(target, settings, control, &mut ret);
    finish(ret, outcome, settings.test)
}

fn ensure_running(
    target: &InstanceTarget,
    settings: &ServiceSettings,
    control: &dyn ControlPort,
    ret: &mut StateResult,
) -> Result<String, StateError> {
    let label = target.label();
    let up = control
        .status(target)
        .map_err(|e| status_error(e, target))?;

    if up {
        debug!(instance = %label, "sapcontrol is running");
        if !settings.restart {
            return Ok("sapcontrol is already running".to_string());
        }
        if settings.test {
            ret.record_change("old", format!("sapcontrol for {label} was running"));
            ret.record_change("new", format!("sapcontrol for {label} would have been restarted"));
            return Ok("sapcontrol would have been restarted".to_string());
        }
        let cannot = format!("Cannot start sapcontrol {label}");
        let ok = control
            .restart(target)
            .map_err(|e| StateError::from(e).context(&cannot))?;
        if !ok {
            return Err(StateError::ControlFailed(cannot));
        }
        ret.record_change("old", format!("sapcontrol for {label} was running"));
        ret.record_change("new", format!("sapcontrol for {label} was restarted"));
        return Ok("sapcontrol was restarted".to_string());
    }

    debug!(instance = %label, "sapcontrol is not running, starting");
    if settings.test {
        ret.record_change("old", format!("sapcontrol for {label} was not running"));
        ret.record_change("new", format!("sapcontrol for {label} would have been started"));
        return Ok("sapcontrol would have been started".to_string());
    }
    let cannot = format!("Cannot start sapcontrol {label}");
    let ok = control
        .start(target)
        .map_err(|e| StateError::from(e).context(&cannot))?;
    if !ok {
        return Err(StateError::ControlFailed(cannot));
    }
    ret.record_change("old", format!("sapcontrol for {label} was not running"));
    ret.record_change("new", format!("sapcontrol for {label} was started"));
    Ok("sapcontrol was started".to_string())
}

/// Ensure `sapstartsrv` is stopped for the instance.
pub fn dead(
    target: &InstanceTarget,
    settings: &ServiceSettings,
    control: &dyn ControlPort,
) -> StateResult {
    let mut ret = StateResult::new(target.sid.as_str());
    let outcome = ensure_dead(target, settings, control, &mut ret);
    finish(ret, outcome, settings.test)
}

fn ensure_dead(
    target: &InstanceTarget,
    settings: &ServiceSettings,
    control: &dyn ControlPort,
    ret: &mut StateResult,
) -> Result<String, StateError> {
    let label = target.label();
    let up = control
        .status(target)
        .map_err(|e| status_error(e, target))?;
    if !up {
        return Ok("sapcontrol is already stopped".to_string());
    }

    debug!(instance = %label, "sapcontrol is running, stopping");
    if settings.test {
        ret.record_change("old", format!("sapcontrol for {label} is running"));
        ret.record_change("new", format!("sapcontrol for {label} would have been stopped"));
        return Ok("sapcontrol would have been stopped".to_string());
    }
    let ok = control
        .stop(target)
        .map_err(|e| StateError::from(e).context("Cannot stop sapcontrol"))?;
    if !ok {
        return Err(StateError::ControlFailed("Cannot stop sapcontrol".to_string()));
    }
    ret.record_change("old", format!("sapcontrol for {label} was running"));
    ret.record_change("new", format!("sapcontrol for {label} is not running"));
    Ok("sapcontrol was stopped".to_string())
}

/// Check SM21 and SM50 for problems since `check_from` (`DDMMYYYY`).
///
/// Changes nothing, so there is no test-mode variant.
pub fn system_health_ok(
    target: &InstanceTarget,
    check_from: &str,
    settings: &HealthSettings,
    control: &dyn ControlPort,
) -> StateResult {
    let ret = StateResult::new(target.sid.as_str());
    let outcome = check_health(target, check_from, settings, control);
    finish(ret, outcome, false)
}

fn check_health(
    target: &InstanceTarget,
    check_from: &str,
    settings: &HealthSettings,
    control: &dyn ControlPort,
) -> Result<String, StateError> {
    let since =
        parse_check_from(check_from).map_err(|e| StateError::InvalidInput(e.to_string()))?;
    let policy = HealthPolicy {
        severities: settings.severities.clone(),
        non_critical: settings.non_critical.clone(),
    };

    debug!(instance = %target.label(), %since, "checking system log");
    let syslog = control
        .syslog_errors(target, since, &policy.severities)
        .map_err(|e| StateError::from(e).context("Cannot read system log"))?;

    debug!(instance = %target.label(), "checking for work process errors");
    let report = match control.workprocess_table(target) {
        Ok(table) => evaluate_health(&syslog, &table, since, &policy),
        Err(err) => {
            warn!(instance = %target.label(), error = %err, "cannot retrieve workprocess table");
            let mut report = evaluate_health(&syslog, &[], since, &policy);
            report
                .problems
                .push(format!("Cannot retrieve workprocess table: {err}"));
            report
        }
    };
    if report.is_ok() {
        Ok("System health OK".to_string())
    } else {
        Err(StateError::HealthDegraded {
            problems: report.problems,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FsDestinationStore, FsLogStore};
    use camino::Utf8PathBuf;
    use chrono::NaiveDateTime;
    use fs_err as fs;
    use pretty_assertions::assert_eq;
    use sapstate_control::ControlResult;
    use sapstate_domain::LogView;
    use sapstate_types::control::{DispStatus, SyslogEntry, WorkProcess};
    use sapstate_types::{FailureKind, InstanceNumber, Secret, Sid};
    use std::cell::RefCell;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct StubControl {
        running: RefCell<bool>,
        restart_error: Option<fn() -> ControlError>,
        /// Written with this content on every restart/start.
        write_on_restart: Vec<(Utf8PathBuf, String)>,
        syslog: Vec<SyslogEntry>,
        workprocesses: Vec<WorkProcess>,
        wp_error: Option<fn() -> ControlError>,
        calls: RefCell<Vec<&'static str>>,
    }

    impl StubControl {
        fn touch_logs(&self) {
            for (path, text) in &self.write_on_restart {
                fs::write(path, text).expect("write log");
            }
        }
    }

    impl ControlPort for StubControl {
        fn status(&self, _: &InstanceTarget) -> ControlResult<bool> {
            self.calls.borrow_mut().push("status");
            Ok(*self.running.borrow())
        }

        fn start(&self, _: &InstanceTarget) -> ControlResult<bool> {
            self.calls.borrow_mut().push("start");
            *self.running.borrow_mut() = true;
            self.touch_logs();
            Ok(true)
        }

        fn stop(&self, _: &InstanceTarget) -> ControlResult<bool> {
            self.calls.borrow_mut().push("stop");
            *self.running.borrow_mut() = false;
            Ok(true)
        }

        fn restart(&self, _: &InstanceTarget) -> ControlResult<bool> {
            self.calls.borrow_mut().push("restart");
            if let Some(make) = self.restart_error {
                return Err(make());
            }
            *self.running.borrow_mut() = true;
            self.touch_logs();
            Ok(true)
        }

        fn syslog_errors(
            &self,
            _: &InstanceTarget,
            since: NaiveDateTime,
            severities: &[DispStatus],
        ) -> ControlResult<Vec<SyslogEntry>> {
            Ok(self
                .syslog
                .iter()
                .filter(|e| e.time > since && severities.contains(&e.severity))
                .cloned()
                .collect())
        }

        fn workprocess_table(&self, _: &InstanceTarget) -> ControlResult<Vec<WorkProcess>> {
            if let Some(make) = self.wp_error {
                return Err(make());
            }
            Ok(self.workprocesses.clone())
        }
    }

    struct Fixture {
        _dir: TempDir,
        root: Utf8PathBuf,
        req: RegistrationRequest,
    }

    fn fixture(log_names: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let target = InstanceTarget::new(
            "S4H".parse::<Sid>().unwrap(),
            InstanceNumber::new(0).unwrap(),
            "s4hadm",
            Secret::new("os-secret"),
        );
        let destination = SldDestination::new(
            root.join("usr/sap/S4H/SYS/global/slddest.cfg"),
            "SLD_DS_USER",
            Secret::new("sld-secret"),
            "sol.my.domain",
            50000,
        );
        let logs = LogFileSet::new(log_names.iter().map(|n| root.join(n)).collect());
        Fixture {
            _dir: dir,
            root,
            req: RegistrationRequest {
                target,
                destination,
                logs,
            },
        }
    }

    fn quick() -> RegistrationSettings {
        RegistrationSettings {
            check_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
            ..RegistrationSettings::default()
        }
    }

    fn success_logs(fx: &Fixture) -> Vec<(Utf8PathBuf, String)> {
        fx.req
            .logs
            .iter()
            .map(|p| (p.to_path_buf(), "Return code: 401\nReturn code: 200\n".to_string()))
            .collect()
    }

    #[test]
    fn second_run_is_unchanged() {
        let fx = fixture(&["dev_sldregs", "dev_krnlreg"]);
        let control = StubControl {
            write_on_restart: success_logs(&fx),
            ..StubControl::default()
        };

        let first = sld_registered(&fx.req, &quick(), &FsDestinationStore, &FsLogStore, &control);
        assert_eq!(first.result, Some(true), "{}", first.comment);
        assert!(first.changed);
        assert_eq!(first.comment, "SLD registration and data transfer successful");
        assert_eq!(first.changes["sapcontrol"], "Restarted");
        assert!(fx.req.destination.config_path.is_file());

        let second = sld_registered(&fx.req, &quick(), &FsDestinationStore, &FsLogStore, &control);
        assert_eq!(second.result, Some(true));
        assert!(!second.changed);
        assert_eq!(second.comment, "No changes required");
        assert_eq!(*control.calls.borrow(), vec!["restart"]);
    }

    #[test]
    fn written_file_holds_exact_parameters() {
        let fx = fixture(&[]);
        let control = StubControl::default();
        let ret = sld_registered(&fx.req, &quick(), &FsDestinationStore, &FsLogStore, &control);
        assert_eq!(ret.comment, "SLD registration successful");

        let text = fs::read_to_string(&fx.req.destination.config_path).unwrap();
        assert_eq!(
            text,
            "host=sol.my.domain\nport=50000\nuser=SLD_DS_USER\npassword=sld-secret\nhttps=y\n"
        );
    }

    #[test]
    fn missing_marker_times_out() {
        let fx = fixture(&["dev_sldregs"]);
        let control = StubControl {
            write_on_restart: vec![(fx.root.join("dev_sldregs"), "Return code: 500\n".into())],
            ..StubControl::default()
        };
        let ret = sld_registered(&fx.req, &quick(), &FsDestinationStore, &FsLogStore, &control);
        assert_eq!(ret.result, Some(false));
        assert_eq!(ret.failure, Some(FailureKind::ConfirmationTimeout));
        assert!(ret.comment.starts_with("SLD data transfer not successful"));
        assert!(ret.comment.contains("last code 500"));
        assert!(ret.changes.contains_key("config"));
    }

    #[test]
    fn stale_logs_are_removed_before_trigger() {
        let fx = fixture(&["dev_sldregs"]);
        let log = fx.root.join("dev_sldregs");
        fs::write(&log, "Return code: 200\n").unwrap();
        let control = StubControl::default();

        let ret = sld_registered(&fx.req, &quick(), &FsDestinationStore, &FsLogStore, &control);
        assert_eq!(ret.failure, Some(FailureKind::ConfirmationTimeout));
        assert_eq!(ret.changes["log_files"], json!([format!("Removed {log}")]));
        assert!(ret.comment.contains("(missing)"));
    }

    #[test]
    fn test_mode_touches_nothing() {
        let fx = fixture(&["dev_sldregs"]);
        let log = fx.root.join("dev_sldregs");
        fs::write(&log, "old\n").unwrap();
        let control = StubControl::default();
        let settings = RegistrationSettings {
            test: true,
            ..quick()
        };

        let ret = sld_registered(&fx.req, &settings, &FsDestinationStore, &FsLogStore, &control);
        assert_eq!(ret.result, None);
        assert!(ret.changed);
        assert_eq!(
            ret.comment,
            "SLD registration and data transfer would have been successful"
        );
        assert_eq!(ret.changes["sapcontrol"], "Would have been restarted");
        assert!(!fx.req.destination.config_path.exists());
        assert!(FsLogStore.exists(&log));
        assert!(control.calls.borrow().is_empty());
    }

    fn rejected() -> ControlError {
        ControlError::InvalidCredentials {
            function: "RestartService".into(),
            message: "Invalid Credentials".into(),
        }
    }

    #[test]
    fn rejected_credentials_keep_config_change() {
        let fx = fixture(&[]);
        let control = StubControl {
            running: RefCell::new(true),
            restart_error: Some(rejected as fn() -> ControlError),
            ..StubControl::default()
        };
        let ret = sld_registered(&fx.req, &quick(), &FsDestinationStore, &FsLogStore, &control);
        assert_eq!(ret.result, Some(false));
        assert_eq!(ret.failure, Some(FailureKind::CredentialsRejected));
        assert!(ret.comment.starts_with("Could not restart sapcontrol"));
        assert!(ret.changes.contains_key("config"));
        assert!(!ret.changes.contains_key("sapcontrol"));
    }

    #[test]
    fn changed_port_rewrites() {
        let fx = fixture(&[]);
        let control = StubControl::default();
        sld_registered(&fx.req, &quick(), &FsDestinationStore, &FsLogStore, &control);

        let mut moved = fx.req.clone();
        moved.destination.port = 50001;
        let ret = sld_registered(&moved, &quick(), &FsDestinationStore, &FsLogStore, &control);
        assert!(ret.changed);
        assert_eq!(ret.changes["destination"]["reason"], "differs in port");
    }

    #[test]
    fn corrupt_config_is_rewritten() {
        let fx = fixture(&[]);
        let path = &fx.req.destination.config_path;
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "garbage line\n").unwrap();

        let control = StubControl::default();
        let ret = sld_registered(&fx.req, &quick(), &FsDestinationStore, &FsLogStore, &control);
        assert_eq!(ret.result, Some(true), "{}", ret.comment);
        assert_eq!(
            ret.changes["destination"]["reason"],
            "existing configuration cannot be parsed"
        );
        assert!(fs::read_to_string(path).unwrap().starts_with("host=sol.my.domain\n"));
    }

    #[test]
    fn overwrite_skips_reading_the_config() {
        let fx = fixture(&[]);
        let path = &fx.req.destination.config_path;
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "garbage line\n").unwrap();
        let settings = RegistrationSettings {
            overwrite: true,
            ..quick()
        };

        let control = StubControl::default();
        let ret = sld_registered(&fx.req, &settings, &FsDestinationStore, &FsLogStore, &control);
        assert_eq!(ret.result, Some(true), "{}", ret.comment);
        assert_eq!(ret.changes["destination"]["reason"], "overwrite requested");

        // A converged config is rewritten too.
        let ret = sld_registered(&fx.req, &settings, &FsDestinationStore, &FsLogStore, &control);
        assert!(ret.changed);
        assert_eq!(*control.calls.borrow(), vec!["restart", "restart"]);
    }

    #[cfg(unix)]
    #[test]
    fn inaccessible_config_is_unreadable() {
        let fx = fixture(&[]);
        let path = &fx.req.destination.config_path;
        // A directory where the file should be cannot be read as text.
        fs::create_dir_all(path).unwrap();

        let control = StubControl::default();
        let ret = sld_registered(&fx.req, &quick(), &FsDestinationStore, &FsLogStore, &control);
        assert_eq!(ret.failure, Some(FailureKind::ConfigUnreadable));
        assert!(control.calls.borrow().is_empty());
    }

    #[test]
    fn unwritable_config_is_reported() {
        let fx = fixture(&[]);
        fs::create_dir_all(fx.root.join("blocked")).unwrap();
        fs::write(fx.root.join("blocked/file"), "").unwrap();
        let mut req = fx.req.clone();
        req.destination.config_path = fx.root.join("blocked/file/slddest.cfg");

        let control = StubControl::default();
        let ret = sld_registered(&req, &quick(), &FsDestinationStore, &FsLogStore, &control);
        assert_eq!(ret.failure, Some(FailureKind::ConfigUnwritable));
        assert!(ret.comment.starts_with("Could not update configuration"));
    }

    #[test]
    fn bad_marker_is_invalid_input() {
        let fx = fixture(&[]);
        let settings = RegistrationSettings {
            marker: "Return code: [0-9]+".into(),
            ..quick()
        };
        let control = StubControl::default();
        let ret = sld_registered(&fx.req, &settings, &FsDestinationStore, &FsLogStore, &control);
        assert_eq!(ret.failure, Some(FailureKind::InvalidInput));
    }

    #[test]
    fn running_branches() {
        let fx = fixture(&[]);
        let target = &fx.req.target;

        let control = StubControl::default();
        let ret = running(target, &ServiceSettings::default(), &control);
        assert_eq!(ret.comment, "sapcontrol was started");
        assert_eq!(ret.changes["new"], "sapcontrol for S4H / 00 was started");

        let ret = running(target, &ServiceSettings::default(), &control);
        assert_eq!(ret.comment, "sapcontrol is already running");
        assert!(!ret.changed);

        let restart = ServiceSettings {
            restart: true,
            test: true,
        };
        let ret = running(target, &restart, &control);
        assert_eq!(ret.result, None);
        assert_eq!(ret.comment, "sapcontrol would have been restarted");
        assert_eq!(*control.calls.borrow(), vec!["status", "start", "status", "status"]);
    }

    #[test]
    fn dead_branches() {
        let fx = fixture(&[]);
        let target = &fx.req.target;
        let control = StubControl {
            running: RefCell::new(true),
            ..StubControl::default()
        };

        let ret = dead(target, &ServiceSettings::default(), &control);
        assert_eq!(ret.result, Some(true));
        assert_eq!(ret.comment, "sapcontrol was stopped");
        assert_eq!(ret.changes["new"], "sapcontrol for S4H / 00 is not running");

        let ret = dead(target, &ServiceSettings::default(), &control);
        assert_eq!(ret.comment, "sapcontrol is already stopped");
        assert!(!ret.changed);
    }

    struct BrokenStatus;

    impl ControlPort for BrokenStatus {
        fn status(&self, _: &InstanceTarget) -> ControlResult<bool> {
            Err(ControlError::Failed {
                function: "GetProcessList".into(),
                message: "garbled".into(),
            })
        }
        fn start(&self, _: &InstanceTarget) -> ControlResult<bool> {
            unreachable!()
        }
        fn stop(&self, _: &InstanceTarget) -> ControlResult<bool> {
            unreachable!()
        }
        fn restart(&self, _: &InstanceTarget) -> ControlResult<bool> {
            unreachable!()
        }
        fn syslog_errors(
            &self,
            _: &InstanceTarget,
            _: NaiveDateTime,
            _: &[DispStatus],
        ) -> ControlResult<Vec<SyslogEntry>> {
            unreachable!()
        }
        fn workprocess_table(&self, _: &InstanceTarget) -> ControlResult<Vec<WorkProcess>> {
            unreachable!()
        }
    }

    #[test]
    fn unknown_status_is_unreachable() {
        let fx = fixture(&[]);
        let ret = dead(&fx.req.target, &ServiceSettings::default(), &BrokenStatus);
        assert_eq!(ret.failure, Some(FailureKind::ControlUnreachable));
        assert!(
            ret.comment
                .starts_with("Cannot retrieve status for sapcontrol / instance 00")
        );
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn health_reports_problems() {
        let fx = fixture(&[]);
        let control = StubControl {
            syslog: vec![
                SyslogEntry {
                    time: ts("2024-03-02 10:00:00"),
                    severity: DispStatus::Red,
                    text: "Database   error".into(),
                },
                SyslogEntry {
                    time: ts("2024-02-28 10:00:00"),
                    severity: DispStatus::Red,
                    text: "too old".into(),
                },
            ],
            workprocesses: vec![WorkProcess {
                no: 3,
                typ: "DIA".into(),
                pid: Some(4711),
                status: "Ended".into(),
                ..WorkProcess::default()
            }],
            ..StubControl::default()
        };

        let ret = system_health_ok(
            &fx.req.target,
            "01032024",
            &HealthSettings::default(),
            &control,
        );
        assert_eq!(ret.failure, Some(FailureKind::HealthDegraded));
        assert_eq!(
            ret.comment,
            "SM21: Database error\nSM50: DIA work process 3 (PID: 4711) is in status Ended with error ''"
        );
    }

    fn wp_unreachable() -> ControlError {
        ControlError::Unreachable {
            function: "ABAPGetSystemWPTable".into(),
            message: "NIECONN_REFUSED".into(),
        }
    }

    #[test]
    fn health_keeps_syslog_problems_when_wp_table_fails() {
        let fx = fixture(&[]);
        let control = StubControl {
            syslog: vec![SyslogEntry {
                time: ts("2024-03-02 10:00:00"),
                severity: DispStatus::Red,
                text: "Database error".into(),
            }],
            wp_error: Some(wp_unreachable as fn() -> ControlError),
            ..StubControl::default()
        };

        let ret = system_health_ok(
            &fx.req.target,
            "01032024",
            &HealthSettings::default(),
            &control,
        );
        assert_eq!(ret.failure, Some(FailureKind::HealthDegraded));
        let lines: Vec<&str> = ret.comment.lines().collect();
        assert_eq!(lines[0], "SM21: Database error");
        assert!(lines[1].starts_with("Cannot retrieve workprocess table"));
    }

    #[test]
    fn healthy_system() {
        let fx = fixture(&[]);
        let ret = system_health_ok(
            &fx.req.target,
            "01032024",
            &HealthSettings::default(),
            &StubControl::default(),
        );
        assert_eq!(ret.result, Some(true));
        assert_eq!(ret.comment, "System health OK");
    }

    #[test]
    fn health_rejects_bad_date() {
        let fx = fixture(&[]);
        let ret = system_health_ok(
            &fx.req.target,
            "2024-03-01",
            &HealthSettings::default(),
            &StubControl::default(),
        );
        assert_eq!(ret.failure, Some(FailureKind::InvalidInput));
    }
}
