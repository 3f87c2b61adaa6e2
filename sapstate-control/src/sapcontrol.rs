use crate::error::{ControlError, ControlResult};
use crate::locate::{local_short_hostname, short_hostname};
use crate::output::{Record, Reply, classify_failure, parse_reply};
use crate::runner::{CommandRunner, CommandSpec};
use camino::Utf8PathBuf;
use chrono::NaiveDateTime;
use sapstate_types::InstanceTarget;
use sapstate_types::control::{
    AbapComponent, DispStatus, ProcessInfo, SyslogEntry, SystemInstance, SystemLevel, WorkProcess,
};
use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

/// Timestamp format of `ABAPReadSyslog` entries.
pub const SYSLOG_TIME_FORMAT: &str = "%Y %m %d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct SapControlOptions {
    pub executable: Utf8PathBuf,
    /// Host to connect to. `None` talks to the local `sapstartsrv`.
    pub fqdn: Option<String>,
    /// Retry a refused HTTPS connection once over plain HTTP.
    pub fallback: bool,
    pub timeout: Duration,
    /// OS user for `StartService` / `StopService`.
    pub run_as: Option<String>,
    pub poll_interval: Duration,
}

impl SapControlOptions {
    pub fn new(executable: impl Into<Utf8PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            fqdn: None,
            fallback: true,
            timeout: Duration::from_secs(300),
            run_as: None,
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Https,
    Http,
}

impl Protocol {
    pub fn as_arg(self) -> &'static str {
        match self {
            Protocol::Https => "NI_HTTPS",
            Protocol::Http => "NI_HTTP",
        }
    }
}

/// Client for the `sapcontrol` command line tool.
pub struct SapControl<R> {
    runner: R,
    opts: SapControlOptions,
}

impl<R: CommandRunner> SapControl<R> {
    pub fn new(runner: R, opts: SapControlOptions) -> Self {
        Self { runner, opts }
    }

    fn base_spec(&self, target: &InstanceTarget) -> CommandSpec {
        CommandSpec::new(self.opts.executable.as_str())
            .args(["-nr".to_string(), target.instance_number.to_string()])
            .timeout(self.opts.timeout)
    }

    fn remote_spec(
        &self,
        target: &InstanceTarget,
        protocol: Option<Protocol>,
        function: &str,
        args: &[String],
    ) -> CommandSpec {
        let mut spec = self.base_spec(target);
        if let Some(host) = &self.opts.fqdn {
            spec = spec.args(["-host", host.as_str()]);
        }
        if let Some(p) = protocol {
            spec = spec.args(["-prot", p.as_arg()]);
        }
        spec.args(["-user", target.username.as_str()])
            .secret_arg(&target.password)
            .args(["-function", function])
            .args(args.iter().cloned())
    }

    fn execute(&self, spec: &CommandSpec, function: &str) -> ControlResult<Reply> {
        let out = self.runner.run(spec)?;
        match parse_reply(function, &out.stdout) {
            Err(ControlError::Parse { .. }) if !out.success() => {
                Err(classify_failure(function, &out.summary()))
            }
            other => other,
        }
    }

    /// Call a web-service function with the target's credentials.
    fn call(
        &self,
        target: &InstanceTarget,
        function: &str,
        args: &[String],
    ) -> ControlResult<Reply> {
        let first = self.opts.fqdn.as_ref().map(|_| Protocol::Https);
        let spec = self.remote_spec(target, first, function, args);
        match self.execute(&spec, function) {
            Err(err)
                if err.is_unreachable()
                    && self.opts.fallback
                    && first == Some(Protocol::Https) =>
            {
                tracing::warn!(
                    function,
                    error = %err,
                    "HTTPS connection failed, retrying over unencrypted HTTP"
                );
                let spec = self.remote_spec(target, Some(Protocol::Http), function, args);
                self.execute(&spec, function)
            }
            other => other,
        }
    }

    /// Call a function over the local trusted connection, as `run_as`.
    fn call_local(
        &self,
        target: &InstanceTarget,
        function: &str,
        args: &[String],
    ) -> ControlResult<Reply> {
        let spec = self
            .base_spec(target)
            .args(["-function", function])
            .args(args.iter().cloned())
            .run_as(self.opts.run_as.as_deref());
        self.execute(&spec, function)
    }

    fn target_host(&self) -> ControlResult<String> {
        match &self.opts.fqdn {
            Some(fqdn) => Ok(short_hostname(fqdn).to_string()),
            None => local_short_hostname().ok_or_else(|| ControlError::Failed {
                function: "hostname".to_string(),
                message: "cannot determine the local host name".to_string(),
            }),
        }
    }

    fn wait_until(
        &self,
        timeout: Duration,
        mut done: impl FnMut() -> ControlResult<bool>,
    ) -> ControlResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if done()? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(self.opts.poll_interval);
        }
    }

    /// Whether `sapstartsrv` answers for the instance.
    pub fn status(&self, target: &InstanceTarget) -> ControlResult<bool> {
        match self.call(target, "GetProcessList", &[]) {
            Ok(_) => Ok(true),
            Err(err) if err.is_unreachable() => {
                tracing::debug!(instance = %target.label(), error = %err, "sapcontrol not running");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// `StartService <SID>`, then wait for the service to answer.
    pub fn start(&self, target: &InstanceTarget, timeout: Duration) -> ControlResult<bool> {
        self.call_local(target, "StartService", &[target.sid.to_string()])?;
        let running = self.wait_until(timeout, || self.status(target))?;
        if !running {
            tracing::error!(
                instance = %target.label(),
                secs = timeout.as_secs(),
                "sapcontrol did not come up"
            );
        }
        Ok(running)
    }

    pub fn stop(&self, target: &InstanceTarget) -> ControlResult<bool> {
        match self.call_local(target, "StopService", &[]) {
            Ok(_) => Ok(true),
            Err(ControlError::Failed { message, .. }) => {
                tracing::error!(instance = %target.label(), %message, "could not stop sapcontrol");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// `RestartService` when running, otherwise [`SapControl::start`].
    pub fn restart(&self, target: &InstanceTarget, timeout: Duration) -> ControlResult<bool> {
        if !self.status(target)? {
            tracing::debug!(instance = %target.label(), "sapcontrol is not running, starting");
            return self.start(target, timeout);
        }
        match self.call(target, "RestartService", &[]) {
            Ok(_) => Ok(true),
            Err(ControlError::Failed { message, .. }) => {
                tracing::error!(
                    instance = %target.label(),
                    %message,
                    "could not restart sapcontrol"
                );
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    pub fn get_system_instance_list(
        &self,
        target: &InstanceTarget,
    ) -> ControlResult<Vec<SystemInstance>> {
        let function = "GetSystemInstanceList";
        let table = self.call(target, function, &[])?.table();
        table
            .records()
            .map(|rec| {
                let instance_nr = rec.parsed::<u8>("instanceNr").ok_or_else(|| ControlError::Parse {
                    function: function.to_string(),
                    message: format!("invalid instanceNr '{}'", rec.text("instanceNr")),
                })?;
                let hostname = rec.text("hostname");
                Ok(SystemInstance {
                    disp_status: disp_status(
                        &rec,
                        &format!("instance {hostname}/{instance_nr:02}"),
                    )?,
                    hostname,
                    instance_nr,
                    http_port: rec.parsed("httpPort"),
                    https_port: rec.parsed("httpsPort"),
                    start_priority: rec.text("startPriority"),
                    features: rec
                        .text("features")
                        .split('|')
                        .filter(|f| !f.is_empty())
                        .map(str::to_string)
                        .collect(),
                })
            })
            .collect()
    }

    /// Status of this host's instance in the system instance list.
    pub fn instance_status(&self, target: &InstanceTarget) -> ControlResult<DispStatus> {
        let host = self.target_host()?;
        let instances = match self.get_system_instance_list(target) {
            Ok(list) => list,
            Err(err) if err.is_unreachable() => {
                tracing::warn!(instance = %target.label(), error = %err, "cannot reach sapcontrol");
                return Ok(DispStatus::Red);
            }
            Err(err) => return Err(err),
        };
        let found = instances.into_iter().find(|i| {
            short_hostname(&i.hostname).eq_ignore_ascii_case(&host)
                && i.instance_nr == target.instance_number.value()
        });
        match found {
            Some(inst) => Ok(inst.disp_status),
            None => {
                tracing::warn!(
                    instance = %target.label(),
                    %host,
                    "instance not in system instance list"
                );
                Ok(DispStatus::Red)
            }
        }
    }

    pub fn instance_start(
        &self,
        target: &InstanceTarget,
        timeout: Duration,
    ) -> ControlResult<bool> {
        let host = self.target_host()?;
        self.call(
            target,
            "InstanceStart",
            &[host, target.instance_number.value().to_string()],
        )?;
        self.wait_for_instance(target, DispStatus::Green, timeout)
    }

    pub fn instance_stop(
        &self,
        target: &InstanceTarget,
        soft_timeout: Duration,
        timeout: Duration,
    ) -> ControlResult<bool> {
        let host = self.target_host()?;
        self.call(
            target,
            "InstanceStop",
            &[
                host,
                target.instance_number.value().to_string(),
                soft_timeout.as_secs().to_string(),
            ],
        )?;
        self.wait_for_instance(target, DispStatus::Gray, timeout)
    }

    fn wait_for_instance(
        &self,
        target: &InstanceTarget,
        wanted: DispStatus,
        timeout: Duration,
    ) -> ControlResult<bool> {
        let reached = self.wait_until(timeout, || {
            let status = self.instance_status(target)?;
            tracing::debug!(instance = %target.label(), %status, "instance status");
            Ok(status == wanted)
        })?;
        if !reached {
            tracing::error!(
                instance = %target.label(),
                wanted = %wanted,
                secs = timeout.as_secs(),
                "instance did not reach status in time"
            );
        }
        Ok(reached)
    }

    pub fn system_start(
        &self,
        target: &InstanceTarget,
        level: SystemLevel,
        wait: Duration,
    ) -> ControlResult<bool> {
        let args = [level.to_string(), wait.as_secs().to_string()];
        self.bool_call(target, "StartSystem", &args)
    }

    pub fn system_stop(
        &self,
        target: &InstanceTarget,
        level: SystemLevel,
        soft_timeout: Duration,
        wait: Duration,
    ) -> ControlResult<bool> {
        let args = [
            level.to_string(),
            soft_timeout.as_secs().to_string(),
            wait.as_secs().to_string(),
        ];
        self.bool_call(target, "StopSystem", &args)
    }

    fn bool_call(
        &self,
        target: &InstanceTarget,
        function: &str,
        args: &[String],
    ) -> ControlResult<bool> {
        match self.call(target, function, args) {
            Ok(_) => Ok(true),
            Err(ControlError::Failed { message, .. }) => {
                tracing::error!(instance = %target.label(), function, %message, "call failed");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    pub fn get_instance_properties(
        &self,
        target: &InstanceTarget,
    ) -> ControlResult<BTreeMap<String, String>> {
        let table = self.call(target, "GetInstanceProperties", &[])?.table();
        Ok(table
            .records()
            .map(|rec| (rec.text("property"), rec.text("value")))
            .collect())
    }

    /// Profile parameter value. `None` when the parameter does not exist.
    pub fn parameter_value(
        &self,
        target: &InstanceTarget,
        parameter: &str,
    ) -> ControlResult<Option<String>> {
        match self.call(target, "ParameterValue", &[parameter.to_string()]) {
            Ok(reply) => Ok(reply.lines.first().map(|l| l.trim().to_string())),
            Err(ControlError::Failed { message, .. }) if message.contains("Invalid parameter") => {
                tracing::warn!(parameter, "parameter does not exist");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn get_abap_component_list(
        &self,
        target: &InstanceTarget,
    ) -> ControlResult<Vec<AbapComponent>> {
        let table = self.call(target, "ABAPGetComponentList", &[])?.table();
        Ok(table
            .records()
            .map(|rec| AbapComponent {
                component: rec.text("component"),
                release: rec.text("release"),
                patchlevel: rec.text("patchlevel"),
                component_type: rec
                    .get("componenttype")
                    .or_else(|| rec.get("type"))
                    .unwrap_or_default()
                    .to_string(),
                description: rec.text("description"),
            })
            .collect())
    }

    pub fn get_process_list(&self, target: &InstanceTarget) -> ControlResult<Vec<ProcessInfo>> {
        let table = self.call(target, "GetProcessList", &[])?.table();
        table
            .records()
            .map(|rec| {
                let name = rec.text("name");
                Ok(ProcessInfo {
                    disp_status: disp_status(&rec, &format!("process {name}"))?,
                    name,
                    description: rec.text("description"),
                    text_status: rec.text("textstatus"),
                    start_time: rec.text("starttime"),
                    elapsed_time: rec.text("elapsedtime"),
                    pid: rec.parsed("pid"),
                })
            })
            .collect()
    }

    /// Status of a named process. Unknown processes and an unreachable
    /// service both report `Red`.
    pub fn process_status(
        &self,
        target: &InstanceTarget,
        process: &str,
    ) -> ControlResult<DispStatus> {
        let list = match self.get_process_list(target) {
            Ok(list) => list,
            Err(err) if err.is_unreachable() => return Ok(DispStatus::Red),
            Err(err) => return Err(err),
        };
        match list.into_iter().find(|p| p.name == process) {
            Some(p) => Ok(p.disp_status),
            None => {
                tracing::warn!(
                    instance = %target.label(),
                    process,
                    "cannot determine process status"
                );
                Ok(DispStatus::Red)
            }
        }
    }

    pub fn get_pid(&self, target: &InstanceTarget, process: &str) -> ControlResult<Option<u32>> {
        let list = self.get_process_list(target)?;
        let pid = list.into_iter().find(|p| p.name == process).and_then(|p| p.pid);
        if pid.is_none() {
            tracing::warn!(instance = %target.label(), process, "cannot determine PID");
        }
        Ok(pid)
    }

    /// SM21 entries strictly newer than `since` with one of `severities`.
    pub fn get_syslog_errors(
        &self,
        target: &InstanceTarget,
        since: NaiveDateTime,
        severities: &[DispStatus],
    ) -> ControlResult<Vec<SyslogEntry>> {
        let table = self.call(target, "ABAPReadSyslog", &[])?.table();
        let mut out = Vec::new();
        for rec in table.records() {
            let raw_time = rec.text("Time");
            let Ok(time) = NaiveDateTime::parse_from_str(raw_time.trim(), SYSLOG_TIME_FORMAT) else {
                tracing::debug!(time = %raw_time, "skipping syslog entry with unparsable time");
                continue;
            };
            let Ok(severity) = rec.text("Severity").parse::<DispStatus>() else {
                continue;
            };
            if time > since && severities.contains(&severity) {
                out.push(SyslogEntry {
                    time,
                    severity,
                    text: rec.get("Text").unwrap_or_default().to_string(),
                });
            }
        }
        Ok(out)
    }

    pub fn get_workprocess_table(
        &self,
        target: &InstanceTarget,
    ) -> ControlResult<Vec<WorkProcess>> {
        let table = self.call(target, "ABAPGetSystemWPTable", &[])?.table();
        Ok(table
            .records()
            .map(|rec| WorkProcess {
                server: rec.get("Server").map(str::to_string),
                no: rec.parsed("No").unwrap_or_default(),
                typ: rec.text("Typ"),
                pid: rec.parsed("Pid"),
                status: rec.text("Status"),
                reason: rec.text("Reason"),
                start: rec.text("Start"),
                err: rec.text("Err"),
                sem: rec.text("Sem"),
                cpu: rec.text("Cpu"),
                time: rec.text("Time"),
                program: rec.text("Program"),
                client: rec.text("Client"),
                user: rec.text("User"),
                action: rec.text("Action"),
                table: rec.text("Table"),
            })
            .collect())
    }
}

fn disp_status(rec: &Record<'_>, subject: &str) -> ControlResult<DispStatus> {
    let raw = rec.text("dispstatus");
    raw.parse().map_err(|_| ControlError::UnknownStatus {
        subject: subject.to_string(),
        status: raw.clone(),
    })
}
