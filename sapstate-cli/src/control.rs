//! `sapstate control <fn>`: direct calls to the sapcontrol functions.

use crate::{InstanceArgs, OutputFormat, SapcontrolArgs};
use anyhow::Context;
use clap::{Args, Subcommand};
use sapstate_cli::config::ConfigMerger;
use sapstate_core::adapters::{self, RefCredentialProvider};
use sapstate_domain::parse_check_from;
use sapstate_render::{
    render_instances_text, render_processes_text, render_table, render_workprocesses_text,
};
use sapstate_types::control::{DispStatus, SystemLevel};
use sapstate_types::schema::SAPSTATE_CONTROL_V1;
use serde::Serialize;
use serde_json::json;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Args)]
pub(crate) struct ControlArgs {
    #[command(flatten)]
    instance: InstanceArgs,

    #[command(flatten)]
    sapcontrol: SapcontrolArgs,

    #[command(subcommand)]
    function: ControlFn,
}

#[derive(Debug, Subcommand)]
enum ControlFn {
    /// Whether sapstartsrv answers.
    Status,
    /// StartService, then wait until the service answers.
    Start {
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
    /// StopService.
    Stop,
    /// RestartService, or start if the service is down.
    Restart {
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
    /// Status of this host's instance in the system instance list.
    InstanceStatus,
    /// InstanceStart, then wait for GREEN.
    InstanceStart {
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },
    /// InstanceStop, then wait for GRAY.
    InstanceStop {
        #[arg(long, default_value_t = 300)]
        soft_timeout: u64,
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },
    /// StartSystem for a level (ALL, SCS, DIALOG, ABAP, J2EE, TREX, ENQREP, HDB, ALLNOHDB).
    SystemStart {
        #[arg(long, default_value = "ALL")]
        level: SystemLevel,
        #[arg(long, default_value_t = 300)]
        wait: u64,
    },
    /// StopSystem for a level.
    SystemStop {
        #[arg(long, default_value = "ALL")]
        level: SystemLevel,
        #[arg(long, default_value_t = 300)]
        soft_timeout: u64,
        #[arg(long, default_value_t = 300)]
        wait: u64,
    },
    GetSystemInstanceList,
    GetInstanceProperties,
    /// Value of a profile parameter.
    ParameterValue { parameter: String },
    GetAbapComponentList,
    GetProcessList,
    ProcessStatus { process: String },
    GetPid { process: String },
    /// SM21 entries after a day (DDMMYYYY).
    GetSyslogErrors {
        #[arg(long)]
        since: String,
        #[arg(long = "severity", default_value = "RED")]
        severities: Vec<DispStatus>,
    },
    GetWorkprocessTable,
}

impl ControlFn {
    /// The sapcontrol function (or composite operation) behind the subcommand.
    fn function_name(&self) -> &'static str {
        match self {
            ControlFn::Status => "Status",
            ControlFn::Start { .. } => "StartService",
            ControlFn::Stop => "StopService",
            ControlFn::Restart { .. } => "RestartService",
            ControlFn::InstanceStatus => "InstanceStatus",
            ControlFn::InstanceStart { .. } => "InstanceStart",
            ControlFn::InstanceStop { .. } => "InstanceStop",
            ControlFn::SystemStart { .. } => "StartSystem",
            ControlFn::SystemStop { .. } => "StopSystem",
            ControlFn::GetSystemInstanceList => "GetSystemInstanceList",
            ControlFn::GetInstanceProperties => "GetInstanceProperties",
            ControlFn::ParameterValue { .. } => "ParameterValue",
            ControlFn::GetAbapComponentList => "ABAPGetComponentList",
            ControlFn::GetProcessList => "GetProcessList",
            ControlFn::ProcessStatus { .. } => "ProcessStatus",
            ControlFn::GetPid { .. } => "GetPid",
            ControlFn::GetSyslogErrors { .. } => "ABAPReadSyslog",
            ControlFn::GetWorkprocessTable => "ABAPGetSystemWPTable",
        }
    }
}

/// What a control function printed and whether it counts as success.
struct Outcome {
    json: serde_json::Value,
    text: String,
    ok: bool,
}

impl Outcome {
    fn flag(ok: bool) -> Self {
        Self {
            json: json!(ok),
            text: format!("{ok}\n"),
            ok,
        }
    }

    fn status(status: DispStatus) -> Self {
        Self {
            json: json!(status),
            text: format!("{status}\n"),
            ok: true,
        }
    }

    fn data<T: Serialize>(value: &T, text: String) -> anyhow::Result<Self> {
        Ok(Self {
            json: serde_json::to_value(value).context("serialize control output")?,
            text,
            ok: true,
        })
    }
}

pub(crate) fn run(
    args: ControlArgs,
    merger: &ConfigMerger,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let target = args.instance.resolve(&RefCredentialProvider)?;
    let settings = merger.merge_control(&args.sapcontrol.overrides());
    let sc = adapters::sapcontrol_client(&settings, &target.sid)?;
    let secs = Duration::from_secs;
    let function = args.function.function_name();

    let outcome = match args.function {
        ControlFn::Status => Outcome::flag(sc.status(&target)?),
        ControlFn::Start { timeout } => Outcome::flag(sc.start(&target, secs(timeout))?),
        ControlFn::Stop => Outcome::flag(sc.stop(&target)?),
        ControlFn::Restart { timeout } => Outcome::flag(sc.restart(&target, secs(timeout))?),
        ControlFn::InstanceStatus => Outcome::status(sc.instance_status(&target)?),
        ControlFn::InstanceStart { timeout } => {
            Outcome::flag(sc.instance_start(&target, secs(timeout))?)
        }
        ControlFn::InstanceStop {
            soft_timeout,
            timeout,
        } => Outcome::flag(sc.instance_stop(&target, secs(soft_timeout), secs(timeout))?),
        ControlFn::SystemStart { level, wait } => {
            Outcome::flag(sc.system_start(&target, level, secs(wait))?)
        }
        ControlFn::SystemStop {
            level,
            soft_timeout,
            wait,
        } => Outcome::flag(sc.system_stop(&target, level, secs(soft_timeout), secs(wait))?),
        ControlFn::GetSystemInstanceList => {
            let list = sc.get_system_instance_list(&target)?;
            Outcome::data(&list, render_instances_text(&list))?
        }
        ControlFn::GetInstanceProperties => {
            let props = sc.get_instance_properties(&target)?;
            let text = props.iter().map(|(k, v)| format!("{k} = {v}\n")).collect();
            Outcome::data(&props, text)?
        }
        ControlFn::ParameterValue { parameter } => {
            let value = sc.parameter_value(&target, &parameter)?;
            let text = format!("{}\n", value.as_deref().unwrap_or("-"));
            let found = value.is_some();
            let mut outcome = Outcome::data(&value, text)?;
            outcome.ok = found;
            outcome
        }
        ControlFn::GetAbapComponentList => {
            let list = sc.get_abap_component_list(&target)?;
            let rows: Vec<Vec<String>> = list
                .iter()
                .map(|c| {
                    vec![
                        c.component.clone(),
                        c.release.clone(),
                        c.patchlevel.clone(),
                        c.description.clone(),
                    ]
                })
                .collect();
            let text = render_table(&["component", "release", "patchlevel", "description"], &rows);
            Outcome::data(&list, text)?
        }
        ControlFn::GetProcessList => {
            let list = sc.get_process_list(&target)?;
            Outcome::data(&list, render_processes_text(&list))?
        }
        ControlFn::ProcessStatus { process } => {
            Outcome::status(sc.process_status(&target, &process)?)
        }
        ControlFn::GetPid { process } => {
            let pid = sc.get_pid(&target, &process)?;
            let text = pid
                .map(|p| format!("{p}\n"))
                .unwrap_or_else(|| "-\n".to_string());
            let mut outcome = Outcome::data(&pid, text)?;
            outcome.ok = pid.is_some();
            outcome
        }
        ControlFn::GetSyslogErrors { since, severities } => {
            let since = parse_check_from(&since)?;
            let entries = sc.get_syslog_errors(&target, since, &severities)?;
            let rows: Vec<Vec<String>> = entries
                .iter()
                .map(|e| vec![e.time.to_string(), e.severity.to_string(), e.text.clone()])
                .collect();
            let text = render_table(&["time", "severity", "text"], &rows);
            Outcome::data(&entries, text)?
        }
        ControlFn::GetWorkprocessTable => {
            let table = sc.get_workprocess_table(&target)?;
            Outcome::data(&table, render_workprocesses_text(&table))?
        }
    };

    match format {
        OutputFormat::Json => {
            let envelope = json!({
                "schema": SAPSTATE_CONTROL_V1,
                "function": function,
                "ok": outcome.ok,
                "output": outcome.json,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&envelope).context("serialize control output")?
            );
        }
        OutputFormat::Text => print!("{}", outcome.text),
    }
    Ok(if outcome.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}
