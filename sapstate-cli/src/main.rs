mod control;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use sapstate_cli::config::{self, ConfigMerger, ControlOverrides, RegistrationOverrides};
use sapstate_core::adapters::{
    self, FsDestinationStore, FsLogStore, LazySapControlPort, RefCredentialProvider,
    SldregDestinationStore,
};
use sapstate_core::ports::{ControlPort, CredentialProvider};
use sapstate_core::settings::{DestinationBackend, ServiceSettings};
use sapstate_core::{RegistrationRequest, StateError, state_exit_code};
use sapstate_render::render_state_text;
use sapstate_types::control::DispStatus;
use sapstate_types::{InstanceNumber, InstanceTarget, LogFileSet, Sid, SldDestination, StateResult};
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "sapstate",
    version,
    about = "Declarative states and control functions for SAP instances."
)]
struct Cli {
    /// Config file (default: ./sapstate.toml if present).
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value = "json", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a declarative state and print its result.
    #[command(subcommand)]
    State(StateCommand),
    /// Call a sapcontrol function directly.
    Control(control::ControlArgs),
}

#[derive(Debug, Subcommand)]
enum StateCommand {
    /// Ensure the instance is registered at the SLD and the data transfer went through.
    SldRegistered(SldRegisteredArgs),
    /// Ensure sapstartsrv is running.
    Running(RunningArgs),
    /// Ensure sapstartsrv is stopped.
    Dead(ServiceArgs),
    /// Check SM21 and SM50 for problems.
    SystemHealthOk(HealthArgs),
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

/// Instance and credentials for the control interface.
#[derive(Debug, Args)]
pub(crate) struct InstanceArgs {
    /// System ID, e.g. S4H.
    #[arg(long)]
    sid: Sid,

    /// Two-digit instance number.
    #[arg(long)]
    instance_number: InstanceNumber,

    /// User for the sapcontrol connection.
    #[arg(long)]
    username: String,

    /// Password reference: env:NAME, file:PATH or the literal value.
    #[arg(long, env = "SAPSTATE_PASSWORD", hide_env_values = true)]
    password: String,
}

impl InstanceArgs {
    pub(crate) fn resolve(&self, creds: &dyn CredentialProvider) -> anyhow::Result<InstanceTarget> {
        let password = creds
            .resolve(&self.password)
            .context("resolve --password")?;
        Ok(InstanceTarget::new(
            self.sid.clone(),
            self.instance_number,
            self.username.clone(),
            password,
        ))
    }
}

#[derive(Debug, Args)]
pub(crate) struct SapcontrolArgs {
    /// Path to the sapcontrol executable.
    #[arg(long = "sapcontrol")]
    sapcontrol_path: Option<Utf8PathBuf>,

    /// Remote host; omit to talk to the local sapstartsrv.
    #[arg(long)]
    fqdn: Option<String>,

    /// Do not retry over HTTP when HTTPS cannot connect.
    #[arg(long, default_value_t = false)]
    no_fallback: bool,

    /// Timeout for each sapcontrol call, in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// OS user for StartService / StopService (default: <sid>adm).
    #[arg(long)]
    run_as: Option<String>,
}

impl SapcontrolArgs {
    pub(crate) fn overrides(&self) -> ControlOverrides {
        ControlOverrides {
            path: self.sapcontrol_path.clone(),
            fqdn: self.fqdn.clone(),
            no_fallback: self.no_fallback,
            timeout_secs: self.timeout,
            run_as: self.run_as.clone(),
        }
    }
}

#[derive(Debug, Parser)]
struct SldRegisteredArgs {
    /// Destination config file (slddest.cfg).
    #[arg(long)]
    name: Utf8PathBuf,

    #[command(flatten)]
    instance: InstanceArgs,

    #[command(flatten)]
    sapcontrol: SapcontrolArgs,

    #[arg(long)]
    sld_user: String,

    /// SLD password reference: env:NAME, file:PATH or the literal value.
    #[arg(long, env = "SAPSTATE_SLD_PASSWORD", hide_env_values = true)]
    sld_password: String,

    #[arg(long)]
    sld_host: String,

    #[arg(long)]
    sld_port: u16,

    /// Log file to check for the success marker (repeatable, checked in order).
    #[arg(long = "log-file")]
    log_files: Vec<Utf8PathBuf>,

    /// Rewrite the config even if it already matches.
    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Do not remove the log files before triggering the transfer.
    #[arg(long, default_value_t = false)]
    keep_logs: bool,

    /// Seconds to wait for the success marker.
    #[arg(long)]
    check_timeout: Option<u64>,

    /// Destination config backend.
    #[arg(long)]
    backend: Option<DestinationBackend>,

    /// Path to the sldreg executable.
    #[arg(long)]
    sldreg: Option<Utf8PathBuf>,

    /// Report what would change without changing anything.
    #[arg(long, default_value_t = false)]
    test: bool,
}

#[derive(Debug, Parser)]
struct ServiceArgs {
    #[command(flatten)]
    instance: InstanceArgs,

    #[command(flatten)]
    sapcontrol: SapcontrolArgs,

    /// Report what would change without changing anything.
    #[arg(long, default_value_t = false)]
    test: bool,
}

#[derive(Debug, Parser)]
struct RunningArgs {
    #[command(flatten)]
    service: ServiceArgs,

    /// Restart the service even if it is already running.
    #[arg(long, default_value_t = false)]
    restart: bool,
}

#[derive(Debug, Parser)]
struct HealthArgs {
    #[command(flatten)]
    instance: InstanceArgs,

    #[command(flatten)]
    sapcontrol: SapcontrolArgs,

    /// First day to check, as DDMMYYYY.
    #[arg(long)]
    check_from: String,

    /// Syslog severity counted as a problem (repeatable, default from config).
    #[arg(long = "severity")]
    severities: Vec<DispStatus>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match real_main(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:?}", e);
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn real_main(cli: Cli) -> anyhow::Result<ExitCode> {
    let cwd = std::env::current_dir().context("current dir")?;
    let cwd = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|p| anyhow::anyhow!("non-UTF-8 working directory {}", p.display()))?;
    let file_config = config::load_or_default(cli.config.as_deref(), &cwd)
        .context("load sapstate.toml config")?;
    let merger = ConfigMerger::new(file_config);

    match cli.cmd {
        Command::State(cmd) => {
            let ret = run_state(cmd, &merger)?;
            emit_state(&ret, cli.format)?;
            Ok(ExitCode::from(state_exit_code(&ret)))
        }
        Command::Control(args) => control::run(args, &merger, cli.format),
    }
}

fn run_state(cmd: StateCommand, merger: &ConfigMerger) -> anyhow::Result<StateResult> {
    let creds = RefCredentialProvider;
    match cmd {
        StateCommand::SldRegistered(args) => cmd_sld_registered(args, merger, &creds),
        StateCommand::Running(args) => {
            let settings = ServiceSettings {
                restart: args.restart,
                test: args.service.test,
            };
            let service = &args.service;
            with_control(&service.instance, &service.sapcontrol, merger, &creds, |t, c| {
                sapstate_core::running(t, &settings, c)
            })
        }
        StateCommand::Dead(args) => {
            let settings = ServiceSettings {
                restart: false,
                test: args.test,
            };
            with_control(&args.instance, &args.sapcontrol, merger, &creds, |t, c| {
                sapstate_core::dead(t, &settings, c)
            })
        }
        StateCommand::SystemHealthOk(args) => {
            let settings = merger.merge_health(&args.severities)?;
            with_control(&args.instance, &args.sapcontrol, merger, &creds, |t, c| {
                sapstate_core::system_health_ok(t, &args.check_from, &settings, c)
            })
        }
    }
}

/// Resolve the target and run `state` against sapcontrol. The binary is
/// located on the first control call, so a missing executable surfaces as a
/// failed result only when the state needs it.
fn with_control(
    instance: &InstanceArgs,
    sapcontrol: &SapcontrolArgs,
    merger: &ConfigMerger,
    creds: &dyn CredentialProvider,
    state: impl FnOnce(&InstanceTarget, &dyn ControlPort) -> StateResult,
) -> anyhow::Result<StateResult> {
    let target = instance.resolve(creds)?;
    let settings = merger.merge_control(&sapcontrol.overrides());
    let port = LazySapControlPort::new(settings, target.sid.clone());
    Ok(state(&target, &port))
}

fn cmd_sld_registered(
    args: SldRegisteredArgs,
    merger: &ConfigMerger,
    creds: &dyn CredentialProvider,
) -> anyhow::Result<StateResult> {
    let settings = merger.merge_registration(&RegistrationOverrides {
        backend: args.backend,
        sldreg: args.sldreg.clone(),
        overwrite: args.overwrite,
        keep_logs: args.keep_logs,
        check_timeout_secs: args.check_timeout,
        test: args.test,
    });
    let sld_password = creds
        .resolve(&args.sld_password)
        .context("resolve --sld-password")?;
    let destination = SldDestination::new(
        args.name.clone(),
        args.sld_user.clone(),
        sld_password,
        args.sld_host.clone(),
        args.sld_port,
    );
    let logs = LogFileSet::new(args.log_files.clone());
    debug!(
        config = %destination.config_path,
        endpoint = %destination.endpoint(),
        backend = %settings.backend,
        logs = logs.len(),
        "sld-registered"
    );

    with_control(&args.instance, &args.sapcontrol, merger, creds, |target, control| {
        let req = RegistrationRequest {
            target: target.clone(),
            destination,
            logs,
        };
        match settings.backend {
            DestinationBackend::File => sapstate_core::sld_registered(
                &req,
                &settings,
                &FsDestinationStore,
                &FsLogStore,
                control,
            ),
            DestinationBackend::Sldreg => match adapters::sldreg_client(&settings, &target.sid) {
                Ok(sldreg) => {
                    let store = SldregDestinationStore::new(sldreg);
                    sapstate_core::sld_registered(&req, &settings, &store, &FsLogStore, control)
                }
                Err(e) => {
                    let name = req.destination.config_path.as_str();
                    sapstate_core::failed(name, &StateError::from(e))
                }
            },
        }
    })
}

fn emit_state(ret: &StateResult, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(ret).context("serialize state result")?;
            println!("{}", json);
        }
        OutputFormat::Text => print!("{}", render_state_text(ret)),
    }
    Ok(())
}
