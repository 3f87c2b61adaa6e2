//! End-to-end CLI tests against a fake `sapcontrol`.

#![cfg(unix)]
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FAKE_SAPCONTROL: &str = r#"#!/bin/sh
state="$FAKE_STATE_DIR/running"
fn=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-function" ]; then fn="$a"; fi
  prev="$a"
done
echo
echo "05.03.2024 10:00:00"
echo "$fn"
case "$fn" in
  GetProcessList)
    if [ -f "$state" ]; then
      echo "OK"
      echo "name, description, dispstatus, textstatus, starttime, elapsedtime, pid"
      echo "disp+work, Dispatcher, GREEN, Running, 2024 03 05 09:00:00, 1:00:00, 1234"
      exit 3
    fi
    echo "FAIL: NIECONN_REFUSED (Connection refused), NiRawConnect failed in plugin_fopen()"
    exit 1
    ;;
  StartService|RestartService)
    touch "$state"
    if [ -n "$FAKE_SLD_LOG" ]; then echo "Return code: 200" > "$FAKE_SLD_LOG"; fi
    echo "OK"
    ;;
  StopService)
    rm -f "$state"
    echo "OK"
    ;;
  ABAPReadSyslog)
    echo "OK"
    echo "Time, Severity, Text"
    echo "2024 03 05 09:00:00, SAPControl-RED, Database   error"
    ;;
  ABAPGetSystemWPTable)
    echo "OK"
    echo "Server, No, Typ, Pid, Status, Reason, Start, Err, Sem, Cpu, Time, Program, Client, User, Action, Table"
    echo "s4h-app_S4H_00, 0, DIA, 4711, Wait, , yes, , , 0:00:01, , , , , , "
    ;;
  *)
    echo "FAIL: unsupported"
    exit 1
    ;;
esac
"#;

struct Env {
    tmp: TempDir,
    sapcontrol: PathBuf,
}

impl Env {
    fn new() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let sapcontrol = tmp.path().join("sapcontrol");
        fs::write(&sapcontrol, FAKE_SAPCONTROL).unwrap();
        fs::set_permissions(&sapcontrol, fs::Permissions::from_mode(0o755)).unwrap();
        fs::create_dir_all(tmp.path().join("state")).unwrap();
        Self { tmp, sapcontrol }
    }

    fn root(&self) -> &Path {
        self.tmp.path()
    }

    fn set_running(&self) {
        fs::write(self.root().join("state/running"), "").unwrap();
    }

    fn is_running(&self) -> bool {
        self.root().join("state/running").exists()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("sapstate").expect("sapstate binary");
        cmd.current_dir(self.root())
            .env("FAKE_STATE_DIR", self.root().join("state"))
            // Matches the default run-as user, so no sudo wrapper.
            .env("USER", "s4hadm")
            .env_remove("SAPSTATE_PASSWORD")
            .env_remove("SAPSTATE_SLD_PASSWORD");
        cmd
    }

    fn instance_args(&self) -> Vec<String> {
        vec![
            "--sid".into(),
            "S4H".into(),
            "--instance-number".into(),
            "00".into(),
            "--username".into(),
            "s4hadm".into(),
            "--password".into(),
            "secret".into(),
            "--sapcontrol".into(),
            self.sapcontrol.display().to_string(),
        ]
    }

    fn config_path(&self) -> PathBuf {
        self.root().join("global/slddest.cfg")
    }

    fn sld_registered(&self, extra: &[&str]) -> Command {
        let mut cmd = self.cmd();
        cmd.args(["state", "sld-registered", "--name"])
            .arg(self.config_path())
            .args(self.instance_args())
            .args([
                "--sld-user",
                "SLD_DS_USER",
                "--sld-password",
                "sld-secret",
                "--sld-host",
                "sol.my.domain",
                "--sld-port",
                "50000",
                "--backend",
                "file",
            ])
            .args(extra);
        cmd
    }
}

fn json_stdout(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("state result JSON on stdout")
}

#[test]
fn test_help_exits_zero() {
    Command::cargo_bin("sapstate")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("state"));
}

#[test]
fn test_missing_args_is_usage_error() {
    let env = Env::new();
    env.cmd()
        .args(["state", "sld-registered"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--name"));
}

#[test]
fn test_invalid_sid_is_usage_error() {
    let env = Env::new();
    let mut args = env.instance_args();
    args[1] = "1X".into();
    env.cmd()
        .args(["control"])
        .args(args)
        .arg("status")
        .assert()
        .code(1);
}

#[test]
fn test_sld_registered_converges() {
    let env = Env::new();
    let log = env.root().join("dev_sldregs");

    let first = env
        .sld_registered(&["--log-file", log.to_str().unwrap()])
        .env("FAKE_SLD_LOG", &log)
        .output()
        .unwrap();
    assert_eq!(first.status.code(), Some(0));
    let ret = json_stdout(&first);
    assert_eq!(ret["changed"], true);
    assert_eq!(ret["result"], true);
    assert_eq!(ret["comment"], "SLD registration and data transfer successful");
    assert_eq!(ret["changes"]["sapcontrol"], "Restarted");
    assert!(env.is_running());

    assert_eq!(
        fs::read_to_string(env.config_path()).unwrap(),
        "host=sol.my.domain\nport=50000\nuser=SLD_DS_USER\npassword=sld-secret\nhttps=y\n"
    );

    let second = env
        .sld_registered(&["--log-file", log.to_str().unwrap()])
        .env("FAKE_SLD_LOG", &log)
        .output()
        .unwrap();
    assert_eq!(second.status.code(), Some(0));
    let ret = json_stdout(&second);
    assert_eq!(ret["changed"], false);
    assert_eq!(ret["comment"], "No changes required");
}

#[test]
fn test_sld_registered_test_mode() {
    let env = Env::new();
    let output = env.sld_registered(&["--test"]).output().unwrap();
    assert_eq!(output.status.code(), Some(0));
    let ret = json_stdout(&output);
    assert_eq!(ret["result"], Value::Null);
    assert_eq!(ret["changes"]["sapcontrol"], "Would have been restarted");
    assert!(!env.config_path().exists());
    assert!(!env.is_running());
}

#[test]
fn test_sld_registered_confirmation_timeout() {
    let env = Env::new();
    let log = env.root().join("dev_sldregs");
    let output = env
        .sld_registered(&["--log-file", log.to_str().unwrap(), "--check-timeout", "1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let ret = json_stdout(&output);
    assert_eq!(ret["result"], false);
    assert_eq!(ret["failure"], "confirmation_timeout");
    assert!(ret["changes"]["config"].is_string());
}

#[test]
fn test_missing_sapcontrol_is_reported_in_result() {
    let env = Env::new();
    let output = env
        .cmd()
        .env("PATH", env.root().join("empty"))
        .args(["state", "dead", "--sid", "S4H", "--instance-number", "00"])
        .args(["--username", "s4hadm", "--password", "secret"])
        .args(["--sapcontrol", "/nonexistent/sapcontrol"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let ret = json_stdout(&output);
    assert_eq!(ret["failure"], "executable_not_found");
    assert_eq!(ret["name"], "S4H");
}

#[test]
fn test_running_then_dead() {
    let env = Env::new();

    let output = env
        .cmd()
        .args(["state", "running"])
        .args(env.instance_args())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(json_stdout(&output)["comment"], "sapcontrol was started");
    assert!(env.is_running());

    let output = env
        .cmd()
        .args(["--format", "text", "state", "dead"])
        .args(env.instance_args())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("Comment: sapcontrol was stopped"));
    assert!(!env.is_running());
}

#[test]
fn test_running_already_running_is_unchanged() {
    let env = Env::new();
    env.set_running();
    let output = env
        .cmd()
        .args(["state", "running"])
        .args(env.instance_args())
        .output()
        .unwrap();
    let ret = json_stdout(&output);
    assert_eq!(ret["comment"], "sapcontrol is already running");
    assert_eq!(ret["changed"], false);
}

#[test]
fn test_system_health_reports_syslog() {
    let env = Env::new();
    let output = env
        .cmd()
        .args(["state", "system-health-ok"])
        .args(env.instance_args())
        .args(["--check-from", "01032024"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let ret = json_stdout(&output);
    assert_eq!(ret["failure"], "health_degraded");
    assert_eq!(ret["comment"], "SM21: Database error");
}

#[test]
fn test_control_functions() {
    let env = Env::new();
    env.set_running();

    let output = env
        .cmd()
        .arg("control")
        .args(env.instance_args())
        .arg("status")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    let ret = json_stdout(&output);
    assert_eq!(ret["schema"], "sapstate.control.v1");
    assert_eq!(ret["function"], "Status");
    assert_eq!(ret["output"], true);

    env.cmd()
        .args(["--format", "text", "control"])
        .args(env.instance_args())
        .args(["get-pid", "disp+work"])
        .assert()
        .success()
        .stdout("1234\n");

    env.cmd()
        .arg("control")
        .args(env.instance_args())
        .args(["get-pid", "msg_server"])
        .assert()
        .code(2);
}

#[test]
fn test_config_file_is_loaded() {
    let env = Env::new();
    fs::write(
        env.root().join("sapstate.toml"),
        "[health]\nseverities = [\"YELLOW\"]\n",
    )
    .unwrap();
    let output = env
        .cmd()
        .args(["state", "system-health-ok"])
        .args(env.instance_args())
        .args(["--check-from", "01032024"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(json_stdout(&output)["comment"], "System health OK");
}

#[test]
fn test_broken_config_is_tool_error() {
    let env = Env::new();
    fs::write(env.root().join("sapstate.toml"), "[sapcontrol\n").unwrap();
    env.cmd()
        .arg("control")
        .args(env.instance_args())
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("sapstate.toml"));
}

#[test]
fn test_converged_config_needs_no_sapcontrol() {
    let env = Env::new();
    fs::create_dir_all(env.root().join("global")).unwrap();
    fs::write(
        env.config_path(),
        "host=sol.my.domain\nport=50000\nuser=SLD_DS_USER\npassword=sld-secret\nhttps=y\n",
    )
    .unwrap();

    let output = env
        .cmd()
        .env("PATH", env.root().join("empty"))
        .args(["state", "sld-registered", "--name"])
        .arg(env.config_path())
        .args(["--sid", "S4H", "--instance-number", "00"])
        .args(["--username", "s4hadm", "--password", "secret"])
        .args(["--sapcontrol", "/nonexistent/sapcontrol"])
        .args(["--sld-user", "SLD_DS_USER", "--sld-password", "sld-secret"])
        .args(["--sld-host", "sol.my.domain", "--sld-port", "50000"])
        .args(["--backend", "file"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    let ret = json_stdout(&output);
    assert_eq!(ret["changed"], false);
    assert_eq!(ret["comment"], "No changes required");
}

#[test]
fn test_bad_check_from_is_tool_error() {
    let env = Env::new();
    let output = env
        .cmd()
        .args(["state", "system-health-ok"])
        .args(env.instance_args())
        .args(["--check-from", "2024-03-01"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let ret = json_stdout(&output);
    assert_eq!(ret["result"], false);
    assert_eq!(ret["failure"], "invalid_input");
}
