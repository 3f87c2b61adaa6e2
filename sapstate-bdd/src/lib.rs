//! BDD harness (cucumber-rs).
//!
//! Scenarios drive the real pipelines and adapters against a scripted
//! `sapcontrol` that keeps its running flag in a file.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;

/// A shell script standing in for `sapcontrol`.
///
/// `RestartService` and `StartService` mark the service running and, when an
/// SLD log is configured, write `Return code: <code>` to it the way the
/// registration tool does after a transfer.
#[derive(Debug, Clone)]
pub struct FakeSapcontrol {
    pub executable: Utf8PathBuf,
    state_file: Utf8PathBuf,
    calls_file: Utf8PathBuf,
}

impl FakeSapcontrol {
    pub fn install(dir: &Utf8Path, sld_log: Option<(&Utf8Path, u16)>) -> anyhow::Result<Self> {
        let executable = dir.join("sapcontrol");
        let state_file = dir.join("sapcontrol.running");
        let calls_file = dir.join("sapcontrol.calls");
        let log_line = match sld_log {
            Some((path, code)) => format!("echo \"Return code: {code}\" > '{path}'"),
            None => ":".to_string(),
        };
        let script = format!(
            r#"#!/bin/sh
fn=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-function" ]; then fn="$a"; fi
  prev="$a"
done
echo "$fn" >> '{calls}'
echo
echo "05.03.2024 10:00:00"
echo "$fn"
case "$fn" in
  GetProcessList)
    if [ -f '{state}' ]; then
      echo "OK"
      echo "name, description, dispstatus, textstatus, starttime, elapsedtime, pid"
      echo "disp+work, Dispatcher, GREEN, Running, 2024 03 05 09:00:00, 1:00:00, 1234"
      exit 3
    fi
    echo "FAIL: NIECONN_REFUSED (Connection refused), NiRawConnect failed in plugin_fopen()"
    exit 1
    ;;
  StartService|RestartService)
    touch '{state}'
    {log_line}
    echo "OK"
    ;;
  StopService)
    rm -f '{state}'
    echo "OK"
    ;;
  *)
    echo "FAIL: unsupported"
    exit 1
    ;;
esac
"#,
            calls = calls_file,
            state = state_file,
        );
        fs::write(&executable, script)?;
        make_executable(&executable)?;
        Ok(Self {
            executable,
            state_file,
            calls_file,
        })
    }

    pub fn set_running(&self, running: bool) -> anyhow::Result<()> {
        if running {
            fs::write(&self.state_file, "")?;
        } else if self.state_file.exists() {
            fs::remove_file(&self.state_file)?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state_file.exists()
    }

    /// Functions called so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(&self.calls_file)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[cfg(unix)]
fn make_executable(path: &Utf8Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("chmod {path}"))
}

#[cfg(not(unix))]
fn make_executable(_path: &Utf8Path) -> anyhow::Result<()> {
    anyhow::bail!("the scripted sapcontrol needs a unix shell")
}
