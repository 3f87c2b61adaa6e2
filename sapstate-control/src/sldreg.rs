use crate::error::{ControlError, ControlResult};
use crate::runner::{CommandRunner, CommandSpec};
use camino::{Utf8Path, Utf8PathBuf};
use sapstate_types::SldDestination;
use std::time::Duration;

/// Client for the `sldreg` tool that maintains `slddest.cfg`.
///
/// Every call runs as `run_as` with `LD_LIBRARY_PATH` pointing at the
/// directory that holds `sldreg`, since the tool loads kernel libraries from
/// there.
pub struct Sldreg<R> {
    runner: R,
    executable: Utf8PathBuf,
    run_as: Option<String>,
    timeout: Duration,
}

impl<R: CommandRunner> Sldreg<R> {
    pub fn new(runner: R, executable: impl Into<Utf8PathBuf>, run_as: Option<String>) -> Self {
        Self {
            runner,
            executable: executable.into(),
            run_as,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn spec(&self) -> CommandSpec {
        let lib_dir = self
            .executable
            .parent()
            .map(Utf8Path::as_str)
            .unwrap_or("")
            .to_string();
        CommandSpec::new(self.executable.as_str())
            .env("LD_LIBRARY_PATH", lib_dir)
            .run_as(self.run_as.as_deref())
            .timeout(self.timeout)
    }

    /// Raw output of `sldreg -showconnect <config>`.
    pub fn show_connect(&self, config: &Utf8Path) -> ControlResult<String> {
        let spec = self.spec().args(["-showconnect", config.as_str()]);
        let out = self.runner.run(&spec)?;
        if !out.success() {
            return Err(ControlError::Failed {
                function: "sldreg -showconnect".to_string(),
                message: out.summary(),
            });
        }
        Ok(out.stdout)
    }

    /// Write `dest` into its config file with a key file for the password.
    pub fn configure(&self, dest: &SldDestination) -> ControlResult<()> {
        let mut spec = self
            .spec()
            .args([
                "-configure",
                dest.config_path.as_str(),
                "-usekeyfile",
                "-noninteractive",
                "-user",
                dest.user.as_str(),
                "-pass",
            ])
            .secret_arg(&dest.password)
            .args(["-host", dest.host.as_str(), "-port"])
            .arg(dest.port.to_string());
        if dest.https {
            spec = spec.arg("-usehttps");
        }
        let out = self.runner.run(&spec)?;
        if !out.success() {
            return Err(ControlError::Failed {
                function: "sldreg -configure".to_string(),
                message: out.summary(),
            });
        }
        tracing::debug!(
            config = %dest.config_path,
            endpoint = %dest.endpoint(),
            "sldreg configured"
        );
        Ok(())
    }
}
