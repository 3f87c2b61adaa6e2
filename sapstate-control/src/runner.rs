use crate::error::{ControlError, ControlResult};
use sapstate_types::Secret;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Arg {
    Plain(String),
    Secret(Secret),
}

/// A single external command: program, arguments, environment and deadline.
///
/// Arguments added with [`CommandSpec::secret_arg`] are passed to the child
/// verbatim but shown as `***` by [`CommandSpec::display`].
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<Arg>,
    env: Vec<(String, String)>,
    run_as: Option<String>,
    timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            run_as: None,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg::Plain(value.into()));
        self
    }

    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args
            .extend(values.into_iter().map(|v| Arg::Plain(v.into())));
        self
    }

    pub fn secret_arg(mut self, value: &Secret) -> Self {
        self.args.push(Arg::Secret(value.clone()));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run as another OS user through `sudo -n`. Ignored when `user` is the
    /// current user.
    pub fn run_as(mut self, user: Option<&str>) -> Self {
        self.run_as = user
            .filter(|u| !u.is_empty() && Some(*u) != current_user().as_deref())
            .map(str::to_string);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.timeout
    }

    /// Values of plain (non-secret) arguments, in order.
    pub fn plain_args(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(|a| match a {
            Arg::Plain(s) => Some(s.as_str()),
            Arg::Secret(_) => None,
        })
    }

    /// Program and arguments as they will be executed, including the
    /// `sudo`/`env` wrapper for run-as.
    pub fn argv(&self) -> (String, Vec<String>) {
        let inner: Vec<String> = self
            .args
            .iter()
            .map(|a| match a {
                Arg::Plain(s) => s.clone(),
                Arg::Secret(s) => s.expose().to_string(),
            })
            .collect();
        match &self.run_as {
            None => (self.program.clone(), inner),
            Some(user) => {
                let mut args = vec![
                    "-n".to_string(),
                    "-u".to_string(),
                    user.clone(),
                    "--".to_string(),
                    "env".to_string(),
                ];
                args.extend(self.env.iter().map(|(k, v)| format!("{k}={v}")));
                args.push(self.program.clone());
                args.extend(inner);
                ("sudo".to_string(), args)
            }
        }
    }

    /// Loggable command line with secrets redacted.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().map(|a| match a {
            Arg::Plain(s) => s.clone(),
            Arg::Secret(_) => "***".to_string(),
        }));
        let line = parts.join(" ");
        match &self.run_as {
            Some(user) => format!("{line} (as {user})"),
            None => line,
        }
    }
}

fn current_user() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .ok()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Best single-line description of what the command printed.
    pub fn summary(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        text.lines().last().unwrap_or("").trim().to_string()
    }
}

/// Executes [`CommandSpec`]s. Tests substitute scripted runners.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> ControlResult<CommandOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, spec: &CommandSpec) -> ControlResult<CommandOutput> {
        (**self).run(spec)
    }
}

/// Runs commands as child processes with a hard deadline.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    poll: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(50),
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            let _ = p.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> ControlResult<CommandOutput> {
        let (program, args) = spec.argv();
        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if spec.run_as.is_none() {
            for (k, v) in &spec.env {
                cmd.env(k, v);
            }
        }

        tracing::debug!(
            command = %spec.display(),
            timeout_secs = spec.timeout.as_secs(),
            "running"
        );
        let mut child = cmd.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ControlError::ExecutableNotFound {
                    name: program.clone(),
                    searched: program.clone(),
                }
            } else {
                ControlError::Spawn {
                    program: program.clone(),
                    source,
                }
            }
        })?;

        let out = drain(child.stdout.take());
        let err = drain(child.stderr.take());

        let deadline = Instant::now() + spec.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::error!(command = %spec.display(), "killed after timeout");
                    return Err(ControlError::Timeout {
                        program: spec.program.clone(),
                        secs: spec.timeout.as_secs(),
                    });
                }
                Ok(None) => thread::sleep(self.poll),
                Err(source) => {
                    return Err(ControlError::Spawn {
                        program: spec.program.clone(),
                        source,
                    });
                }
            }
        };

        let output = CommandOutput {
            code: status.code(),
            stdout: out.join().unwrap_or_default(),
            stderr: err.join().unwrap_or_default(),
        };
        tracing::debug!(command = %spec.display(), code = ?output.code, "finished");
        Ok(output)
    }
}
