//! Command execution boundary
//!
//! Every external tool (cluster CLI, bundle generator, ssh/scp) is reached
//! through [`CommandRunner`]. The system implementation captures exit code,
//! stdout and stderr and passes them up without interpretation; callers decide
//! what a failure means for their step.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use std::time::Instant;
use tracing::debug;

/// Environment variable through which cluster tools find their credential
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// A fully specified external invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, OsString)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Value of an environment entry attached to this spec
    pub fn env_value(&self, key: &str) -> Option<&OsString> {
        self.envs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Wrap the invocation in `sudo -n`
    pub fn with_sudo(self) -> Self {
        let mut args = vec!["-n".to_string()];
        if !self.envs.is_empty() {
            // sudo drops the caller's environment unless told what to keep
            let keep: Vec<&str> = self.envs.iter().map(|(k, _)| k.as_str()).collect();
            args.push(format!("--preserve-env={}", keep.join(",")));
        }
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: "sudo".to_string(),
            args,
            envs: self.envs,
        }
    }

    /// Shell-like rendering for log lines
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code; -1 when terminated by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// First non-empty stderr line, else stdout line, for warning messages
    pub fn brief(&self) -> String {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("exit code {}", self.exit_code))
    }
}

/// Executes external commands
pub trait CommandRunner: Send + Sync {
    /// Run to completion. `Err` means the process could not be started at all.
    fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput>;
}

/// Runs commands on the local system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        let start = Instant::now();
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        // The credential reaches a child only through its CommandSpec
        command.env_remove(KUBECONFIG_ENV);
        for (key, value) in &spec.envs {
            command.env(key, value);
        }

        let output = command.output()?;
        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!(
            command = %spec.display(),
            exit_code = result.exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "command finished"
        );

        Ok(result)
    }
}

/// Failure of one external invocation, for warning messages
pub fn describe_failure(spec: &CommandSpec, result: &std::io::Result<CommandOutput>) -> String {
    match result {
        Ok(output) => format!(
            "`{}` exited with code {}: {}",
            spec.display(),
            output.exit_code,
            output.brief()
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            format!("`{}` could not be started: command not found", spec.program)
        }
        Err(e) => format!("`{}` could not be started: {}", spec.program, e),
    }
}
