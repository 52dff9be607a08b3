// src/process.rs

//! External step execution
//!
//! Every external program the package manager runs (descriptor scripts,
//! `strip`) goes through [`Cmd`], so failures all surface the same way:
//! as [`Error::CommandFailed`] carrying the program, exit code and stderr.

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::debug;

/// Result of a command execution
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or -1 if terminated by signal
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

/// Builder for a single external step
pub struct Cmd {
    program: String,
    args: Vec<OsString>,
    envs: Vec<(String, OsString)>,
    current_dir: Option<PathBuf>,
    allow_fail: bool,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
            allow_fail: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_os_string());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Allow non-zero exit codes without failing
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> Error {
        Error::CommandFailed(format!("failed to execute '{}': {}", self.program, e))
    }

    /// Run the command and capture its output
    pub fn run(self) -> Result<CommandResult> {
        debug!("Running {} {:?}", self.program, self.args);

        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(e))?;

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !self.allow_fail && !result.success() {
            let stderr = result.stderr.trim();
            return Err(Error::CommandFailed(if stderr.is_empty() {
                format!("'{}' exited with code {}", self.program, result.code())
            } else {
                format!(
                    "'{}' exited with code {}:\n{}",
                    self.program,
                    result.code(),
                    stderr
                )
            }));
        }

        Ok(result)
    }

    /// Run with inherited stdio so build output streams to the terminal
    pub fn run_interactive(self) -> Result<ExitStatus> {
        debug!("Running {} {:?} (interactive)", self.program, self.args);

        let status = self
            .command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| self.spawn_error(e))?;

        if !self.allow_fail && !status.success() {
            return Err(Error::CommandFailed(format!(
                "'{}' exited with code {}",
                self.program,
                status.code().unwrap_or(-1)
            )));
        }

        Ok(status)
    }
}

/// Check whether a program can be found on PATH
pub fn exists(program: &str) -> bool {
    which::which(program).is_ok()
}
