//! External process execution.
//!
//! Every child process the crate starts (the Spring Boot jar extractor and the
//! JVM training run) goes through the [`Executor`] trait, so orchestration code
//! can be exercised with a fake that records invocations.
//!
//! [`CommandExecutor`] is the real implementation. It streams the child's
//! stdout and stderr line by line into `tracing` while it waits for the exit
//! status, so long training runs show progress instead of a buffered dump.

use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::{info, warn};

/// Failures from running an external command.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The command could not be started at all.
    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// The command started but waiting on it failed.
    #[error("failed waiting for `{command}`")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// The command ran and exited unsuccessfully.
    #[error("`{command}` failed with {status}")]
    Status { command: String, status: ExitStatus },
}

/// A single command invocation: program, arguments, extra environment and
/// working directory.
///
/// The child inherits the parent environment; `env` entries are layered on top.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub dir: Option<PathBuf>,
}

impl Execution {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Look up an environment override set on this execution.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs an [`Execution`] to completion.
pub trait Executor {
    fn execute(&self, execution: &Execution) -> Result<(), ExecError>;
}

impl<F> Executor for F
where
    F: Fn(&Execution) -> Result<(), ExecError>,
{
    fn execute(&self, execution: &Execution) -> Result<(), ExecError> {
        self(execution)
    }
}

/// Executor backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExecutor;

impl Executor for CommandExecutor {
    fn execute(&self, execution: &Execution) -> Result<(), ExecError> {
        let label = execution.to_string();

        let mut cmd = Command::new(&execution.command);
        cmd.args(&execution.args)
            .envs(execution.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &execution.dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            command: label.clone(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let command = execution.command.as_str();

        // Both pipes must be drained concurrently or a chatty child can block
        // on a full pipe buffer while we wait on the other one.
        let status = std::thread::scope(|scope| {
            if let Some(out) = stdout {
                scope.spawn(move || forward_lines(out, command, "stdout"));
            }
            if let Some(err) = stderr {
                scope.spawn(move || forward_lines(err, command, "stderr"));
            }
            child.wait()
        })
        .map_err(|source| ExecError::Wait {
            command: label.clone(),
            source,
        })?;

        if !status.success() {
            return Err(ExecError::Status {
                command: label,
                status,
            });
        }
        Ok(())
    }
}

fn forward_lines<R: Read>(reader: R, command: &str, stream: &'static str) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                info!(command, stream, "{}", line.trim_end());
            }
            Err(err) => {
                warn!(command, stream, error = %err, "stopped reading child output");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_display_joins_command_and_args() {
        let exec = Execution::new("java").args(["-cp", "a:b", "com.example.App"]);
        assert_eq!(exec.to_string(), "java -cp a:b com.example.App");
    }

    #[test]
    fn test_env_value_returns_last_override() {
        let exec = Execution::new("java")
            .env("JAVA_TOOL_OPTIONS", "-Xmx1g")
            .env("JAVA_TOOL_OPTIONS", "-Xmx2g");
        assert_eq!(exec.env_value("JAVA_TOOL_OPTIONS"), Some("-Xmx2g"));
        assert_eq!(exec.env_value("MISSING"), None);
    }

    #[test]
    fn test_command_executor_success() {
        let temp = TempDir::new().unwrap();
        let exec = Execution::new("sh")
            .args(["-c", "echo out; echo err >&2; touch marker"])
            .current_dir(temp.path());

        CommandExecutor.execute(&exec).unwrap();
        assert!(temp.path().join("marker").exists());
    }

    #[test]
    fn test_command_executor_passes_env() {
        let temp = TempDir::new().unwrap();
        let exec = Execution::new("sh")
            .args(["-c", "printf '%s' \"$CDS_TEST_VALUE\" > value"])
            .env("CDS_TEST_VALUE", "hello")
            .current_dir(temp.path());

        CommandExecutor.execute(&exec).unwrap();
        assert_eq!(
            std::fs::read_to_string(temp.path().join("value")).unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_command_executor_nonzero_exit() {
        let exec = Execution::new("sh").args(["-c", "exit 3"]);
        let err = CommandExecutor.execute(&exec).unwrap_err();
        match err {
            ExecError::Status { status, .. } => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_command_executor_spawn_failure() {
        let exec = Execution::new("definitely_not_a_real_command_12345");
        let err = CommandExecutor.execute(&exec).unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[test]
    fn test_closure_executor() {
        let executor = |exec: &Execution| -> Result<(), ExecError> {
            assert_eq!(exec.command, "java");
            Ok(())
        };
        executor.execute(&Execution::new("java")).unwrap();
    }
}
