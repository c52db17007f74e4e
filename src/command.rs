//! Bounded invocation of external tools.

use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::{Builder, Runtime};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("failed to start `{program}`: {message}")]
    Spawn { program: String, message: String },
    #[error("`{program}` exited with status {status:?}: {stderr}")]
    Failed {
        program: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("`{program}` did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
    #[error("`{program}` produced non UTF-8 output")]
    InvalidOutput { program: String },
}

/// Runs a program to completion and returns its stdout.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for Arc<R> {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        (**self).run(program, args)
    }
}

/// Runs real child processes, each bounded by `timeout`.
///
/// Children are started with `LC_ALL=C` so that every tool prints in its
/// reference format, and are killed if they outlive the timeout.
pub struct SystemRunner {
    runtime: Runtime,
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { runtime, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        self.runtime.block_on(async {
            let output = tokio::process::Command::new(program)
                .args(args)
                .env("LC_ALL", "C")
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output();

            let output = tokio::time::timeout(self.timeout, output)
                .await
                .map_err(|_| CommandError::TimedOut {
                    program: program.to_string(),
                    timeout: self.timeout,
                })?
                .map_err(|e| CommandError::Spawn {
                    program: program.to_string(),
                    message: e.to_string(),
                })?;

            check_output(program, output)
        })
    }
}

/// Exit status first, so a failing tool is never reported as bad output.
fn check_output(program: &str, output: Output) -> Result<String, CommandError> {
    if !output.status.success() {
        return Err(CommandError::Failed {
            program: program.to_string(),
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8(output.stdout).map_err(|_| CommandError::InvalidOutput {
        program: program.to_string(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let runner = SystemRunner::new(Duration::from_secs(5)).unwrap();
        let out = runner.run("echo", &["hello"]).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let runner = SystemRunner::new(Duration::from_secs(5)).unwrap();
        let err = runner
            .run("definitely-not-a-real-tool-4242", &[])
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[test]
    fn non_zero_exit_is_reported() {
        let runner = SystemRunner::new(Duration::from_secs(5)).unwrap();
        let err = runner.run("sh", &["-c", "echo oops >&2; exit 3"]).unwrap_err();
        match err {
            CommandError::Failed { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_utf8_output_of_failed_program_is_a_failure() {
        let runner = SystemRunner::new(Duration::from_secs(5)).unwrap();
        let err = runner
            .run("sh", &["-c", "printf '\\377\\376'; exit 1"])
            .unwrap_err();
        match err {
            CommandError::Failed { status, stdout, .. } => {
                assert_eq!(status, Some(1));
                assert_eq!(stdout, "\u{FFFD}\u{FFFD}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_utf8_output_of_successful_program_is_invalid() {
        let runner = SystemRunner::new(Duration::from_secs(5)).unwrap();
        let err = runner.run("sh", &["-c", "printf '\\377'"]).unwrap_err();
        assert!(matches!(err, CommandError::InvalidOutput { .. }));
    }

    #[test]
    fn hung_program_times_out() {
        let runner = SystemRunner::new(Duration::from_millis(200)).unwrap();
        let err = runner.run("sleep", &["5"]).unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }));
    }
}
