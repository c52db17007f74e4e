//! Attribution of compute processes to an owning user and start time.
//!
//! Every lookup races against the process exiting (and against pid reuse), so
//! attribution is best effort: an entry either resolves completely or is
//! dropped with a reason. Partial attributions are never produced.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::command::{CommandError, CommandRunner};
use crate::data::{AttributedProcess, DropReason, ProcessEntry};
use crate::resolver::IndexMap;

/// Reference format of `ps -o lstart=` under the C locale.
const LSTART_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("process {0} no longer exists")]
    Exited(u32),
    #[error("lookup for process {pid} failed: {message}")]
    Failed { pid: u32, message: String },
}

impl From<LookupError> for DropReason {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::Exited(_) => DropReason::ProcessExited,
            LookupError::Failed { message, .. } => DropReason::LookupFailed(message),
        }
    }
}

/// Read-only view of the operating system's process table.
pub trait ProcessTable: Send {
    fn owner(&self, pid: u32) -> Result<String, LookupError>;
    /// Start time in the platform reference format (see `parse_start_time`).
    fn start_time(&self, pid: u32) -> Result<String, LookupError>;
}

/// Process table backed by `ps`.
pub struct PsTable<R> {
    runner: R,
    program: String,
}

impl<R: CommandRunner> PsTable<R> {
    pub fn new(runner: R, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    fn column(&self, pid: u32, column: &str) -> Result<String, LookupError> {
        let pid_arg = pid.to_string();
        match self.runner.run(&self.program, &["-o", column, "-p", &pid_arg]) {
            Ok(out) => {
                let value = out.trim();
                if value.is_empty() {
                    Err(LookupError::Exited(pid))
                } else {
                    Ok(value.to_string())
                }
            }
            // ps exits non-zero and prints nothing when the pid is gone.
            Err(CommandError::Failed { stdout, stderr, .. })
                if stdout.trim().is_empty() && stderr.is_empty() =>
            {
                Err(LookupError::Exited(pid))
            }
            Err(err) => Err(LookupError::Failed {
                pid,
                message: err.to_string(),
            }),
        }
    }
}

impl<R: CommandRunner> ProcessTable for PsTable<R> {
    fn owner(&self, pid: u32) -> Result<String, LookupError> {
        let user = self.column(pid, "user=")?;
        match user.split_whitespace().next() {
            Some(token) => Ok(token.to_string()),
            None => Err(LookupError::Exited(pid)),
        }
    }

    fn start_time(&self, pid: u32) -> Result<String, LookupError> {
        self.column(pid, "lstart=")
    }
}

/// Parses `ps` start times such as `Mon Jan  1 09:00:00 2024`.
///
/// Runs of whitespace are collapsed first because `ps` pads single digit days.
pub fn parse_start_time(raw: &str) -> Option<NaiveDateTime> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, LSTART_FORMAT).ok()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attribution {
    Attributed(AttributedProcess),
    Dropped { pid: u32, reason: DropReason },
}

pub fn attribute(
    entry: &ProcessEntry,
    index_map: &IndexMap,
    table: &dyn ProcessTable,
) -> Attribution {
    let pid = entry.pid;
    let dropped = |reason: DropReason| Attribution::Dropped { pid, reason };

    let Some(device_index) = index_map.resolve(&entry.device_handle) else {
        return dropped(DropReason::DeviceIndexUnresolved);
    };

    let user = match table.owner(pid) {
        Ok(user) => user,
        Err(err) => return dropped(err.into()),
    };
    let raw_start = match table.start_time(pid) {
        Ok(raw) => raw,
        Err(err) => return dropped(err.into()),
    };
    let Some(start_time) = parse_start_time(&raw_start) else {
        return dropped(DropReason::StartTimeUnparseable(raw_start));
    };

    Attribution::Attributed(AttributedProcess {
        device_index,
        pid,
        user,
        start_time,
    })
}
