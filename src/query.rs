//! Device and compute process listings.

use thiserror::Error;

use crate::command::{CommandError, CommandRunner};
use crate::data::{DeviceHandle, DeviceSample, ProcessEntry};

const CSV_FORMAT: &str = "--format=csv,noheader,nounits";
const QUERY_DEVICES: &str =
    "--query-gpu=index,name,utilization.gpu,memory.used,memory.total,temperature.gpu";
const QUERY_HANDLES: &str = "--query-gpu=index,uuid";
const QUERY_PROCESSES: &str = "--query-compute-apps=gpu_uuid,pid";

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("telemetry tool unavailable: {0}")]
    Unavailable(#[from] CommandError),
    #[error("NVML unavailable: {0}")]
    Nvml(#[from] nvml_wrapper::error::NvmlError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed line {line:?}: {reason}")]
pub struct MalformedLine {
    pub line: String,
    pub reason: String,
}

impl MalformedLine {
    fn new(line: &str, reason: impl Into<String>) -> Self {
        Self {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

/// Source of per-cycle device telemetry.
///
/// Each call is one independent query; nothing is cached between calls.
pub trait DeviceQuery: Send {
    fn list_devices(&self) -> Result<Vec<DeviceSample>, QueryError>;
    /// `(index, handle)` pairs, reported separately from the metrics listing.
    fn list_device_handles(&self) -> Result<Vec<(u32, DeviceHandle)>, QueryError>;
    fn list_compute_processes(&self) -> Result<Vec<ProcessEntry>, QueryError>;
}

fn split_fields<'a>(line: &'a str, arity: usize) -> Result<Vec<&'a str>, MalformedLine> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != arity {
        return Err(MalformedLine::new(
            line,
            format!("expected {arity} fields, found {}", fields.len()),
        ));
    }
    Ok(fields)
}

fn parse_number<T: std::str::FromStr>(
    line: &str,
    field: &str,
    what: &str,
) -> Result<T, MalformedLine> {
    field
        .parse()
        .map_err(|_| MalformedLine::new(line, format!("{what} is not a number: {field:?}")))
}

/// `index, name, utilization%, memory_used_MB, memory_total_MB, temperature_C`
pub fn parse_device_line(line: &str) -> Result<DeviceSample, MalformedLine> {
    let fields = split_fields(line, 6)?;

    let index = parse_number(line, fields[0], "index")?;
    let name = fields[1];
    if name.is_empty() {
        return Err(MalformedLine::new(line, "empty device name"));
    }
    let utilization_percent: u32 = parse_number(line, fields[2], "utilization")?;
    if utilization_percent > 100 {
        return Err(MalformedLine::new(line, "utilization above 100%"));
    }
    let memory_used_mb: u64 = parse_number(line, fields[3], "memory used")?;
    let memory_total_mb: u64 = parse_number(line, fields[4], "memory total")?;
    if memory_used_mb > memory_total_mb {
        return Err(MalformedLine::new(line, "memory used exceeds memory total"));
    }
    let temperature_c = parse_number(line, fields[5], "temperature")?;

    Ok(DeviceSample {
        index,
        name: name.to_string(),
        utilization_percent,
        memory_used_mb,
        memory_total_mb,
        temperature_c,
    })
}

/// `index, uuid`
pub fn parse_handle_line(line: &str) -> Result<(u32, DeviceHandle), MalformedLine> {
    let fields = split_fields(line, 2)?;
    let index = parse_number(line, fields[0], "index")?;
    if fields[1].is_empty() {
        return Err(MalformedLine::new(line, "empty device handle"));
    }
    Ok((index, DeviceHandle::new(fields[1])))
}

/// `gpu_uuid, pid`
pub fn parse_process_line(line: &str) -> Result<ProcessEntry, MalformedLine> {
    let fields = split_fields(line, 2)?;
    if fields[0].is_empty() {
        return Err(MalformedLine::new(line, "empty device handle"));
    }
    let pid: u32 = parse_number(line, fields[1], "pid")?;
    if pid == 0 {
        return Err(MalformedLine::new(line, "pid must be positive"));
    }
    Ok(ProcessEntry {
        device_handle: DeviceHandle::new(fields[0]),
        pid,
    })
}

/// Parses every non-blank line, logging and skipping the ones that fail.
pub fn parse_lines<T>(
    output: &str,
    what: &str,
    parse: impl Fn(&str) -> Result<T, MalformedLine>,
) -> Vec<T> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse(line) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!("skipping {what} line: {err}");
                None
            }
        })
        .collect()
}

/// Telemetry from the `nvidia-smi` command line tool.
pub struct SmiQuery<R> {
    runner: R,
    program: String,
}

impl<R: CommandRunner> SmiQuery<R> {
    pub fn new(runner: R, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    fn query(&self, fields: &str) -> Result<String, QueryError> {
        Ok(self.runner.run(&self.program, &[fields, CSV_FORMAT])?)
    }
}

impl<R: CommandRunner> DeviceQuery for SmiQuery<R> {
    fn list_devices(&self) -> Result<Vec<DeviceSample>, QueryError> {
        let output = self.query(QUERY_DEVICES)?;
        Ok(parse_lines(&output, "device", parse_device_line))
    }

    fn list_device_handles(&self) -> Result<Vec<(u32, DeviceHandle)>, QueryError> {
        let output = self.query(QUERY_HANDLES)?;
        Ok(parse_lines(&output, "device handle", parse_handle_line))
    }

    fn list_compute_processes(&self) -> Result<Vec<ProcessEntry>, QueryError> {
        let output = self.query(QUERY_PROCESSES)?;
        Ok(parse_lines(&output, "compute process", parse_process_line))
    }
}
