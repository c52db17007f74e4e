//! One complete collection cycle.

use crate::aggregate::aggregate;
use crate::attribution::{attribute, Attribution, ProcessTable};
use crate::data::{DropReason, DroppedEntry, Snapshot};
use crate::query::DeviceQuery;
use crate::resolver::build_index_map;

/// Owns the telemetry source and the process table used by every cycle.
///
/// Holds no state between cycles; `poll_once` rebuilds everything from the
/// current output of the underlying tools.
pub struct Collector {
    query: Box<dyn DeviceQuery>,
    table: Box<dyn ProcessTable>,
}

impl Collector {
    pub fn new(query: Box<dyn DeviceQuery>, table: Box<dyn ProcessTable>) -> Self {
        Self { query, table }
    }

    /// Runs metrics, index and process queries in sequence, attributes each
    /// process, and joins the result. Never fails: unavailable tools yield an
    /// empty snapshot with `available == false`.
    pub fn poll_once(&self) -> Snapshot {
        let samples = match self.query.list_devices() {
            Ok(samples) => samples,
            Err(err) => {
                tracing::warn!("device query failed: {err}");
                return Snapshot::default();
            }
        };

        let handles = self.query.list_device_handles().unwrap_or_else(|err| {
            tracing::warn!("device index query failed: {err}");
            Vec::new()
        });
        let index_map = build_index_map(&samples, handles);
        if index_map.is_empty() && !samples.is_empty() {
            tracing::debug!("no device handles resolved; processes will be dropped");
        }

        let entries = self.query.list_compute_processes().unwrap_or_else(|err| {
            tracing::warn!("compute process query failed: {err}");
            Vec::new()
        });

        let mut attributed = Vec::with_capacity(entries.len());
        let mut dropped = Vec::new();
        for entry in &entries {
            match attribute(entry, &index_map, self.table.as_ref()) {
                Attribution::Attributed(process) => attributed.push(process),
                Attribution::Dropped { pid, reason } => {
                    log_drop(pid, &reason);
                    dropped.push(DroppedEntry { pid, reason });
                }
            }
        }

        let records = aggregate(samples, &attributed);
        tracing::debug!(
            devices = records.len(),
            handles = index_map.len(),
            attributed = attributed.len(),
            dropped = dropped.len(),
            "poll cycle complete"
        );

        Snapshot {
            records,
            available: true,
            dropped,
        }
    }
}

fn log_drop(pid: u32, reason: &DropReason) {
    match reason {
        DropReason::DeviceIndexUnresolved => {
            tracing::debug!("pid {pid}: device handle not in index map")
        }
        DropReason::ProcessExited => tracing::debug!("pid {pid}: exited before attribution"),
        DropReason::LookupFailed(message) => tracing::warn!("pid {pid}: {message}"),
        DropReason::StartTimeUnparseable(raw) => {
            tracing::warn!("pid {pid}: unparseable start time {raw:?}")
        }
    }
}
