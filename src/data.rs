use chrono::NaiveDateTime;
use serde::Serialize;

/// Format used for every start time shown to the user.
pub const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Per-device metrics from one poll cycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceSample {
    pub index: u32,
    pub name: String,
    pub utilization_percent: u32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub temperature_c: i32,
}

/// Vendor-issued stable identity of a physical GPU.
///
/// Only used as a join key between the process listing and the index listing,
/// so it intentionally has no `Display` impl.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(String);

impl DeviceHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }
}

// Raw compute process entry, not yet attributed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessEntry {
    pub device_handle: DeviceHandle,
    pub pid: u32,
}

// Compute process resolved to a device slot, an owner and a start time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributedProcess {
    pub device_index: u32,
    pub pid: u32,
    pub user: String,
    pub start_time: NaiveDateTime,
}

impl AttributedProcess {
    /// `user (YYYY-MM-DD HH:MM:SS)`
    pub fn display(&self) -> String {
        format!("{} ({})", self.user, self.start_time.format(START_TIME_FORMAT))
    }
}

/// Everything known about one device in one poll cycle.
///
/// `attributed_processes` is sorted lexicographically and may be empty; the
/// "no data" sentinel only exists at render time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    pub index: u32,
    pub name: String,
    pub utilization_percent: u32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub temperature_c: i32,
    pub attributed_processes: Vec<String>,
}

impl DeviceRecord {
    pub fn label(&self) -> String {
        format!("{} - {}", self.index, self.name)
    }
}

// Why a process entry did not make it into the output
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum DropReason {
    DeviceIndexUnresolved,
    ProcessExited,
    LookupFailed(String),
    StartTimeUnparseable(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DroppedEntry {
    pub pid: u32,
    #[serde(flatten)]
    pub reason: DropReason,
}

/// Result of one poll cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub records: Vec<DeviceRecord>,
    /// False when the device metrics query could not run at all.
    pub available: bool,
    pub dropped: Vec<DroppedEntry>,
}
