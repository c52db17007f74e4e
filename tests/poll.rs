use std::collections::HashMap;
use std::sync::Arc;

use gpu_dashboard::attribution::PsTable;
use gpu_dashboard::command::{CommandError, CommandRunner};
use gpu_dashboard::data::{DropReason, DroppedEntry};
use gpu_dashboard::poll::Collector;
use gpu_dashboard::query::SmiQuery;
use gpu_dashboard::render::{self, NO_DATA};

const DEVICES: &str =
    "--query-gpu=index,name,utilization.gpu,memory.used,memory.total,temperature.gpu";
const HANDLES: &str = "--query-gpu=index,uuid";
const PROCESSES: &str = "--query-compute-apps=gpu_uuid,pid";

/// Stands in for both `nvidia-smi` and `ps`.
#[derive(Default)]
struct FakeHost {
    smi: HashMap<&'static str, Result<String, CommandError>>,
    users: HashMap<u32, &'static str>,
    starts: HashMap<u32, &'static str>,
}

fn missing(program: &str) -> CommandError {
    CommandError::Spawn {
        program: program.to_string(),
        message: "No such file or directory".to_string(),
    }
}

fn ps_gone() -> CommandError {
    CommandError::Failed {
        program: "ps".to_string(),
        status: Some(1),
        stdout: String::new(),
        stderr: String::new(),
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        match program {
            "nvidia-smi" => self
                .smi
                .get(args[0])
                .cloned()
                .unwrap_or_else(|| Err(missing(program))),
            "ps" => {
                let pid: u32 = args[3].parse().expect("pid argument");
                let column = match args[1] {
                    "user=" => self.users.get(&pid),
                    "lstart=" => self.starts.get(&pid),
                    other => panic!("unexpected ps column {other}"),
                };
                column.map(|v| format!("{v}\n")).ok_or_else(ps_gone)
            }
            other => Err(missing(other)),
        }
    }
}

fn busy_host() -> FakeHost {
    let mut host = FakeHost::default();
    host.smi.insert(
        DEVICES,
        Ok("0, Tesla T4, 17, 512, 16384, 42\n\
            1, Tesla T4, 88, 15000, 16384, 67\n"
            .to_string()),
    );
    host.smi
        .insert(HANDLES, Ok("0, GPU-aaaa\n1, GPU-bbbb\n".to_string()));
    host.smi.insert(
        PROCESSES,
        Ok("GPU-bbbb, 200\n\
            GPU-bbbb, 100\n\
            GPU-zzzz, 300\n\
            GPU-bbbb, 400\n"
            .to_string()),
    );
    host.users.insert(100, "alice");
    host.starts.insert(100, "Mon Jan  1 09:00:00 2024");
    host.users.insert(200, "bob");
    host.starts.insert(200, "Mon Jan  1 10:00:00 2024");
    host.users.insert(300, "mallory");
    host.starts.insert(300, "Mon Jan  1 11:00:00 2024");
    // 400 exited between the process listing and the ps lookup
    host
}

fn collector(host: FakeHost) -> Collector {
    let host = Arc::new(host);
    Collector::new(
        Box::new(SmiQuery::new(Arc::clone(&host), "nvidia-smi")),
        Box::new(PsTable::new(host, "ps")),
    )
}

#[test]
fn attributes_processes_to_devices() {
    let snapshot = collector(busy_host()).poll_once();

    assert!(snapshot.available);
    assert_eq!(snapshot.records.len(), 2);
    assert_eq!(snapshot.records[0].index, 0);
    assert!(snapshot.records[0].attributed_processes.is_empty());
    assert_eq!(
        snapshot.records[1].attributed_processes,
        vec![
            "alice (2024-01-01 09:00:00)".to_string(),
            "bob (2024-01-01 10:00:00)".to_string(),
        ]
    );
    assert_eq!(
        snapshot.dropped,
        vec![
            DroppedEntry {
                pid: 300,
                reason: DropReason::DeviceIndexUnresolved
            },
            DroppedEntry {
                pid: 400,
                reason: DropReason::ProcessExited
            },
        ]
    );

    let rows = render::table_rows(&snapshot.records);
    assert_eq!(rows[0].processes, NO_DATA);
    assert_eq!(rows[1].gpu, "1 - Tesla T4");
}

#[test]
fn unresolved_handle_never_reaches_a_record() {
    let snapshot = collector(busy_host()).poll_once();
    assert!(snapshot
        .records
        .iter()
        .flat_map(|r| &r.attributed_processes)
        .all(|p| !p.starts_with("mallory")));
}

#[test]
fn missing_metrics_tool_yields_empty_snapshot() {
    let snapshot = collector(FakeHost::default()).poll_once();
    assert!(!snapshot.available);
    assert!(snapshot.records.is_empty());
    assert!(snapshot.dropped.is_empty());
}

#[test]
fn failed_process_listing_keeps_device_rows() {
    let mut host = busy_host();
    host.smi.insert(PROCESSES, Err(missing("nvidia-smi")));
    let snapshot = collector(host).poll_once();

    assert!(snapshot.available);
    assert_eq!(snapshot.records.len(), 2);
    assert!(snapshot
        .records
        .iter()
        .all(|r| r.attributed_processes.is_empty()));
}

#[test]
fn failed_index_listing_drops_every_process() {
    let mut host = busy_host();
    host.smi.insert(HANDLES, Err(missing("nvidia-smi")));
    let snapshot = collector(host).poll_once();

    assert_eq!(snapshot.records.len(), 2);
    assert_eq!(snapshot.dropped.len(), 4);
    assert!(snapshot
        .dropped
        .iter()
        .all(|d| d.reason == DropReason::DeviceIndexUnresolved));
}

#[test]
fn malformed_lines_are_skipped() {
    let mut host = busy_host();
    host.smi.insert(
        DEVICES,
        Ok("0, Tesla T4, 17, 512, 16384, 42\n\
            1, Tesla T4, [N/A], 15000, 16384, 67\n\
            garbage\n"
            .to_string()),
    );
    let snapshot = collector(host).poll_once();

    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.records[0].name, "Tesla T4");
    // device 1 has no sample, so its handle no longer resolves
    assert_eq!(
        snapshot
            .dropped
            .iter()
            .filter(|d| d.reason == DropReason::DeviceIndexUnresolved)
            .count(),
        4
    );
}

#[test]
fn polling_is_idempotent() {
    let collector = collector(busy_host());
    let first = collector.poll_once();
    let second = collector.poll_once();
    assert_eq!(first, second);
}
