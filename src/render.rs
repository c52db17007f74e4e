//! View-independent table and chart data built from a snapshot.

use std::fmt::Write as _;

use crate::data::DeviceRecord;

/// Shown in the processes column when a device has no attributed processes.
pub const NO_DATA: &str = "—";

pub const HEADERS: [&str; 6] = [
    "GPU",
    "Utilization (%)",
    "Memory Used (MB)",
    "Memory Total (MB)",
    "Temperature (°C)",
    "User (Start Time)",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRow {
    pub gpu: String,
    pub utilization_percent: u32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub temperature_c: i32,
    pub processes: String,
}

impl TableRow {
    pub fn cells(&self) -> [String; 6] {
        [
            self.gpu.clone(),
            self.utilization_percent.to_string(),
            self.memory_used_mb.to_string(),
            self.memory_total_mb.to_string(),
            self.temperature_c.to_string(),
            self.processes.clone(),
        ]
    }
}

pub fn process_cell(record: &DeviceRecord) -> String {
    if record.attributed_processes.is_empty() {
        NO_DATA.to_string()
    } else {
        record.attributed_processes.join("\n")
    }
}

pub fn table_rows(records: &[DeviceRecord]) -> Vec<TableRow> {
    records
        .iter()
        .map(|r| TableRow {
            gpu: r.label(),
            utilization_percent: r.utilization_percent,
            memory_used_mb: r.memory_used_mb,
            memory_total_mb: r.memory_total_mb,
            temperature_c: r.temperature_c,
            processes: process_cell(r),
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct UtilizationBar {
    /// Slot along the x axis, in record order.
    pub position: usize,
    pub label: String,
    pub percent: f64,
}

pub fn utilization_chart(records: &[DeviceRecord]) -> Vec<UtilizationBar> {
    records
        .iter()
        .enumerate()
        .map(|(position, r)| UtilizationBar {
            position,
            label: r.label(),
            percent: f64::from(r.utilization_percent),
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryKind {
    Used,
    Total,
}

impl MemoryKind {
    pub fn legend(self) -> &'static str {
        match self {
            MemoryKind::Used => "Memory Used (MB)",
            MemoryKind::Total => "Memory Total (MB)",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemoryBar {
    pub position: usize,
    pub label: String,
    pub kind: MemoryKind,
    pub megabytes: f64,
}

/// Used and total memory per device, `Used` bars first.
pub fn memory_chart(records: &[DeviceRecord]) -> Vec<MemoryBar> {
    [MemoryKind::Used, MemoryKind::Total]
        .into_iter()
        .flat_map(|kind| {
            records.iter().enumerate().map(move |(position, r)| MemoryBar {
                position,
                label: r.label(),
                kind,
                megabytes: match kind {
                    MemoryKind::Used => r.memory_used_mb as f64,
                    MemoryKind::Total => r.memory_total_mb as f64,
                },
            })
        })
        .collect()
}

/// Plain text table with aligned columns; multi-line cells span rows.
pub fn text_table(records: &[DeviceRecord]) -> String {
    let rows: Vec<[String; 6]> = table_rows(records).iter().map(TableRow::cells).collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            let longest = cell.lines().map(|l| l.chars().count()).max().unwrap_or(0);
            *width = (*width).max(longest);
        }
    }

    let mut out = String::new();
    push_line(&mut out, &HEADERS.map(String::from), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("-+-"));

    for row in &rows {
        let height = row.iter().map(|c| c.lines().count().max(1)).max().unwrap_or(1);
        for line_no in 0..height {
            let line: [String; 6] = std::array::from_fn(|i| {
                row[i].lines().nth(line_no).unwrap_or_default().to_string()
            });
            push_line(&mut out, &line, &widths);
        }
    }
    out
}

fn push_line(out: &mut String, cells: &[String; 6], widths: &[usize; 6]) {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect();
    let _ = writeln!(out, "{}", padded.join(" | ").trim_end());
}
