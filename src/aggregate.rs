use std::collections::HashMap;

use crate::data::{AttributedProcess, DeviceRecord, DeviceSample};

/// Joins device samples with attributed processes, one record per sample.
///
/// Records keep the order the samples were listed in. Each record's process
/// strings are sorted lexicographically so output does not depend on the order
/// processes were reported in.
pub fn aggregate(samples: Vec<DeviceSample>, processes: &[AttributedProcess]) -> Vec<DeviceRecord> {
    let mut by_device: HashMap<u32, Vec<String>> = HashMap::new();
    for process in processes {
        by_device
            .entry(process.device_index)
            .or_default()
            .push(process.display());
    }

    samples
        .into_iter()
        .map(|sample| {
            let mut attributed_processes = by_device.remove(&sample.index).unwrap_or_default();
            attributed_processes.sort();
            DeviceRecord {
                index: sample.index,
                name: sample.name,
                utilization_percent: sample.utilization_percent,
                memory_used_mb: sample.memory_used_mb,
                memory_total_mb: sample.memory_total_mb,
                temperature_c: sample.temperature_c,
                attributed_processes,
            }
        })
        .collect()
}
