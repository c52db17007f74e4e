use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::{Device, Nvml};

use crate::data::{DeviceHandle, DeviceSample, ProcessEntry};
use crate::query::{DeviceQuery, QueryError};

const MIB: u64 = 1024 * 1024;

/// Telemetry read straight from NVML instead of through `nvidia-smi`.
///
/// Devices are enumerated afresh on every call, so a device that disappears
/// between two calls simply stops being listed. A device that fails mid-query
/// is skipped and logged, the same way a malformed `nvidia-smi` line is.
pub struct NvmlQuery {
    nvml: Nvml,
}

impl NvmlQuery {
    pub fn new() -> Result<Self, QueryError> {
        let nvml = Nvml::init()?;
        Ok(Self { nvml })
    }

    fn devices(&self) -> Result<Vec<(u32, Device<'_>)>, QueryError> {
        let count = self.nvml.device_count()?;
        let mut devices = Vec::with_capacity(count as usize);
        for index in 0..count {
            match self.nvml.device_by_index(index) {
                Ok(device) => devices.push((index, device)),
                Err(err) => tracing::warn!("skipping NVML device {index}: {err}"),
            }
        }
        Ok(devices)
    }
}

// Raw NVML readings for one device, memory in bytes
struct Reading {
    name: String,
    utilization_gpu: u32,
    memory_used_bytes: u64,
    memory_total_bytes: u64,
    temperature: u32,
}

impl Reading {
    fn into_sample(self, index: u32) -> DeviceSample {
        DeviceSample {
            index,
            name: self.name,
            utilization_percent: self.utilization_gpu.min(100),
            memory_used_mb: self.memory_used_bytes / MIB,
            memory_total_mb: self.memory_total_bytes / MIB,
            temperature_c: i32::try_from(self.temperature).unwrap_or(i32::MAX),
        }
    }
}

fn sample(index: u32, device: &Device<'_>) -> Result<DeviceSample, QueryError> {
    let util = device.utilization_rates()?;
    let mem = device.memory_info()?;
    let reading = Reading {
        name: device.name()?,
        utilization_gpu: util.gpu,
        memory_used_bytes: mem.used,
        memory_total_bytes: mem.total,
        temperature: device.temperature(TemperatureSensor::Gpu)?,
    };
    Ok(reading.into_sample(index))
}

// NVML reports pid 0 for processes outside our pid namespace.
fn process_entries(
    handle: &DeviceHandle,
    pids: impl IntoIterator<Item = u32>,
) -> Vec<ProcessEntry> {
    pids.into_iter()
        .filter(|pid| *pid > 0)
        .map(|pid| ProcessEntry {
            device_handle: handle.clone(),
            pid,
        })
        .collect()
}

impl DeviceQuery for NvmlQuery {
    fn list_devices(&self) -> Result<Vec<DeviceSample>, QueryError> {
        let mut samples = Vec::new();
        for (index, device) in self.devices()? {
            match sample(index, &device) {
                Ok(s) => samples.push(s),
                Err(err) => tracing::warn!("skipping NVML device {index}: {err}"),
            }
        }
        Ok(samples)
    }

    fn list_device_handles(&self) -> Result<Vec<(u32, DeviceHandle)>, QueryError> {
        let mut handles = Vec::new();
        for (index, device) in self.devices()? {
            match device.uuid() {
                Ok(uuid) => handles.push((index, DeviceHandle::new(uuid))),
                Err(err) => tracing::warn!("no UUID for NVML device {index}: {err}"),
            }
        }
        Ok(handles)
    }

    fn list_compute_processes(&self) -> Result<Vec<ProcessEntry>, QueryError> {
        let mut entries = Vec::new();
        for (index, device) in self.devices()? {
            let (uuid, procs) = match (device.uuid(), device.running_compute_processes()) {
                (Ok(uuid), Ok(procs)) => (uuid, procs),
                (Err(err), _) | (_, Err(err)) => {
                    tracing::warn!("cannot list compute processes on NVML device {index}: {err}");
                    continue;
                }
            };
            let handle = DeviceHandle::new(uuid);
            entries.extend(process_entries(&handle, procs.into_iter().map(|p| p.pid)));
        }
        Ok(entries)
    }
}
