//! Join between vendor device handles and host-local slot indices.
//!
//! The metrics listing and the handle listing are two separate queries, so a
//! device can be hot-plugged in between. A handle whose index has no metrics
//! sample in this cycle is left out of the map and resolves to `None`.

use std::collections::{BTreeSet, HashMap};

use crate::data::{DeviceHandle, DeviceSample};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexMap {
    by_handle: HashMap<DeviceHandle, u32>,
}

impl IndexMap {
    pub fn resolve(&self, handle: &DeviceHandle) -> Option<u32> {
        self.by_handle.get(handle).copied()
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}

pub fn build_index_map(samples: &[DeviceSample], handles: Vec<(u32, DeviceHandle)>) -> IndexMap {
    let known: BTreeSet<u32> = samples.iter().map(|s| s.index).collect();
    let mut by_handle = HashMap::with_capacity(handles.len());
    for (index, handle) in handles {
        if !known.contains(&index) {
            tracing::debug!("device index {index} has no metrics sample this cycle");
            continue;
        }
        by_handle.insert(handle, index);
    }
    IndexMap { by_handle }
}
