// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render device capability query.

use core::ffi::CStr;
use core::fmt;

use ash::vk;
use xrbridge_core::device::{AdapterInfo, DeviceBootstrap, InteropCaps, MemoryHeap};

/// Device extensions the importer needs.
pub(crate) const REQUIRED_EXTENSIONS: [&CStr; 2] = [
    ash::khr::external_memory_win32::NAME,
    ash::khr::external_semaphore_win32::NAME,
];

/// Reports what a physical device can import.
///
/// Everything is queried once, at construction.
#[derive(Clone)]
pub struct VulkanBootstrap {
    caps: InteropCaps,
    adapter: AdapterInfo,
    heaps: Vec<MemoryHeap>,
}

impl fmt::Debug for VulkanBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanBootstrap")
            .field("caps", &self.caps)
            .field("adapter", &self.adapter.name)
            .field("heaps", &self.heaps.len())
            .finish()
    }
}

impl VulkanBootstrap {
    /// Queries `physical_device`.
    #[must_use]
    pub fn new(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        Self {
            caps: query_caps(instance, physical_device),
            adapter: adapter_info(instance, physical_device),
            heaps: memory_heaps(instance, physical_device),
        }
    }
}

impl DeviceBootstrap for VulkanBootstrap {
    fn interop_caps(&self) -> InteropCaps {
        self.caps
    }

    fn adapter(&self) -> AdapterInfo {
        self.adapter.clone()
    }

    fn memory_heaps(&self) -> Vec<MemoryHeap> {
        self.heaps.clone()
    }
}

/// Queries interop support on `physical_device`.
pub(crate) fn query_caps(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> InteropCaps {
    // SAFETY: physical_device was enumerated from instance.
    let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }
        .unwrap_or_else(|err| {
            tracing::warn!(%err, "could not enumerate device extensions");
            Vec::new()
        });
    let has = |name: &CStr| {
        extensions
            .iter()
            .any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == name))
    };

    let mut timeline = vk::PhysicalDeviceTimelineSemaphoreFeatures::default();
    let mut features = vk::PhysicalDeviceFeatures2::default().push_next(&mut timeline);
    // SAFETY: as above; features is a valid chain.
    unsafe { instance.get_physical_device_features2(physical_device, &mut features) };
    let timeline_semaphore = timeline.timeline_semaphore == vk::TRUE;

    let caps = InteropCaps {
        external_memory: has(REQUIRED_EXTENSIONS[0]),
        external_semaphore: has(REQUIRED_EXTENSIONS[1]),
        timeline_semaphore,
    };
    tracing::debug!(?caps, "queried interop support");
    caps
}

fn adapter_info(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> AdapterInfo {
    // SAFETY: physical_device was enumerated from instance.
    let props = unsafe { instance.get_physical_device_properties(physical_device) };
    AdapterInfo {
        name: props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        vendor_id: props.vendor_id,
        device_id: props.device_id,
    }
}

fn memory_heaps(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Vec<MemoryHeap> {
    // SAFETY: physical_device was enumerated from instance.
    let props = unsafe { instance.get_physical_device_memory_properties(physical_device) };
    heaps_of(&props)
}

fn heaps_of(props: &vk::PhysicalDeviceMemoryProperties) -> Vec<MemoryHeap> {
    props
        .memory_heaps_as_slice()
        .iter()
        .map(|heap| MemoryHeap {
            size: heap.size,
            device_local: heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrbridge_core::device::device_local_bytes;

    #[test]
    fn heaps_report_device_local_flag() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: 2,
            ..Default::default()
        };
        props.memory_heaps[0] = vk::MemoryHeap {
            size: 16 << 30,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        props.memory_heaps[1] = vk::MemoryHeap {
            size: 64 << 30,
            flags: vk::MemoryHeapFlags::empty(),
        };
        let heaps = heaps_of(&props);
        assert_eq!(heaps.len(), 2, "only counted heaps");
        assert_eq!(device_local_bytes(&heaps), 16 << 30, "vram");
    }

    #[test]
    fn required_extensions_are_the_win32_pair() {
        assert_eq!(
            REQUIRED_EXTENSIONS[0].to_bytes(),
            b"VK_KHR_external_memory_win32",
            "memory"
        );
        assert_eq!(
            REQUIRED_EXTENSIONS[1].to_bytes(),
            b"VK_KHR_external_semaphore_win32",
            "semaphore"
        );
    }
}
