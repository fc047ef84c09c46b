// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Import of shared D3D12 textures and fences.
//!
//! A texture is opened as a `VkImage` bound to a dedicated allocation that
//! imports the texture's NT handle. A fence is opened as a timeline
//! semaphore whose payload is replaced by the fence's NT handle, so both
//! APIs observe one counter.

use core::fmt;

use ash::vk::{self, Handle};
use xrbridge_core::api::Format;
use xrbridge_core::device::{ImportedSurface, InteropCaps, ResourceImporter, SurfaceDesc};
use xrbridge_core::error::DeviceError;
use xrbridge_core::handle::{NativeImage, OsHandle, SyncHandle};

use crate::bootstrap::query_caps;
use crate::failed;
use crate::format::{pick_memory_type, shared_usage, vk_format};

#[derive(Debug)]
struct Imported {
    image: vk::Image,
    memory: vk::DeviceMemory,
    semaphore: vk::Semaphore,
}

/// Opens shared surfaces on the render device.
///
/// Owns everything it imports. Drop it only once the render device has
/// finished all work that touches those images.
pub struct VulkanImporter {
    device: ash::Device,
    memory_props: vk::PhysicalDeviceMemoryProperties,
    external_memory: ash::khr::external_memory_win32::Device,
    external_semaphore: ash::khr::external_semaphore_win32::Device,
    caps: InteropCaps,
    imported: Vec<Imported>,
}

impl fmt::Debug for VulkanImporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanImporter")
            .field("caps", &self.caps)
            .field("imported", &self.imported.len())
            .finish_non_exhaustive()
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "NT handles are pointer-sized and fit in usize"
)]
fn win32_handle(handle: OsHandle) -> vk::HANDLE {
    handle.raw() as isize
}

impl VulkanImporter {
    /// Creates an importer for `device`, which was created from
    /// `physical_device` with the extensions in
    /// [`VulkanBootstrap`](crate::VulkanBootstrap)'s report enabled.
    #[must_use]
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
    ) -> Self {
        // SAFETY: physical_device was enumerated from instance.
        let memory_props =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        Self {
            external_memory: ash::khr::external_memory_win32::Device::new(instance, &device),
            external_semaphore: ash::khr::external_semaphore_win32::Device::new(instance, &device),
            caps: query_caps(instance, physical_device),
            memory_props,
            device,
            imported: Vec::new(),
        }
    }

    fn import_image(
        &self,
        extent: vk::Extent2D,
        format: Format,
        handle: vk::HANDLE,
    ) -> Result<(vk::Image, vk::DeviceMemory), DeviceError> {
        let handle_type = vk::ExternalMemoryHandleTypeFlags::D3D12_RESOURCE;
        let mut external = vk::ExternalMemoryImageCreateInfo::default().handle_types(handle_type);
        let info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk_format(format))
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(shared_usage(format))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .push_next(&mut external);
        // SAFETY: info is a valid chain; the image is destroyed on drop or
        // on the error paths below.
        let image =
            unsafe { self.device.create_image(&info, None) }.map_err(failed("vkCreateImage"))?;

        match self.bind_imported_memory(image, handle_type, handle) {
            Ok(memory) => Ok((image, memory)),
            Err(err) => {
                // SAFETY: the image was never bound or used.
                unsafe { self.device.destroy_image(image, None) };
                Err(err)
            }
        }
    }

    fn bind_imported_memory(
        &self,
        image: vk::Image,
        handle_type: vk::ExternalMemoryHandleTypeFlags,
        handle: vk::HANDLE,
    ) -> Result<vk::DeviceMemory, DeviceError> {
        let mut requirements = vk::MemoryRequirements2::default();
        let info = vk::ImageMemoryRequirementsInfo2::default().image(image);
        // SAFETY: image is live and requirements is a valid output struct.
        unsafe {
            self.device
                .get_image_memory_requirements2(&info, &mut requirements);
        }
        let requirements = requirements.memory_requirements;

        let mut handle_props = vk::MemoryWin32HandlePropertiesKHR::default();
        // SAFETY: handle is an NT handle produced by the present device's
        // exporter, and handle_props is a valid output struct.
        unsafe {
            self.external_memory.get_memory_win32_handle_properties(
                handle_type,
                handle,
                &mut handle_props,
            )
        }
        .map_err(failed("vkGetMemoryWin32HandlePropertiesKHR"))?;

        let type_bits = requirements.memory_type_bits & handle_props.memory_type_bits;
        let type_index = pick_memory_type(
            &self.memory_props,
            type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .ok_or_else(|| {
            DeviceError::new(
                "vkAllocateMemory",
                format_args!("no device-local memory type in {type_bits:#b}"),
            )
        })?;

        let mut import = vk::ImportMemoryWin32HandleInfoKHR::default()
            .handle_type(handle_type)
            .handle(handle);
        let mut dedicated = vk::MemoryDedicatedAllocateInfo::default().image(image);
        let alloc = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(type_index)
            .push_next(&mut import)
            .push_next(&mut dedicated);
        // SAFETY: alloc is a valid chain importing a live handle.
        let memory = unsafe { self.device.allocate_memory(&alloc, None) }
            .map_err(failed("vkAllocateMemory"))?;

        let bind = vk::BindImageMemoryInfo::default().image(image).memory(memory);
        // SAFETY: memory was allocated for exactly this image.
        if let Err(err) = unsafe { self.device.bind_image_memory2(&[bind]) } {
            // SAFETY: the allocation is unused.
            unsafe { self.device.free_memory(memory, None) };
            return Err(failed("vkBindImageMemory2")(err));
        }
        Ok(memory)
    }

    fn import_semaphore(&self, handle: vk::HANDLE) -> Result<vk::Semaphore, DeviceError> {
        let mut timeline = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let info = vk::SemaphoreCreateInfo::default().push_next(&mut timeline);
        // SAFETY: info is a valid chain.
        let semaphore = unsafe { self.device.create_semaphore(&info, None) }
            .map_err(failed("vkCreateSemaphore"))?;

        let import = vk::ImportSemaphoreWin32HandleInfoKHR::default()
            .semaphore(semaphore)
            .handle_type(vk::ExternalSemaphoreHandleTypeFlags::D3D12_FENCE)
            .handle(handle);
        // SAFETY: handle is an NT fence handle from the exporter.
        if let Err(err) = unsafe { self.external_semaphore.import_semaphore_win32_handle(&import) }
        {
            // SAFETY: the semaphore was never used.
            unsafe { self.device.destroy_semaphore(semaphore, None) };
            return Err(failed("vkImportSemaphoreWin32HandleKHR")(err));
        }
        Ok(semaphore)
    }
}

impl ResourceImporter for VulkanImporter {
    fn caps(&self) -> InteropCaps {
        self.caps
    }

    fn import(
        &mut self,
        desc: &SurfaceDesc,
        os_image: OsHandle,
        os_sync: OsHandle,
    ) -> Result<ImportedSurface, DeviceError> {
        let extent = vk::Extent2D {
            width: desc.extent.width,
            height: desc.extent.height,
        };
        let (image, memory) =
            self.import_image(extent, desc.render_format, win32_handle(os_image))?;
        let semaphore = match self.import_semaphore(win32_handle(os_sync)) {
            Ok(semaphore) => semaphore,
            Err(err) => {
                // SAFETY: the image and its memory were never used.
                unsafe {
                    self.device.destroy_image(image, None);
                    self.device.free_memory(memory, None);
                }
                return Err(err);
            }
        };
        tracing::debug!(
            width = extent.width,
            height = extent.height,
            format = ?desc.render_format,
            image = format_args!("{:#x}", image.as_raw()),
            "imported shared texture"
        );
        self.imported.push(Imported {
            image,
            memory,
            semaphore,
        });
        Ok(ImportedSurface {
            image: NativeImage(image.as_raw()),
            sync: SyncHandle(semaphore.as_raw()),
        })
    }
}

impl Drop for VulkanImporter {
    fn drop(&mut self) {
        for imported in self.imported.drain(..) {
            // SAFETY: the owner guarantees the device no longer uses these.
            unsafe {
                self.device.destroy_semaphore(imported.semaphore, None);
                self.device.destroy_image(imported.image, None);
                self.device.free_memory(imported.memory, None);
            }
        }
    }
}
