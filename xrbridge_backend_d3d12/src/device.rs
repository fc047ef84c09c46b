// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The present device: queue submission, idle waits, and resource export.

use anyhow::Context as _;
use windows::Win32::Foundation::{CloseHandle, GENERIC_ALL, HANDLE, LUID};
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL;
use windows::Win32::Graphics::Direct3D12::{
    D3D12_COMMAND_LIST_TYPE_DIRECT, D3D12_COMMAND_QUEUE_DESC,
    D3D12_DEFAULT_RESOURCE_PLACEMENT_ALIGNMENT, D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
    D3D12_DESCRIPTOR_HEAP_TYPE_RTV, D3D12_FENCE_FLAG_NONE, D3D12_FENCE_FLAG_SHARED,
    D3D12_HEAP_FLAG_SHARED, D3D12_HEAP_PROPERTIES, D3D12_HEAP_TYPE_DEFAULT, D3D12_RESOURCE_DESC,
    D3D12_RESOURCE_DIMENSION_TEXTURE2D,
    D3D12_RESOURCE_STATE_COMMON, D3D12_TEXTURE_LAYOUT_UNKNOWN, D3D12CreateDevice,
    ID3D12CommandAllocator, ID3D12CommandList, ID3D12CommandQueue, ID3D12Device, ID3D12Fence,
    ID3D12GraphicsCommandList, ID3D12PipelineState, ID3D12Resource,
};
use windows::Win32::Graphics::Dxgi::Common::DXGI_SAMPLE_DESC;
use windows::Win32::Graphics::Dxgi::{CreateDXGIFactory1, IDXGIAdapter1, IDXGIFactory4};
use windows::Win32::System::Threading::{CreateEventW, INFINITE, WaitForSingleObject};
use windows::core::{HSTRING, PCWSTR};
use windows_core::Interface;
use xrbridge_core::composition::Extent;
use xrbridge_core::device::{
    ExportedSurface, PipelineKind, PresentDevice, ResourceExporter, SurfaceDesc,
};
use xrbridge_core::error::DeviceError;
use xrbridge_core::handle::OsHandle;

use crate::com::{self, failed};
use crate::format::{shared_resource_flags, storage_format};
use crate::pipeline::D3d12Pipeline;
use crate::stream::{ClearSlots, D3d12Stream};
use crate::views::DescriptorHeap;

/// Command lists that may be in flight at once.
const FRAMES_IN_FLIGHT: usize = 3;

#[derive(Debug)]
struct FrameSlot {
    allocator: ID3D12CommandAllocator,
    list: ID3D12GraphicsCommandList,
    /// Value of the idle fence that marks this slot's last submission done.
    retired_at: u64,
}

/// A texture and fence created for sharing, with their NT handles.
#[derive(Debug)]
struct Exported {
    _texture: ID3D12Resource,
    _fence: ID3D12Fence,
    texture_handle: HANDLE,
    fence_handle: HANDLE,
}

/// The D3D12 device and direct queue the XR runtime consumes from.
///
/// Owns every texture and fence it exports, so the raw pointers handed to
/// the core stay valid until the device is dropped.
#[derive(Debug)]
pub struct D3d12Device {
    device: ID3D12Device,
    queue: ID3D12CommandQueue,
    slots: Vec<FrameSlot>,
    next_slot: usize,
    idle_fence: ID3D12Fence,
    idle_value: u64,
    idle_event: HANDLE,
    clear_rtv: DescriptorHeap,
    clear_dsv: DescriptorHeap,
    exported: Vec<Exported>,
}

impl D3d12Device {
    /// Creates a device on the adapter with `adapter_luid`, as reported by
    /// the XR runtime's graphics requirements.
    pub fn new(adapter_luid: LUID, min_feature_level: D3D_FEATURE_LEVEL) -> anyhow::Result<Self> {
        // SAFETY: plain factory and adapter lookups with no borrowed inputs.
        let adapter: IDXGIAdapter1 = unsafe {
            let factory: IDXGIFactory4 = CreateDXGIFactory1().context("CreateDXGIFactory1")?;
            factory
                .EnumAdapterByLuid(adapter_luid)
                .context("no adapter matches the runtime's LUID")?
        };
        let mut device: Option<ID3D12Device> = None;
        // SAFETY: adapter is live and device is a valid out-pointer.
        unsafe { D3D12CreateDevice(&adapter, min_feature_level, &mut device) }
            .context("D3D12CreateDevice")?;
        let device = device.context("D3D12CreateDevice returned no device")?;
        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
            ..Default::default()
        };
        // SAFETY: desc describes a direct queue.
        let queue: ID3D12CommandQueue =
            unsafe { device.CreateCommandQueue(&desc) }.context("CreateCommandQueue")?;
        Self::from_raw(device, queue).context("present device setup")
    }

    /// Wraps an existing device and direct queue.
    pub fn from_raw(device: ID3D12Device, queue: ID3D12CommandQueue) -> Result<Self, DeviceError> {
        let mut slots = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for _ in 0..FRAMES_IN_FLIGHT {
            // SAFETY: allocator and list creation on a live device. Lists are
            // created open and closed immediately so begin_commands can
            // always reset them.
            let slot = unsafe {
                let allocator: ID3D12CommandAllocator = device
                    .CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)
                    .map_err(failed("CreateCommandAllocator"))?;
                let list: ID3D12GraphicsCommandList = device
                    .CreateCommandList(
                        0,
                        D3D12_COMMAND_LIST_TYPE_DIRECT,
                        &allocator,
                        None::<&ID3D12PipelineState>,
                    )
                    .map_err(failed("CreateCommandList"))?;
                list.Close().map_err(failed("Close"))?;
                FrameSlot {
                    allocator,
                    list,
                    retired_at: 0,
                }
            };
            slots.push(slot);
        }
        // SAFETY: fence and event creation have no borrowed inputs.
        let (idle_fence, idle_event) = unsafe {
            let fence: ID3D12Fence = device
                .CreateFence(0, D3D12_FENCE_FLAG_NONE)
                .map_err(failed("CreateFence"))?;
            let event = CreateEventW(None, false, false, PCWSTR::null())
                .map_err(failed("CreateEventW"))?;
            (fence, event)
        };
        let clear_rtv = DescriptorHeap::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_RTV, 1, false)?;
        let clear_dsv = DescriptorHeap::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_DSV, 1, false)?;
        Ok(Self {
            device,
            queue,
            slots,
            next_slot: 0,
            idle_fence,
            idle_value: 0,
            idle_event,
            clear_rtv,
            clear_dsv,
            exported: Vec::new(),
        })
    }

    /// The device, for creating the XR session.
    #[must_use]
    pub fn device(&self) -> &ID3D12Device {
        &self.device
    }

    /// The direct queue, for creating the XR session.
    #[must_use]
    pub fn queue(&self) -> &ID3D12CommandQueue {
        &self.queue
    }

    /// Signals the idle fence and returns the value signaled.
    fn mark(&mut self) -> Result<u64, DeviceError> {
        self.idle_value += 1;
        // SAFETY: queue and fence are live.
        unsafe { self.queue.Signal(&self.idle_fence, self.idle_value) }
            .map_err(failed("Signal"))?;
        Ok(self.idle_value)
    }

    /// Blocks the CPU until the idle fence reaches `value`.
    fn block_until(&self, value: u64) -> Result<(), DeviceError> {
        // SAFETY: fence and event are live; the wait has no timeout.
        unsafe {
            if self.idle_fence.GetCompletedValue() >= value {
                return Ok(());
            }
            self.idle_fence
                .SetEventOnCompletion(value, self.idle_event)
                .map_err(failed("SetEventOnCompletion"))?;
            WaitForSingleObject(self.idle_event, INFINITE);
        }
        Ok(())
    }
}

impl Drop for D3d12Device {
    fn drop(&mut self) {
        if let Err(err) = self.wait_idle() {
            tracing::error!(%err, "present queue did not drain before drop");
        }
        for exported in self.exported.drain(..) {
            // SAFETY: both handles were created by CreateSharedHandle and are
            // closed exactly once here.
            unsafe {
                let _ = CloseHandle(exported.texture_handle);
                let _ = CloseHandle(exported.fence_handle);
            }
        }
        // SAFETY: the event was created in from_raw and is closed once.
        unsafe {
            let _ = CloseHandle(self.idle_event);
        }
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

fn os_handle(handle: HANDLE) -> OsHandle {
    OsHandle(handle.0 as usize as u64)
}

impl ResourceExporter for D3d12Device {
    fn export(&mut self, desc: &SurfaceDesc) -> Result<ExportedSurface, DeviceError> {
        if desc.extent.is_empty() {
            return Err(DeviceError::new(
                "CreateCommittedResource",
                format_args!("empty extent {}x{}", desc.extent.width, desc.extent.height),
            ));
        }
        let heap = D3D12_HEAP_PROPERTIES {
            Type: D3D12_HEAP_TYPE_DEFAULT,
            CreationNodeMask: 1,
            VisibleNodeMask: 1,
            ..Default::default()
        };
        let resource_desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
            Alignment: D3D12_DEFAULT_RESOURCE_PLACEMENT_ALIGNMENT.into(),
            Width: u64::from(desc.extent.width),
            Height: desc.extent.height,
            DepthOrArraySize: 1,
            MipLevels: 1,
            Format: storage_format(desc.present_format),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
            Flags: shared_resource_flags(desc.present_format),
        };

        let mut texture: Option<ID3D12Resource> = None;
        // SAFETY: heap and resource_desc are valid descriptions and texture
        // is a valid out-pointer.
        unsafe {
            self.device.CreateCommittedResource(
                &heap,
                D3D12_HEAP_FLAG_SHARED,
                &resource_desc,
                D3D12_RESOURCE_STATE_COMMON,
                None,
                &mut texture,
            )
        }
        .map_err(failed("CreateCommittedResource"))?;
        let texture = texture
            .ok_or_else(|| DeviceError::new("CreateCommittedResource", "no resource returned"))?;

        // SAFETY: texture is live; the handle is owned by this device and
        // closed on drop.
        let texture_handle = unsafe {
            self.device
                .CreateSharedHandle(&texture, None, GENERIC_ALL.0, PCWSTR::null())
        }
        .map_err(failed("CreateSharedHandle(texture)"))?;

        // SAFETY: as above, for a shared fence starting at zero.
        let (fence, fence_handle) = unsafe {
            let fence: ID3D12Fence = self
                .device
                .CreateFence(0, D3D12_FENCE_FLAG_SHARED)
                .map_err(failed("CreateFence"))?;
            let handle = self
                .device
                .CreateSharedHandle(&fence, None, GENERIC_ALL.0, PCWSTR::null())
                .map_err(failed("CreateSharedHandle(fence)"))?;
            (fence, handle)
        };

        let surface = ExportedSurface {
            image: com::image_of(&texture),
            sync: com::sync_of(&fence),
            os_image: os_handle(texture_handle),
            os_sync: os_handle(fence_handle),
        };
        tracing::debug!(
            width = desc.extent.width,
            height = desc.extent.height,
            format = ?desc.present_format,
            image = ?surface.image,
            "exported shared texture"
        );
        self.exported.push(Exported {
            _texture: texture,
            _fence: fence,
            texture_handle,
            fence_handle,
        });
        Ok(surface)
    }
}

// ---------------------------------------------------------------------------
// Present device
// ---------------------------------------------------------------------------

impl PresentDevice for D3d12Device {
    type Stream = D3d12Stream;
    type Pipeline = D3d12Pipeline;

    fn create_pipeline(
        &mut self,
        kind: PipelineKind,
        target: Extent,
    ) -> Result<D3d12Pipeline, DeviceError> {
        D3d12Pipeline::new(&self.device, kind, target)
    }

    fn begin_commands(&mut self, label: &'static str) -> Result<D3d12Stream, DeviceError> {
        let index = self.next_slot;
        self.next_slot = (self.next_slot + 1) % self.slots.len();
        self.block_until(self.slots[index].retired_at)?;
        let slot = &self.slots[index];
        // SAFETY: the slot's previous submission has retired, so its
        // allocator and list may be reset.
        unsafe {
            slot.allocator.Reset().map_err(failed("Reset(allocator)"))?;
            slot.list
                .Reset(&slot.allocator, None::<&ID3D12PipelineState>)
                .map_err(failed("Reset(list)"))?;
            // Names show up in PIX and debug layer messages.
            let _ = slot.list.SetName(&HSTRING::from(label));
        }
        Ok(D3d12Stream::new(
            self.device.clone(),
            slot.list.clone(),
            index,
            label,
            ClearSlots {
                rtv: self.clear_rtv.cpu(0),
                dsv: self.clear_dsv.cpu(0),
            },
        ))
    }

    fn submit(&mut self, stream: D3d12Stream) -> Result<(), DeviceError> {
        // SAFETY: the list is open and owned by this stream's slot.
        unsafe { stream.list.Close() }.map_err(failed("Close"))?;
        if let Some(err) = stream.error {
            tracing::error!(stream = stream.label, %err, "dropping stream with recording errors");
            return Err(err);
        }
        for &(sync, value) in &stream.waits {
            let fence = com::fence(sync)?;
            // SAFETY: queue and fence are live.
            unsafe { self.queue.Wait(&fence, value) }.map_err(failed("Wait"))?;
        }
        let list: ID3D12CommandList = stream.list.cast().map_err(failed("cast"))?;
        // SAFETY: the list is closed and its resources outlive execution.
        unsafe { self.queue.ExecuteCommandLists(&[Some(list)]) };
        for &(sync, value) in &stream.signals {
            let fence = com::fence(sync)?;
            // SAFETY: queue and fence are live.
            unsafe { self.queue.Signal(&fence, value) }.map_err(failed("Signal"))?;
        }
        let retired_at = self.mark()?;
        self.slots[stream.slot].retired_at = retired_at;
        tracing::trace!(
            stream = stream.label,
            waits = stream.waits.len(),
            signals = stream.signals.len(),
            retired_at,
            "submitted"
        );
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<(), DeviceError> {
        let value = self.mark()?;
        self.block_until(value)
    }
}
