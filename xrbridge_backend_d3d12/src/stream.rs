// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command list recording.

use core::mem::{ManuallyDrop, transmute_copy};
use core::ptr;

use windows::Win32::Graphics::Direct3D12::{
    D3D12_BOX, D3D12_CLEAR_FLAG_DEPTH, D3D12_CPU_DESCRIPTOR_HANDLE, D3D12_RESOURCE_BARRIER,
    D3D12_RESOURCE_BARRIER_0, D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
    D3D12_RESOURCE_BARRIER_FLAG_NONE, D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
    D3D12_RESOURCE_BARRIER_TYPE_UAV, D3D12_RESOURCE_TRANSITION_BARRIER,
    D3D12_RESOURCE_UAV_BARRIER, D3D12_TEXTURE_COPY_LOCATION, D3D12_TEXTURE_COPY_LOCATION_0,
    D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX, ID3D12Device, ID3D12GraphicsCommandList,
    ID3D12Resource,
};
use windows_core::Interface;
use xrbridge_core::api::{Format, Present, ResourceState};
use xrbridge_core::composition::Extent;
use xrbridge_core::device::{ClearValue, CommandStream};
use xrbridge_core::error::DeviceError;
use xrbridge_core::handle::{NativeImage, SyncHandle};

use crate::com;
use crate::format::resource_state;
use crate::views::{write_dsv, write_rtv};

/// CPU-only descriptor slots used for clears.
///
/// Views in non-shader-visible heaps are consumed when the command is
/// recorded, so one slot of each kind is reused for every clear.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ClearSlots {
    pub(crate) rtv: D3D12_CPU_DESCRIPTOR_HANDLE,
    pub(crate) dsv: D3D12_CPU_DESCRIPTOR_HANDLE,
}

/// A command list being recorded for the present queue.
///
/// Fence waits and signals are collected here and issued on the queue by
/// [`D3d12Device::submit`](crate::D3d12Device), waits before the list
/// executes and signals after it.
#[derive(Debug)]
pub struct D3d12Stream {
    pub(crate) list: ID3D12GraphicsCommandList,
    pub(crate) slot: usize,
    pub(crate) label: &'static str,
    pub(crate) waits: Vec<(SyncHandle, u64)>,
    pub(crate) signals: Vec<(SyncHandle, u64)>,
    pub(crate) error: Option<DeviceError>,
    device: ID3D12Device,
    clear_slots: ClearSlots,
}

impl D3d12Stream {
    pub(crate) fn new(
        device: ID3D12Device,
        list: ID3D12GraphicsCommandList,
        slot: usize,
        label: &'static str,
        clear_slots: ClearSlots,
    ) -> Self {
        Self {
            list,
            slot,
            label,
            waits: Vec::new(),
            signals: Vec::new(),
            error: None,
            device,
            clear_slots,
        }
    }

    /// The command list, for recording work the core does not model.
    #[must_use]
    pub fn list(&self) -> &ID3D12GraphicsCommandList {
        &self.list
    }

    /// Resolves `image`, keeping the first failure for
    /// [`D3d12Device`](crate::D3d12Device) to report at submission.
    fn resolve(&mut self, image: NativeImage) -> Option<ID3D12Resource> {
        match com::resource(image) {
            Ok(resource) => Some(resource),
            Err(err) => {
                tracing::error!(stream = self.label, %err, "unresolvable image");
                self.error.get_or_insert(err);
                None
            }
        }
    }
}

fn transition_barrier(
    resource: &ID3D12Resource,
    before: ResourceState,
    after: ResourceState,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                // SAFETY: copies the interface pointer without an AddRef.
                // The barrier is consumed before `resource` is dropped and
                // the ManuallyDrop wrapper never releases it.
                pResource: unsafe { transmute_copy(resource) },
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: resource_state(before),
                StateAfter: resource_state(after),
            }),
        },
    }
}

fn copy_location(resource: &ID3D12Resource) -> D3D12_TEXTURE_COPY_LOCATION {
    D3D12_TEXTURE_COPY_LOCATION {
        // SAFETY: borrowed pointer, as in `transition_barrier`.
        pResource: unsafe { transmute_copy(resource) },
        Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
        Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
            SubresourceIndex: 0,
        },
    }
}

impl CommandStream<Present> for D3d12Stream {
    fn wait(&mut self, sync: SyncHandle, value: u64) {
        self.waits.push((sync, value));
    }

    fn signal(&mut self, sync: SyncHandle, value: u64) {
        self.signals.push((sync, value));
    }

    fn full_barrier(&mut self) {
        let barrier = D3D12_RESOURCE_BARRIER {
            Type: D3D12_RESOURCE_BARRIER_TYPE_UAV,
            Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
            Anonymous: D3D12_RESOURCE_BARRIER_0 {
                UAV: ManuallyDrop::new(D3D12_RESOURCE_UAV_BARRIER {
                    pResource: ManuallyDrop::new(None),
                }),
            },
        };
        // SAFETY: a UAV barrier on no resource orders all prior work.
        unsafe { self.list.ResourceBarrier(&[barrier]) };
    }

    fn transition(
        &mut self,
        image: NativeImage,
        _format: Format,
        from: ResourceState,
        to: ResourceState,
    ) {
        if from == to {
            return;
        }
        let Some(resource) = self.resolve(image) else {
            return;
        };
        let barrier = transition_barrier(&resource, from, to);
        // SAFETY: the barrier references `resource`, which outlives the call.
        unsafe { self.list.ResourceBarrier(&[barrier]) };
    }

    fn copy_image(
        &mut self,
        src: NativeImage,
        dst: NativeImage,
        _format: Format,
        _src_state: ResourceState,
        _dst_state: ResourceState,
        extent: Extent,
    ) {
        let (Some(src), Some(dst)) = (self.resolve(src), self.resolve(dst)) else {
            return;
        };
        let region = D3D12_BOX {
            left: 0,
            top: 0,
            front: 0,
            right: extent.width,
            bottom: extent.height,
            back: 1,
        };
        let (src_loc, dst_loc) = (copy_location(&src), copy_location(&dst));
        // SAFETY: both locations reference resources that outlive the call,
        // and the caller put them in their copy states.
        unsafe {
            self.list.CopyTextureRegion(
                &dst_loc,
                0,
                0,
                0,
                &src_loc,
                Some(ptr::from_ref(&region)),
            );
        }
    }

    fn clear(
        &mut self,
        image: NativeImage,
        format: Format,
        _state: ResourceState,
        value: ClearValue,
    ) {
        let Some(resource) = self.resolve(image) else {
            return;
        };
        match value {
            ClearValue::Color(rgba) => {
                write_rtv(&self.device, &resource, format, self.clear_slots.rtv);
                // SAFETY: the RTV was just written for a live resource in
                // the render target state.
                unsafe {
                    self.list
                        .ClearRenderTargetView(self.clear_slots.rtv, &rgba, None);
                }
            }
            ClearValue::Depth(depth) => {
                write_dsv(&self.device, &resource, format, self.clear_slots.dsv);
                // SAFETY: as above, for a depth resource in the depth-write
                // state.
                unsafe {
                    self.list.ClearDepthStencilView(
                        self.clear_slots.dsv,
                        D3D12_CLEAR_FLAG_DEPTH,
                        depth,
                        0,
                        None,
                    );
                }
            }
        }
    }

    fn raw_commands(&self) -> u64 {
        self.list.as_raw() as usize as u64
    }
}
