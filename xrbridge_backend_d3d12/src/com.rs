// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conversions between COM interfaces and the core's opaque handles.

use core::ffi::c_void;

use windows::Win32::Graphics::Direct3D12::{
    ID3D12Fence, ID3D12GraphicsCommandList, ID3D12Resource,
};
use windows_core::Interface;
use xrbridge_core::error::DeviceError;
use xrbridge_core::handle::{NativeImage, SyncHandle};

#[expect(
    clippy::cast_possible_truncation,
    reason = "handles carry pointers, which are 64-bit on every D3D12 target"
)]
fn as_ptr(raw: u64) -> *mut c_void {
    raw as usize as *mut c_void
}

/// Stores a COM pointer in a core handle without touching its refcount.
pub(crate) fn image_of(resource: &ID3D12Resource) -> NativeImage {
    NativeImage(resource.as_raw() as usize as u64)
}

/// Stores a COM pointer in a core handle without touching its refcount.
pub(crate) fn sync_of(fence: &ID3D12Fence) -> SyncHandle {
    SyncHandle(fence.as_raw() as usize as u64)
}

/// Takes a new reference to the resource behind `image`.
pub(crate) fn resource(image: NativeImage) -> Result<ID3D12Resource, DeviceError> {
    let raw = as_ptr(image.raw());
    // SAFETY: every NativeImage on the present side was produced by
    // `image_of` from a resource the device (or the XR runtime's swapchain)
    // keeps alive for the session, or is null, which yields None.
    unsafe { ID3D12Resource::from_raw_borrowed(&raw) }
        .cloned()
        .ok_or_else(|| DeviceError::new("ID3D12Resource", format_args!("null image {image:?}")))
}

/// Takes a new reference to the fence behind `sync`.
pub(crate) fn fence(sync: SyncHandle) -> Result<ID3D12Fence, DeviceError> {
    let raw = as_ptr(sync.raw());
    // SAFETY: as in `resource`; fences are only ever created by the device's
    // exporter, which owns them until drop.
    unsafe { ID3D12Fence::from_raw_borrowed(&raw) }
        .cloned()
        .ok_or_else(|| DeviceError::new("ID3D12Fence", format_args!("null fence {sync:?}")))
}

/// Takes a new reference to the command list behind a stream's raw handle.
pub(crate) fn command_list(raw: u64) -> Result<ID3D12GraphicsCommandList, DeviceError> {
    let raw = as_ptr(raw);
    // SAFETY: present streams are D3d12Streams, whose raw handle is the live
    // command list they record into.
    unsafe { ID3D12GraphicsCommandList::from_raw_borrowed(&raw) }
        .cloned()
        .ok_or_else(|| DeviceError::new("draw", "stream has no command list"))
}

/// Maps a failed call to a [`DeviceError`] naming it.
pub(crate) fn failed(call: &'static str) -> impl FnOnce(windows_core::Error) -> DeviceError {
    move |err| DeviceError::new(call, err)
}
