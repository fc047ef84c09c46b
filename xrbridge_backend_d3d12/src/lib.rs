// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Direct3D 12 present backend for xrbridge.
//!
//! The XR runtime consumes D3D12 textures. This crate provides the present
//! side of the handoff:
//!
//! - [`D3d12Device`]: the device and direct queue handed to the runtime.
//!   Implements [`PresentDevice`](xrbridge_core::device::PresentDevice) and
//!   [`ResourceExporter`](xrbridge_core::device::ResourceExporter).
//! - [`D3d12Stream`]: command list recording with queue-level fence waits
//!   and signals.
//! - [`D3d12Pipeline`]: the stereo and overlay present pipelines.
//! - [`format`]: format and resource state mapping.
//!
//! Native objects cross the core boundary as raw COM pointers stored in
//! [`NativeImage`](xrbridge_core::handle::NativeImage) and
//! [`SyncHandle`](xrbridge_core::handle::SyncHandle). The device keeps every
//! exported object alive until it is dropped, so those pointers stay valid
//! for the whole session.

#![expect(
    unsafe_code,
    reason = "D3D12 backend requires COM FFI throughout"
)]

mod com;
mod device;
pub mod format;
mod pipeline;
mod stream;
mod views;

pub use device::D3d12Device;
pub use pipeline::D3d12Pipeline;
pub use stream::D3d12Stream;
