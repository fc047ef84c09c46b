// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vulkan render backend for xrbridge.
//!
//! The application renders with Vulkan; the XR runtime consumes D3D12. This
//! crate provides the render side of the handoff:
//!
//! - [`VulkanBootstrap`]: interop capability query and adapter report.
//! - [`VulkanImporter`]: imports shared D3D12 textures and fences.
//! - [`VulkanStream`]: command buffer recording with timeline semaphore
//!   waits and signals attached at submission.
//! - [`format`]: format, layout, and aspect mapping.
//!
//! Vulkan handles cross the core boundary through
//! [`Handle::as_raw`](ash::vk::Handle::as_raw), so no pointer casts are
//! involved on this side.

#![expect(
    unsafe_code,
    reason = "Vulkan backend calls ash's unsafe entry points throughout"
)]

mod bootstrap;
pub mod format;
mod import;
mod stream;

pub use bootstrap::VulkanBootstrap;
pub use import::VulkanImporter;
pub use stream::VulkanStream;

use ash::vk;
use xrbridge_core::error::DeviceError;

/// Maps a failed call to a [`DeviceError`] naming it.
fn failed(call: &'static str) -> impl FnOnce(vk::Result) -> DeviceError {
    move |err| DeviceError::new(call, err)
}
