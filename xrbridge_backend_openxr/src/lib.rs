// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! OpenXR compositor backend for xrbridge.
//!
//! The runtime is driven through the `openxr` crate with the D3D12 graphics
//! binding, so the present device is a
//! [`D3d12Device`](xrbridge_backend_d3d12::D3d12Device):
//!
//! - [`start_session`]: runtime load, adapter selection, and session
//!   creation.
//! - [`OpenXrCompositor`]: the frame loop, swapchain creation, view
//!   location, and layer submission.
//! - [`XrSwapchainImages`]: one runtime swapchain.
//! - [`convert`]: pose, field of view, and time conversion.
//!
//! Swapchains are identified to the core by their raw `XrSwapchain` value,
//! which is also what layer submission hands back to the runtime.

#![expect(
    unsafe_code,
    reason = "session creation and raw swapchain references are unsafe in openxr"
)]

mod compositor;
pub mod convert;
mod session;
mod swapchain;

pub use compositor::OpenXrCompositor;
pub use session::{XrSession, start_session};
pub use swapchain::XrSwapchainImages;

use openxr as xr;
use xrbridge_core::error::CompositorError;

/// The only view configuration xrbridge drives.
pub(crate) const VIEW_TYPE: xr::ViewConfigurationType =
    xr::ViewConfigurationType::PRIMARY_STEREO;

/// Maps a failed call to a [`CompositorError`] naming it.
fn failed(call: &'static str) -> impl FnOnce(xr::sys::Result) -> CompositorError {
    move |err| CompositorError::new(call, err)
}
