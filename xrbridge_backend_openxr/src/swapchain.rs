// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime swapchains.

use core::fmt;

use openxr as xr;
use xrbridge_core::api::Format;
use xrbridge_core::error::CompositorError;
use xrbridge_core::handle::{NativeImage, SwapchainHandle};
use xrbridge_core::swapchain::SwapchainImages;
use xrbridge_core::time::XrDuration;

use crate::convert::duration_to_xr;
use crate::failed;

/// One runtime swapchain and its `ID3D12Resource` images.
///
/// The images belong to the runtime and live as long as the swapchain.
pub struct XrSwapchainImages {
    swapchain: xr::Swapchain<xr::D3D12>,
    images: Vec<NativeImage>,
    format: Format,
}

impl fmt::Debug for XrSwapchainImages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XrSwapchainImages")
            .field("handle", &self.handle())
            .field("images", &self.images)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl XrSwapchainImages {
    pub(crate) fn new(
        swapchain: xr::Swapchain<xr::D3D12>,
        format: Format,
    ) -> Result<Self, CompositorError> {
        let images = swapchain
            .enumerate_images()
            .map_err(failed("xrEnumerateSwapchainImages"))?
            .into_iter()
            .map(|resource| NativeImage(resource as usize as u64))
            .collect();
        Ok(Self {
            swapchain,
            images,
            format,
        })
    }

    /// Number of images in the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Returns `true` if the runtime gave no images.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Image format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }
}

impl SwapchainImages for XrSwapchainImages {
    fn handle(&self) -> SwapchainHandle {
        SwapchainHandle(self.swapchain.as_raw().into_raw())
    }

    fn acquire(&mut self) -> Result<u32, CompositorError> {
        self.swapchain
            .acquire_image()
            .map_err(failed("xrAcquireSwapchainImage"))
    }

    fn wait(&mut self, timeout: XrDuration) -> Result<(), CompositorError> {
        self.swapchain
            .wait_image(duration_to_xr(timeout))
            .map_err(failed("xrWaitSwapchainImage"))
    }

    fn release(&mut self) -> Result<(), CompositorError> {
        self.swapchain
            .release_image()
            .map_err(failed("xrReleaseSwapchainImage"))
    }

    fn image(&self, index: u32) -> Option<NativeImage> {
        self.images.get(usize::try_from(index).ok()?).copied()
    }
}
