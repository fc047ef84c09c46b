// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Acquire/release guard around a compositor swapchain.
//!
//! ```text
//!            prepare_rendering        start_rendering
//!   Idle ─────────────────────► Acquired ──────────────► Rendering
//!    ▲   acquire + wait                                      │
//!    └───────────────────────────────────────────────────────┘
//!                    finish_rendering (release)
//! ```
//!
//! The compositor owns the images; [`SwapchainImages`] is the backend view
//! of them. [`Swapchain`] enforces the order and counts acquires and
//! releases so a test can check that they balance.

use crate::api::Format;
use crate::composition::Extent;
use crate::error::{CompositorError, Result, SwapchainError};
use crate::handle::{NativeImage, SwapchainHandle};
use crate::time::XrDuration;
use crate::trace::{SwapchainEvent, SwapchainOp, Tracer};

/// Creation parameters for a swapchain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainDesc {
    /// Image size.
    pub extent: Extent,
    /// Samples per texel.
    pub sample_count: u32,
    /// Image format.
    pub format: Format,
}

/// Backend access to a compositor-owned ring of images.
pub trait SwapchainImages {
    /// Opaque handle the compositor knows this swapchain by.
    fn handle(&self) -> SwapchainHandle;

    /// Acquires the next image and returns its index.
    fn acquire(&mut self) -> Result<u32, CompositorError>;

    /// Blocks until the acquired image may be written.
    fn wait(&mut self, timeout: XrDuration) -> Result<(), CompositorError>;

    /// Releases the acquired image to the compositor.
    fn release(&mut self) -> Result<(), CompositorError>;

    /// The native image at `index`, if it exists.
    fn image(&self, index: u32) -> Option<NativeImage>;
}

/// Where a [`Swapchain`] is in its per-frame cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainState {
    /// No image held.
    Idle,
    /// An image is acquired and waited on, not yet a render target.
    Acquired(u32),
    /// The acquired image is the active render target.
    Rendering(u32),
}

/// A compositor swapchain with its acquire/release order enforced.
#[derive(Debug)]
pub struct Swapchain<S> {
    images: S,
    desc: SwapchainDesc,
    state: SwapchainState,
    acquires: u64,
    releases: u64,
}

impl<S: SwapchainImages> Swapchain<S> {
    /// Wraps backend images created from `desc`.
    pub fn new(images: S, desc: SwapchainDesc) -> Self {
        Self {
            images,
            desc,
            state: SwapchainState::Idle,
            acquires: 0,
            releases: 0,
        }
    }

    /// Acquires the next image and waits until it is safe to write.
    ///
    /// Fails if an image from an earlier frame is still held.
    pub fn prepare_rendering(
        &mut self,
        timeout: XrDuration,
        tracer: &mut Tracer<'_>,
    ) -> Result<()> {
        if self.state != SwapchainState::Idle {
            let handle = self.images.handle();
            tracing::error!(
                swapchain = ?handle,
                state = ?self.state,
                "prepare_rendering with an image still acquired"
            );
            return Err(SwapchainError::AlreadyAcquired(handle).into());
        }
        let index = self.images.acquire()?;
        self.images.wait(timeout)?;
        self.state = SwapchainState::Acquired(index);
        self.acquires += 1;
        tracer.swapchain(&SwapchainEvent {
            swapchain: self.images.handle(),
            op: SwapchainOp::Acquire,
            image_index: index,
        });
        Ok(())
    }

    /// Marks the acquired image as the active render target.
    pub fn start_rendering(&mut self) -> Result<(), SwapchainError> {
        match self.state {
            SwapchainState::Acquired(index) => {
                self.state = SwapchainState::Rendering(index);
                Ok(())
            }
            _ => Err(SwapchainError::NotAcquired(self.images.handle())),
        }
    }

    /// Releases the active image back to the compositor.
    pub fn finish_rendering(&mut self, tracer: &mut Tracer<'_>) -> Result<()> {
        let SwapchainState::Rendering(index) = self.state else {
            return Err(SwapchainError::NotRendering(self.images.handle()).into());
        };
        self.images.release()?;
        self.state = SwapchainState::Idle;
        self.releases += 1;
        tracer.swapchain(&SwapchainEvent {
            swapchain: self.images.handle(),
            op: SwapchainOp::Release,
            image_index: index,
        });
        Ok(())
    }

    /// The active render target. Only available while rendering.
    pub fn texture(&self) -> Result<NativeImage> {
        let SwapchainState::Rendering(index) = self.state else {
            return Err(SwapchainError::NotRendering(self.images.handle()).into());
        };
        self.images.image(index).ok_or_else(|| {
            CompositorError::new("swapchain image", format_args!("index {index} out of range"))
                .into()
        })
    }

    /// Image format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.desc.format
    }

    /// Image size.
    #[must_use]
    pub const fn extent(&self) -> Extent {
        self.desc.extent
    }

    /// Creation parameters.
    #[must_use]
    pub const fn desc(&self) -> &SwapchainDesc {
        &self.desc
    }

    /// The compositor's handle.
    #[must_use]
    pub fn handle(&self) -> SwapchainHandle {
        self.images.handle()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SwapchainState {
        self.state
    }

    /// Successful `prepare_rendering` calls so far.
    #[must_use]
    pub const fn acquires(&self) -> u64 {
        self.acquires
    }

    /// Successful `finish_rendering` calls so far.
    #[must_use]
    pub const fn releases(&self) -> u64 {
        self.releases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::RingImages;

    fn swapchain() -> Swapchain<RingImages> {
        let desc = SwapchainDesc {
            extent: Extent::new(1832, 1920),
            sample_count: 1,
            format: Format::Rgba8Srgb,
        };
        Swapchain::new(RingImages::new(7, 3), desc)
    }

    #[test]
    fn full_cycle_balances() {
        let mut sc = swapchain();
        let mut tracer = Tracer::none();
        for _ in 0..4 {
            sc.prepare_rendering(XrDuration::INFINITE, &mut tracer).unwrap();
            assert!(sc.texture().is_err(), "texture hidden before start");
            sc.start_rendering().unwrap();
            assert!(!sc.texture().unwrap().is_null(), "texture while rendering");
            sc.finish_rendering(&mut tracer).unwrap();
        }
        assert_eq!(sc.acquires(), 4, "four acquires");
        assert_eq!(sc.releases(), 4, "balanced releases");
        assert_eq!(sc.state(), SwapchainState::Idle, "idle after finish");
    }

    #[test]
    fn second_prepare_without_finish_fails() {
        let mut sc = swapchain();
        let mut tracer = Tracer::none();
        sc.prepare_rendering(XrDuration::INFINITE, &mut tracer).unwrap();
        let err = sc
            .prepare_rendering(XrDuration::INFINITE, &mut tracer)
            .unwrap_err();
        assert!(
            matches!(err, Error::Swapchain(SwapchainError::AlreadyAcquired(_))),
            "double acquire: {err}"
        );
        assert_eq!(sc.acquires(), 1, "failed call is not counted");
    }

    #[test]
    fn finish_requires_start() {
        let mut sc = swapchain();
        let mut tracer = Tracer::none();
        assert!(sc.finish_rendering(&mut tracer).is_err(), "finish while idle");
        assert!(sc.start_rendering().is_err(), "start while idle");
        sc.prepare_rendering(XrDuration::INFINITE, &mut tracer).unwrap();
        assert!(sc.finish_rendering(&mut tracer).is_err(), "finish before start");
        assert_eq!(sc.releases(), 0, "nothing released");
    }

    #[test]
    fn static_properties_survive_release() {
        let mut sc = swapchain();
        let mut tracer = Tracer::none();
        sc.prepare_rendering(XrDuration::INFINITE, &mut tracer).unwrap();
        sc.start_rendering().unwrap();
        sc.finish_rendering(&mut tracer).unwrap();
        assert_eq!(sc.format(), Format::Rgba8Srgb, "format after release");
        assert_eq!(sc.extent(), Extent::new(1832, 1920), "extent after release");
        assert_eq!(sc.handle(), SwapchainHandle(7), "handle after release");
    }
}
