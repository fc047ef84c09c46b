// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The XR compositor as seen by the frame orchestrator.

use crate::composition::{CompositionLayer, Extent};
use crate::error::CompositorError;
use crate::swapchain::{SwapchainDesc, SwapchainImages};
use crate::time::{XrDuration, XrTime};
use crate::view::ViewProvider;

/// Recommended render target for one view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewConfig {
    /// Recommended image size.
    pub recommended_extent: Extent,
    /// Recommended samples per texel.
    pub sample_count: u32,
}

/// What the compositor reports when it releases the frame loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameState {
    /// When the frame is expected to reach the display.
    pub predicted_display_time: XrTime,
    /// Expected time between displayed frames.
    pub predicted_period: XrDuration,
    /// Whether the frame will be displayed at all.
    pub should_render: bool,
}

/// An XR runtime session.
///
/// Every error is fatal to the session; implementations do not retry.
pub trait Compositor: ViewProvider {
    /// Swapchain image ring type.
    type Images: SwapchainImages;

    /// Recommended view configurations, left eye first.
    fn view_configurations(&mut self) -> Result<Vec<ViewConfig>, CompositorError>;

    /// Creates a swapchain.
    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<Self::Images, CompositorError>;

    /// Blocks until the compositor wants the next frame.
    fn wait_frame(&mut self) -> Result<FrameState, CompositorError>;

    /// Opens the frame.
    fn begin_frame(&mut self) -> Result<(), CompositorError>;

    /// Submits `layers` (possibly none) and closes the frame.
    fn end_frame(
        &mut self,
        display_time: XrTime,
        layers: &[CompositionLayer],
    ) -> Result<(), CompositorError>;

    /// Asks the runtime to wind the session down.
    fn request_exit(&mut self) -> Result<(), CompositorError>;

    /// Ends the session.
    fn end_session(&mut self) -> Result<(), CompositorError>;
}
