// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame layers submitted to the compositor.
//!
//! A *layer* owns compositor swapchains and present pipelines, and moves
//! through one cycle per frame:
//!
//! ```text
//!   NotRendering ──prepare_rendering──► Preparing ──add_texture──► Binding
//!        ▲                                                            │
//!        │                                                    start_rendering
//!        │                                                            ▼
//!        └──────────── render + finish_rendering (or skip) ──── Rendering
//! ```
//!
//! There are exactly two variants, gathered in the closed [`Layer`] enum:
//!
//! - [`StereoLayer`]: one color and one depth swapchain per eye, submitted as
//!   a projection layer.
//! - [`OverlayLayer`]: a single swapchain, submitted as a quad in front of
//!   the head.
//!
//! Both share one [`StatusMachine`], which holds every status rule.
//!
//! Bound textures are [`Handoff<Present>`](crate::resource::Handoff)
//! tokens. Rendering waits on each, samples it, signals, and parks the
//! returned render-side token in the [`ResourceStore`]. A frame the
//! compositor does not display goes through [`Layer::skip`] instead, which
//! passes each token through without drawing so the render side is never
//! left waiting.

mod overlay;
mod status;
mod stereo;

pub use overlay::{OverlayLayer, quad_size};
pub use status::{LayerKind, LayerOp, LayerStatus, StatusMachine};
pub use stereo::StereoLayer;

use crate::api::{Present, ResourceState};
use crate::device::{CommandStream, DrawSource, PresentPipeline};
use crate::error::Result;
use crate::resource::{Handoff, ResourceStore, WriteAccess};
use crate::swapchain::SwapchainImages;
use crate::time::XrDuration;
use crate::trace::Tracer;

/// What a layer needs to record present-side work.
pub struct RenderContext<'a, 't> {
    /// Owner of the shared images being sampled.
    pub resources: &'a mut ResourceStore,
    /// The present-API stream the draws go into.
    pub stream: &'a mut dyn CommandStream<Present>,
    /// Trace sink for handoff events.
    pub tracer: &'a mut Tracer<'t>,
}

impl core::fmt::Debug for RenderContext<'_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RenderContext")
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

impl RenderContext<'_, '_> {
    /// Waits on `token` and moves the image to its shader-read state.
    fn sample(&mut self, token: Handoff<Present>) -> Result<(WriteAccess<Present>, DrawSource)> {
        let access = self
            .resources
            .wait_before_write(&mut *self.stream, token, self.tracer)?;
        let resource = self.resources.get_mut(access.resource())?;
        resource.transition(&access, &mut *self.stream, ResourceState::PixelShaderResource);
        let side = resource.side::<Present>();
        let source = DrawSource {
            image: side.image(),
            view_format: side.format().sampled_view(),
        };
        Ok((access, source))
    }

    /// Moves the image back to its copy-destination state, signals, and
    /// parks the render-side token.
    fn release(&mut self, access: WriteAccess<Present>) -> Result<()> {
        let resource = self.resources.get_mut(access.resource())?;
        resource.transition(&access, &mut *self.stream, ResourceState::CopyDest);
        let handoff = self
            .resources
            .signal_after_write(&mut *self.stream, access, self.tracer)?;
        self.resources.park(handoff)?;
        Ok(())
    }

    /// Returns ownership to the render side without touching the image.
    fn pass_through(&mut self, token: Handoff<Present>) -> Result<()> {
        let access = self
            .resources
            .wait_before_write(&mut *self.stream, token, self.tracer)?;
        let handoff = self
            .resources
            .signal_after_write(&mut *self.stream, access, self.tracer)?;
        self.resources.park(handoff)?;
        Ok(())
    }
}

/// One of the two layers a session submits.
#[derive(Debug)]
pub enum Layer<S, P> {
    /// The stereo 3D view.
    Stereo(StereoLayer<S, P>),
    /// The flat 2D overlay.
    Overlay(OverlayLayer<S, P>),
}

impl<S: SwapchainImages, P: PresentPipeline> Layer<S, P> {
    /// Which variant this is.
    #[must_use]
    pub const fn kind(&self) -> LayerKind {
        match self {
            Self::Stereo(_) => LayerKind::Stereo,
            Self::Overlay(_) => LayerKind::Overlay,
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> LayerStatus {
        match self {
            Self::Stereo(l) => l.status(),
            Self::Overlay(l) => l.status(),
        }
    }

    /// Begins a frame: acquires every owned swapchain image.
    pub fn prepare_rendering(
        &mut self,
        frame_index: u64,
        timeout: XrDuration,
        tracer: &mut Tracer<'_>,
    ) -> Result<()> {
        match self {
            Self::Stereo(l) => l.prepare_rendering(frame_index, timeout, tracer),
            Self::Overlay(l) => l.prepare_rendering(frame_index, timeout, tracer),
        }
    }

    /// Freezes the bindings.
    pub fn start_rendering(&mut self, tracer: &mut Tracer<'_>) -> Result<()> {
        match self {
            Self::Stereo(l) => l.start_rendering(tracer),
            Self::Overlay(l) => l.start_rendering(tracer),
        }
    }

    /// Ends a frame the compositor will not display.
    pub fn skip(&mut self, ctx: &mut RenderContext<'_, '_>) -> Result<()> {
        match self {
            Self::Stereo(l) => l.skip(ctx),
            Self::Overlay(l) => l.skip(ctx),
        }
    }

    /// The stereo layer, if this is one.
    pub fn as_stereo_mut(&mut self) -> Option<&mut StereoLayer<S, P>> {
        match self {
            Self::Stereo(l) => Some(l),
            Self::Overlay(_) => None,
        }
    }

    /// The overlay layer, if this is one.
    pub fn as_overlay_mut(&mut self) -> Option<&mut OverlayLayer<S, P>> {
        match self {
            Self::Overlay(l) => Some(l),
            Self::Stereo(_) => None,
        }
    }
}
