// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use glam::{Quat, Vec2, Vec3};

use crate::api::Present;
use crate::composition::{EyeVisibility, Extent, QuadLayer, Rect, SubImage};
use crate::config::OverlayConfig;
use crate::device::{DrawJob, DrawTarget, PresentPipeline};
use crate::error::{LayerError, Result};
use crate::handle::ResourceId;
use crate::resource::{Handoff, ResourceStore};
use crate::swapchain::{Swapchain, SwapchainImages};
use crate::time::XrDuration;
use crate::trace::Tracer;
use crate::view::Pose;

use super::{LayerKind, LayerOp, LayerStatus, RenderContext, StatusMachine};

/// Quad size in meters for a texture of `extent`.
///
/// The shorter side is `size_m` and the other follows the texture's aspect
/// ratio.
#[must_use]
pub fn quad_size(extent: Extent, size_m: f32) -> Vec2 {
    let aspect = extent.aspect_ratio();
    if aspect <= 0.0 {
        return Vec2::splat(size_m);
    }
    let width = if aspect > 1.0 { aspect } else { 1.0 };
    let height = if aspect <= 1.0 { 1.0 / aspect } else { 1.0 };
    Vec2::new(width, height) * size_m
}

/// The flat overlay layer.
///
/// Owns one swapchain and one present pipeline. Its single slot binds once
/// per frame.
#[derive(Debug)]
pub struct OverlayLayer<S, P> {
    machine: StatusMachine,
    swapchain: Swapchain<S>,
    pipeline: P,
    slot: Option<Handoff<Present>>,
    pending: Option<Handoff<Present>>,
    bound: Option<ResourceId>,
}

impl<S: SwapchainImages, P: PresentPipeline> OverlayLayer<S, P> {
    /// Creates a layer drawing into `swapchain` with `pipeline`.
    pub fn new(swapchain: Swapchain<S>, pipeline: P) -> Self {
        Self {
            machine: StatusMachine::new(LayerKind::Overlay),
            swapchain,
            pipeline,
            slot: None,
            pending: None,
            bound: None,
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> LayerStatus {
        self.machine.status()
    }

    /// The owned swapchain.
    #[must_use]
    pub const fn swapchain(&self) -> &Swapchain<S> {
        &self.swapchain
    }

    /// Begins a frame: acquires the swapchain image.
    pub fn prepare_rendering(
        &mut self,
        frame_index: u64,
        timeout: XrDuration,
        tracer: &mut Tracer<'_>,
    ) -> Result<()> {
        self.machine.check(LayerOp::PrepareRendering)?;
        self.machine.set_frame(frame_index);
        self.bound = None;
        self.swapchain.prepare_rendering(timeout, tracer)?;
        self.machine.advance(LayerOp::PrepareRendering, tracer)?;
        Ok(())
    }

    /// Binds the texture drawn this frame.
    pub fn add_texture(
        &mut self,
        texture: Handoff<Present>,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), LayerError> {
        self.machine.check(LayerOp::AddTexture)?;
        self.bound = Some(texture.resource());
        self.slot = Some(texture);
        self.machine.advance(LayerOp::AddTexture, tracer)
    }

    /// Freezes the binding and makes the swapchain image a render target.
    pub fn start_rendering(&mut self, tracer: &mut Tracer<'_>) -> Result<()> {
        self.machine.check(LayerOp::StartRendering)?;
        let Some(texture) = self.slot.take() else {
            tracing::error!("overlay layer started without a texture");
            return Err(LayerError::MissingTexture(LayerKind::Overlay).into());
        };
        self.pending = Some(texture);
        self.swapchain.start_rendering()?;
        self.machine.advance(LayerOp::StartRendering, tracer)?;
        Ok(())
    }

    /// Samples the bound texture into the swapchain image.
    pub fn render(&mut self, ctx: &mut RenderContext<'_, '_>) -> Result<()> {
        self.machine.check(LayerOp::Render)?;
        let texture = self
            .pending
            .take()
            .ok_or(LayerError::InvalidTransition {
                layer: LayerKind::Overlay,
                op: LayerOp::Render,
                status: self.machine.status(),
            })?;
        let (access, source) = ctx.sample(texture)?;
        let job = DrawJob {
            color: Some(source),
            depth: None,
            target: DrawTarget {
                image: self.swapchain.texture()?,
                format: self.swapchain.format(),
            },
            depth_target: None,
            extent: self.swapchain.extent(),
        };
        self.pipeline.draw(&mut *ctx.stream, &job)?;
        ctx.release(access)?;
        Ok(())
    }

    /// Releases the swapchain image and places the quad in front of `head`.
    pub fn finish_rendering(
        &mut self,
        head: Pose,
        resources: &ResourceStore,
        config: &OverlayConfig,
        tracer: &mut Tracer<'_>,
    ) -> Result<QuadLayer> {
        self.machine.check(LayerOp::FinishRendering)?;
        if self.pending.is_some() {
            tracing::error!("overlay layer finished before rendering");
            return Err(LayerError::NotRendered(LayerKind::Overlay).into());
        }
        let Some(id) = self.bound else {
            return Err(LayerError::MissingTexture(LayerKind::Overlay).into());
        };
        let texture_extent = resources.get(id)?.extent();

        let position = head.position - Vec3::Z * config.distance_m;
        let quad = QuadLayer {
            pose: Pose {
                position,
                orientation: Quat::IDENTITY,
            },
            size: quad_size(texture_extent, config.size_m),
            sub_image: SubImage {
                swapchain: self.swapchain.handle(),
                rect: Rect::full(self.swapchain.extent()),
                array_index: 0,
            },
            blend_source_alpha: config.blend_source_alpha,
            eye_visibility: EyeVisibility::Both,
        };

        self.swapchain.finish_rendering(tracer)?;
        self.machine.advance(LayerOp::FinishRendering, tracer)?;
        Ok(quad)
    }

    /// Ends a frame without drawing, handing the bound texture straight back
    /// to the render side.
    pub fn skip(&mut self, ctx: &mut RenderContext<'_, '_>) -> Result<()> {
        self.machine.check(LayerOp::FinishRendering)?;
        if let Some(texture) = self.pending.take() {
            ctx.pass_through(texture)?;
        }
        self.swapchain.finish_rendering(ctx.tracer)?;
        self.machine.advance(LayerOp::FinishRendering, ctx.tracer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Format, Render};
    use crate::error::Error;
    use crate::swapchain::SwapchainDesc;
    use crate::testing::{
        RecordingPipeline, RecordingStream, RingImages, import_resource, render_handoff,
    };

    fn layer() -> OverlayLayer<RingImages, RecordingPipeline> {
        let desc = SwapchainDesc {
            extent: Extent::new(1832, 1920),
            sample_count: 1,
            format: Format::Rgba8Srgb,
        };
        OverlayLayer::new(
            Swapchain::new(RingImages::new(9, 3), desc),
            RecordingPipeline::default(),
        )
    }

    #[test]
    fn quad_follows_texture_aspect() {
        let wide = quad_size(Extent::new(1920, 1080), 1.0);
        assert_eq!(wide, Vec2::new(1920.0 / 1080.0, 1.0), "wide");
        assert_eq!(quad_size(Extent::new(1000, 2000), 1.0), Vec2::new(1.0, 2.0), "tall");
        assert_eq!(quad_size(Extent::new(512, 512), 0.5), Vec2::new(0.5, 0.5), "square, scaled");
        assert_eq!(quad_size(Extent::new(0, 512), 1.0), Vec2::ONE, "empty texture");
    }

    #[test]
    fn full_cycle_places_quad_in_front_of_head() {
        let mut l = layer();
        let mut store = ResourceStore::new(0);
        let mut render = RecordingStream::<Render>::default();
        let mut tracer = Tracer::none();
        let id =
            import_resource(&mut store, Extent::new(1280, 720), Format::Rgba8Srgb).unwrap();

        l.prepare_rendering(1, XrDuration::INFINITE, &mut tracer).unwrap();
        let t = render_handoff(&mut store, &mut render, id).unwrap();
        l.add_texture(t, &mut tracer).unwrap();
        l.start_rendering(&mut tracer).unwrap();
        let mut present = RecordingStream::<Present>::default();
        l.render(&mut RenderContext {
            resources: &mut store,
            stream: &mut present,
            tracer: &mut tracer,
        })
        .unwrap();

        let head = Pose {
            position: Vec3::new(0.25, 1.5, -1.0),
            orientation: Quat::from_rotation_y(0.5),
        };
        let quad = l
            .finish_rendering(head, &store, &OverlayConfig::default(), &mut tracer)
            .unwrap();
        assert_eq!(quad.pose.position, Vec3::new(0.25, 1.5, -3.0), "two meters ahead");
        assert_eq!(quad.pose.orientation, Quat::IDENTITY, "orientation reset");
        assert_eq!(quad.size, Vec2::new(1280.0 / 720.0, 1.0), "texture aspect");
        assert_eq!(quad.eye_visibility, EyeVisibility::Both, "both eyes");
        assert!(quad.blend_source_alpha, "alpha blended");
        assert_eq!(quad.sub_image.rect.extent, Extent::new(1832, 1920), "swapchain extent");
        assert_eq!(l.status(), LayerStatus::NotRendering, "idle");
        assert_eq!(l.pipeline.draws.len(), 1, "one draw");
        assert!(l.pipeline.draws[0].depth_target.is_none(), "color only");
    }

    #[test]
    fn second_bind_is_rejected() {
        let mut l = layer();
        let mut store = ResourceStore::new(0);
        let mut render = RecordingStream::<Render>::default();
        let mut tracer = Tracer::none();
        let a = import_resource(&mut store, Extent::new(64, 64), Format::Rgba8Srgb).unwrap();
        let b = import_resource(&mut store, Extent::new(64, 64), Format::Rgba8Srgb).unwrap();
        l.prepare_rendering(1, XrDuration::INFINITE, &mut tracer).unwrap();
        l.add_texture(render_handoff(&mut store, &mut render, a).unwrap(), &mut tracer)
            .unwrap();
        let err = l
            .add_texture(render_handoff(&mut store, &mut render, b).unwrap(), &mut tracer)
            .unwrap_err();
        assert!(
            matches!(
                err,
                LayerError::InvalidTransition {
                    layer: LayerKind::Overlay,
                    status: LayerStatus::Binding,
                    ..
                }
            ),
            "overlay binds once: {err}"
        );
    }

    #[test]
    fn finish_without_render_fails() {
        let mut l = layer();
        let mut store = ResourceStore::new(0);
        let mut render = RecordingStream::<Render>::default();
        let mut tracer = Tracer::none();
        let id = import_resource(&mut store, Extent::new(64, 64), Format::Rgba8Srgb).unwrap();
        l.prepare_rendering(1, XrDuration::INFINITE, &mut tracer).unwrap();
        l.add_texture(render_handoff(&mut store, &mut render, id).unwrap(), &mut tracer)
            .unwrap();
        l.start_rendering(&mut tracer).unwrap();
        let err = l
            .finish_rendering(Pose::IDENTITY, &store, &OverlayConfig::default(), &mut tracer)
            .unwrap_err();
        assert!(
            matches!(err, Error::Layer(LayerError::NotRendered(LayerKind::Overlay))),
            "not rendered: {err}"
        );
    }
}
