// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::api::Present;
use crate::composition::{DepthInfo, ProjectionLayer, ProjectionView, Rect, SubImage};
use crate::config::DepthConfig;
use crate::device::{DrawJob, DrawTarget, PresentPipeline};
use crate::error::{LayerError, Result};
use crate::resource::Handoff;
use crate::swapchain::{Swapchain, SwapchainImages};
use crate::time::XrDuration;
use crate::trace::Tracer;
use crate::view::{Eye, PerEye, StereoPair, View};

use super::{LayerKind, LayerOp, LayerStatus, RenderContext, StatusMachine};

/// Tokens one eye samples this frame.
#[derive(Debug)]
struct EyeInputs {
    color: Handoff<Present>,
    depth: Option<Handoff<Present>>,
}

/// The stereo projection layer.
///
/// Owns a color and a depth swapchain plus a present pipeline per eye.
/// Color must be bound for both eyes; depth for both eyes or neither.
#[derive(Debug)]
pub struct StereoLayer<S, P> {
    machine: StatusMachine,
    color: PerEye<Swapchain<S>>,
    depth: PerEye<Swapchain<S>>,
    pipelines: PerEye<P>,
    color_slots: PerEye<Option<Handoff<Present>>>,
    depth_slots: PerEye<Option<Handoff<Present>>>,
    pending: PerEye<Option<EyeInputs>>,
    depth_bound: bool,
}

fn resolve(
    slot: &'static str,
    slots: &mut PerEye<Option<Handoff<Present>>>,
) -> Result<StereoPair<Handoff<Present>>, LayerError> {
    StereoPair::from_slots(&mut slots.left, &mut slots.right).map_err(|bound| {
        tracing::error!(slot, %bound, "stereo texture bound for one eye only");
        LayerError::HalfBound { slot, bound }
    })
}

impl<S: SwapchainImages, P: PresentPipeline> StereoLayer<S, P> {
    /// Creates a layer from per-eye swapchains and pipelines.
    pub fn new(
        color: PerEye<Swapchain<S>>,
        depth: PerEye<Swapchain<S>>,
        pipelines: PerEye<P>,
    ) -> Self {
        Self {
            machine: StatusMachine::new(LayerKind::Stereo),
            color,
            depth,
            pipelines,
            color_slots: PerEye::default(),
            depth_slots: PerEye::default(),
            pending: PerEye::default(),
            depth_bound: false,
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> LayerStatus {
        self.machine.status()
    }

    /// Color swapchain for `eye`.
    #[must_use]
    pub const fn color_swapchain(&self, eye: Eye) -> &Swapchain<S> {
        self.color.get(eye)
    }

    /// Depth swapchain for `eye`.
    #[must_use]
    pub const fn depth_swapchain(&self, eye: Eye) -> &Swapchain<S> {
        self.depth.get(eye)
    }

    fn swapchains_mut(&mut self) -> impl Iterator<Item = &mut Swapchain<S>> {
        [
            &mut self.color.left,
            &mut self.color.right,
            &mut self.depth.left,
            &mut self.depth.right,
        ]
        .into_iter()
    }

    /// Begins a frame: acquires all four swapchain images.
    pub fn prepare_rendering(
        &mut self,
        frame_index: u64,
        timeout: XrDuration,
        tracer: &mut Tracer<'_>,
    ) -> Result<()> {
        self.machine.check(LayerOp::PrepareRendering)?;
        self.machine.set_frame(frame_index);
        for swapchain in self.swapchains_mut() {
            swapchain.prepare_rendering(timeout, tracer)?;
        }
        self.machine.advance(LayerOp::PrepareRendering, tracer)?;
        Ok(())
    }

    /// Binds the color texture `eye` samples this frame.
    pub fn add_texture(
        &mut self,
        eye: Eye,
        texture: Handoff<Present>,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), LayerError> {
        self.bind("color", eye, texture, tracer)
    }

    /// Binds the depth texture `eye` samples this frame.
    pub fn add_depth_texture(
        &mut self,
        eye: Eye,
        texture: Handoff<Present>,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), LayerError> {
        self.bind("depth", eye, texture, tracer)
    }

    fn bind(
        &mut self,
        slot: &'static str,
        eye: Eye,
        texture: Handoff<Present>,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), LayerError> {
        self.machine.check(LayerOp::AddTexture)?;
        let slots = if slot == "depth" {
            &mut self.depth_slots
        } else {
            &mut self.color_slots
        };
        let target = slots.get_mut(eye);
        if target.is_some() {
            tracing::error!(slot, %eye, "stereo slot bound twice in one frame");
            return Err(LayerError::SlotOccupied { slot, eye });
        }
        *target = Some(texture);
        self.machine.advance(LayerOp::AddTexture, tracer)
    }

    /// Freezes the bindings and makes the swapchain images render targets.
    ///
    /// Fails if color is not bound for both eyes, or if depth is bound for
    /// exactly one. Bindings are left in place on failure.
    pub fn start_rendering(&mut self, tracer: &mut Tracer<'_>) -> Result<()> {
        self.machine.check(LayerOp::StartRendering)?;
        let color = match resolve("color", &mut self.color_slots)? {
            StereoPair::Full(color) => color,
            StereoPair::Empty => {
                tracing::error!("stereo layer started with depth but no color");
                return Err(LayerError::MissingTexture(LayerKind::Stereo).into());
            }
        };
        let depth = match resolve("depth", &mut self.depth_slots) {
            Ok(depth) => depth,
            Err(err) => {
                self.color_slots = color.map(Some);
                return Err(err.into());
            }
        };
        self.depth_bound = depth.is_full();
        let depth = depth.into_options();
        self.pending = PerEye {
            left: Some(EyeInputs {
                color: color.left,
                depth: depth.left,
            }),
            right: Some(EyeInputs {
                color: color.right,
                depth: depth.right,
            }),
        };
        for swapchain in self.swapchains_mut() {
            swapchain.start_rendering()?;
        }
        self.machine.advance(LayerOp::StartRendering, tracer)?;
        Ok(())
    }

    /// Samples the bound textures of `eye` into its swapchain images.
    pub fn render(&mut self, eye: Eye, ctx: &mut RenderContext<'_, '_>) -> Result<()> {
        self.machine.check(LayerOp::Render)?;
        let inputs = self
            .pending
            .get_mut(eye)
            .take()
            .ok_or(LayerError::EyeAlreadyRendered(eye))?;

        let (color_access, color_source) = ctx.sample(inputs.color)?;
        let depth = inputs.depth.map(|token| ctx.sample(token)).transpose()?;

        let color_swapchain = self.color.get(eye);
        let depth_swapchain = self.depth.get(eye);
        let job = DrawJob {
            color: Some(color_source),
            depth: depth.as_ref().map(|(_, source)| *source),
            target: DrawTarget {
                image: color_swapchain.texture()?,
                format: color_swapchain.format(),
            },
            depth_target: Some(DrawTarget {
                image: depth_swapchain.texture()?,
                format: depth_swapchain.format(),
            }),
            extent: color_swapchain.extent(),
        };
        self.pipelines.get_mut(eye).draw(&mut *ctx.stream, &job)?;

        if let Some((access, _)) = depth {
            ctx.release(access)?;
        }
        ctx.release(color_access)?;
        Ok(())
    }

    /// Releases the swapchain images and describes the frame for the
    /// compositor.
    ///
    /// Both eyes must have been rendered. Depth info is attached when depth
    /// was bound and `depth.submit` is set.
    pub fn finish_rendering(
        &mut self,
        views: &PerEye<View>,
        depth: &DepthConfig,
        tracer: &mut Tracer<'_>,
    ) -> Result<ProjectionLayer> {
        self.machine.check(LayerOp::FinishRendering)?;
        for eye in Eye::BOTH {
            if self.pending.get(eye).is_some() {
                tracing::error!(%eye, "stereo layer finished before rendering every eye");
                return Err(LayerError::EyeNotRendered(eye).into());
            }
        }

        let with_depth = self.depth_bound && depth.submit;
        let layer = ProjectionLayer {
            views: PerEye::from_fn(|eye| {
                let view = views.get(eye);
                let color = self.color.get(eye);
                let depth_swapchain = self.depth.get(eye);
                ProjectionView {
                    pose: view.pose,
                    fov: view.fov,
                    sub_image: SubImage {
                        swapchain: color.handle(),
                        rect: Rect::full(color.extent()),
                        array_index: 0,
                    },
                    depth: with_depth.then(|| DepthInfo {
                        sub_image: SubImage {
                            swapchain: depth_swapchain.handle(),
                            rect: Rect::full(depth_swapchain.extent()),
                            array_index: 0,
                        },
                        min_depth: depth.min_depth,
                        max_depth: depth.max_depth,
                        near_z: depth.near_z,
                        far_z: depth.far_z,
                    }),
                }
            }),
        };

        for swapchain in self.swapchains_mut() {
            swapchain.finish_rendering(tracer)?;
        }
        self.depth_bound = false;
        self.machine.advance(LayerOp::FinishRendering, tracer)?;
        Ok(layer)
    }

    /// Ends a frame without drawing, handing every bound texture straight
    /// back to the render side.
    pub fn skip(&mut self, ctx: &mut RenderContext<'_, '_>) -> Result<()> {
        self.machine.check(LayerOp::FinishRendering)?;
        for eye in Eye::BOTH {
            if let Some(inputs) = self.pending.get_mut(eye).take() {
                ctx.pass_through(inputs.color)?;
                if let Some(depth) = inputs.depth {
                    ctx.pass_through(depth)?;
                }
            }
        }
        for swapchain in self.swapchains_mut() {
            swapchain.finish_rendering(ctx.tracer)?;
        }
        self.depth_bound = false;
        self.machine.advance(LayerOp::FinishRendering, ctx.tracer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Format, Render, ResourceState};
    use crate::composition::Extent;
    use crate::error::Error;
    use crate::handle::ResourceId;
    use crate::resource::ResourceStore;
    use crate::swapchain::SwapchainDesc;
    use crate::testing::{
        RecordingPipeline, RecordingStream, RingImages, import_resource, render_handoff,
    };

    const EXTENT: Extent = Extent::new(1832, 1920);

    fn layer() -> StereoLayer<RingImages, RecordingPipeline> {
        let desc = |format| SwapchainDesc {
            extent: EXTENT,
            sample_count: 1,
            format,
        };
        let mut handle = 0;
        let mut next = |format| {
            handle += 1;
            Swapchain::new(RingImages::new(handle, 3), desc(format))
        };
        let color = PerEye {
            left: next(Format::Rgba8Srgb),
            right: next(Format::Rgba8Srgb),
        };
        let depth = PerEye {
            left: next(Format::D32Float),
            right: next(Format::D32Float),
        };
        StereoLayer::new(color, depth, PerEye::from_fn(|_| RecordingPipeline::default()))
    }

    struct Fixture {
        store: ResourceStore,
        color: PerEye<ResourceId>,
        depth: PerEye<ResourceId>,
        render: RecordingStream<Render>,
    }

    fn fixture() -> Fixture {
        let mut store = ResourceStore::new(0);
        let color =
            PerEye::from_fn(|_| import_resource(&mut store, EXTENT, Format::Rgba8Srgb).unwrap());
        let depth =
            PerEye::from_fn(|_| import_resource(&mut store, EXTENT, Format::D32Float).unwrap());
        Fixture {
            store,
            color,
            depth,
            render: RecordingStream::default(),
        }
    }

    fn bind_all(l: &mut StereoLayer<RingImages, RecordingPipeline>, f: &mut Fixture) {
        let mut tracer = Tracer::none();
        for eye in Eye::BOTH {
            let t = render_handoff(&mut f.store, &mut f.render, *f.color.get(eye)).unwrap();
            l.add_texture(eye, t, &mut tracer).unwrap();
            let t = render_handoff(&mut f.store, &mut f.render, *f.depth.get(eye)).unwrap();
            l.add_depth_texture(eye, t, &mut tracer).unwrap();
        }
    }

    #[test]
    fn full_cycle_with_color_and_depth() {
        let mut l = layer();
        let mut f = fixture();
        let mut tracer = Tracer::none();
        let mut statuses = vec![l.status()];

        l.prepare_rendering(1, XrDuration::INFINITE, &mut tracer).unwrap();
        statuses.push(l.status());
        bind_all(&mut l, &mut f);
        statuses.push(l.status());
        l.start_rendering(&mut tracer).unwrap();
        statuses.push(l.status());

        let mut present = RecordingStream::<Present>::default();
        {
            let mut ctx = RenderContext {
                resources: &mut f.store,
                stream: &mut present,
                tracer: &mut tracer,
            };
            l.render(Eye::Left, &mut ctx).unwrap();
            l.render(Eye::Right, &mut ctx).unwrap();
        }
        let views = PerEye::from_fn(|_| View::default());
        let projection = l
            .finish_rendering(&views, &DepthConfig::default(), &mut tracer)
            .unwrap();
        statuses.push(l.status());

        assert_eq!(
            statuses,
            [
                LayerStatus::NotRendering,
                LayerStatus::Preparing,
                LayerStatus::Binding,
                LayerStatus::Rendering,
                LayerStatus::NotRendering,
            ],
            "status sequence"
        );
        for eye in Eye::BOTH {
            let view = projection.views.get(eye);
            assert_eq!(view.sub_image.rect.extent, EXTENT, "{eye} color extent");
            assert!(!view.sub_image.rect.extent.is_empty(), "{eye} non-empty");
            let depth = view.depth.expect("depth info attached");
            assert_eq!(depth.sub_image.rect.extent, EXTENT, "{eye} depth extent");
            assert_eq!(depth.far_z, 1000.0, "{eye} far plane");
        }
        assert_ne!(
            projection.views.left.sub_image.swapchain, projection.views.right.sub_image.swapchain,
            "each eye has its own swapchain"
        );

        // Every sampled image went back to the render side at counter 2.
        for id in [f.color.left, f.color.right, f.depth.left, f.depth.right] {
            let res = f.store.get(id).unwrap();
            assert_eq!(res.counter(), 2, "{id} handed back");
            assert_eq!(
                res.side::<Present>().state(),
                ResourceState::CopyDest,
                "{id} left ready for the next copy"
            );
            assert_eq!(f.store.take_parked(id).unwrap().value(), 2, "{id} parked");
        }
        assert_eq!(present.waits(), vec![1; 4], "present waits on render signal");
        assert_eq!(present.signals(), vec![2; 4], "present signals +1");
    }

    #[test]
    fn one_eye_color_fails_to_start() {
        let mut l = layer();
        let mut f = fixture();
        let mut tracer = Tracer::none();
        l.prepare_rendering(1, XrDuration::INFINITE, &mut tracer).unwrap();
        let t = render_handoff(&mut f.store, &mut f.render, f.color.left).unwrap();
        l.add_texture(Eye::Left, t, &mut tracer).unwrap();
        let err = l.start_rendering(&mut tracer).unwrap_err();
        assert!(
            matches!(
                err,
                Error::Layer(LayerError::HalfBound {
                    slot: "color",
                    bound: Eye::Left
                })
            ),
            "half bound: {err}"
        );
        assert_eq!(l.status(), LayerStatus::Binding, "still binding");

        // Binding the other eye recovers.
        let t = render_handoff(&mut f.store, &mut f.render, f.color.right).unwrap();
        l.add_texture(Eye::Right, t, &mut tracer).unwrap();
        l.start_rendering(&mut tracer).unwrap();
        assert_eq!(l.status(), LayerStatus::Rendering, "rendering after fix");
    }

    #[test]
    fn half_bound_depth_keeps_color_bindings() {
        let mut l = layer();
        let mut f = fixture();
        let mut tracer = Tracer::none();
        l.prepare_rendering(1, XrDuration::INFINITE, &mut tracer).unwrap();
        for eye in Eye::BOTH {
            let t = render_handoff(&mut f.store, &mut f.render, *f.color.get(eye)).unwrap();
            l.add_texture(eye, t, &mut tracer).unwrap();
        }
        let t = render_handoff(&mut f.store, &mut f.render, f.depth.right).unwrap();
        l.add_depth_texture(Eye::Right, t, &mut tracer).unwrap();
        let err = l.start_rendering(&mut tracer).unwrap_err();
        assert!(
            matches!(err, Error::Layer(LayerError::HalfBound { slot: "depth", .. })),
            "half bound depth: {err}"
        );
        let t = render_handoff(&mut f.store, &mut f.render, f.depth.left).unwrap();
        l.add_depth_texture(Eye::Left, t, &mut tracer).unwrap();
        l.start_rendering(&mut tracer).unwrap();
    }

    #[test]
    fn add_texture_rejected_outside_binding_window() {
        let mut l = layer();
        let mut f = fixture();
        let mut tracer = Tracer::none();
        let t = render_handoff(&mut f.store, &mut f.render, f.color.left).unwrap();
        let err = l.add_texture(Eye::Left, t, &mut tracer).unwrap_err();
        assert!(
            matches!(
                err,
                LayerError::InvalidTransition {
                    status: LayerStatus::NotRendering,
                    ..
                }
            ),
            "bind before prepare: {err}"
        );
    }

    #[test]
    fn same_slot_twice_is_rejected() {
        let mut l = layer();
        let mut f = fixture();
        let mut tracer = Tracer::none();
        l.prepare_rendering(1, XrDuration::INFINITE, &mut tracer).unwrap();
        let t = render_handoff(&mut f.store, &mut f.render, f.color.left).unwrap();
        l.add_texture(Eye::Left, t, &mut tracer).unwrap();
        let t = render_handoff(&mut f.store, &mut f.render, f.color.right).unwrap();
        let err = l.add_texture(Eye::Left, t, &mut tracer).unwrap_err();
        assert!(
            matches!(err, LayerError::SlotOccupied { slot: "color", eye: Eye::Left }),
            "double bind: {err}"
        );
    }

    #[test]
    fn finish_before_rendering_both_eyes_fails() {
        let mut l = layer();
        let mut f = fixture();
        let mut tracer = Tracer::none();
        l.prepare_rendering(1, XrDuration::INFINITE, &mut tracer).unwrap();
        bind_all(&mut l, &mut f);
        l.start_rendering(&mut tracer).unwrap();
        let mut present = RecordingStream::<Present>::default();
        let mut ctx = RenderContext {
            resources: &mut f.store,
            stream: &mut present,
            tracer: &mut tracer,
        };
        l.render(Eye::Left, &mut ctx).unwrap();
        let err = l.render(Eye::Left, &mut ctx).unwrap_err();
        assert!(
            matches!(err, Error::Layer(LayerError::EyeAlreadyRendered(Eye::Left))),
            "left twice: {err}"
        );
        let views = PerEye::from_fn(|_| View::default());
        let err = l
            .finish_rendering(&views, &DepthConfig::default(), &mut Tracer::none())
            .unwrap_err();
        assert!(
            matches!(err, Error::Layer(LayerError::EyeNotRendered(Eye::Right))),
            "right missing: {err}"
        );
    }

    #[test]
    fn skip_hands_tokens_back_without_drawing() {
        let mut l = layer();
        let mut f = fixture();
        let mut tracer = Tracer::none();
        l.prepare_rendering(1, XrDuration::INFINITE, &mut tracer).unwrap();
        bind_all(&mut l, &mut f);
        l.start_rendering(&mut tracer).unwrap();
        let mut present = RecordingStream::<Present>::default();
        let mut ctx = RenderContext {
            resources: &mut f.store,
            stream: &mut present,
            tracer: &mut tracer,
        };
        l.skip(&mut ctx).unwrap();
        assert_eq!(l.status(), LayerStatus::NotRendering, "idle after skip");
        assert!(
            l.pipelines.left.draws.is_empty() && l.pipelines.right.draws.is_empty(),
            "nothing drawn"
        );
        for id in [f.color.left, f.depth.right] {
            assert_eq!(f.store.get(id).unwrap().counter(), 2, "{id} passed through");
            assert!(f.store.take_parked(id).is_ok(), "{id} parked");
        }
        for eye in Eye::BOTH {
            assert_eq!(
                l.color_swapchain(eye).releases(),
                l.color_swapchain(eye).acquires(),
                "{eye} swapchain balanced"
            );
        }
    }

    #[test]
    fn depth_info_omitted_without_depth_binding() {
        let mut l = layer();
        let mut f = fixture();
        let mut tracer = Tracer::none();
        l.prepare_rendering(1, XrDuration::INFINITE, &mut tracer).unwrap();
        for eye in Eye::BOTH {
            let t = render_handoff(&mut f.store, &mut f.render, *f.color.get(eye)).unwrap();
            l.add_texture(eye, t, &mut tracer).unwrap();
        }
        l.start_rendering(&mut tracer).unwrap();
        let mut present = RecordingStream::<Present>::default();
        let mut ctx = RenderContext {
            resources: &mut f.store,
            stream: &mut present,
            tracer: &mut tracer,
        };
        for eye in Eye::BOTH {
            l.render(eye, &mut ctx).unwrap();
        }
        let job = l.pipelines.left.draws[0];
        assert!(job.depth.is_none(), "no depth sampled");
        assert!(job.depth_target.is_some(), "depth target still written");
        let views = PerEye::from_fn(|_| View::default());
        let projection = l
            .finish_rendering(&views, &DepthConfig::default(), &mut Tracer::none())
            .unwrap();
        assert!(projection.views.left.depth.is_none(), "no depth info");
    }
}
