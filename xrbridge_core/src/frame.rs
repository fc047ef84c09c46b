// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-frame cycle.
//!
//! [`FrameOrchestrator`] drives one compositor session from a single render
//! thread:
//!
//! ```text
//!   start_frame ─► wait_frame ─► begin_frame ─► locate eyes ─► prepare layers
//!                                                                  │
//!            (caller copies into shared images and binds them)     │
//!                                                                  ▼
//!   end_frame ─► start bound layers ─► render or skip ─► submit ─► end_frame
//! ```
//!
//! Layers are submitted overlay first, then stereo. When the compositor says
//! a frame will not be displayed, bound layers are skipped: their textures go
//! straight back to the render side and no layer is submitted, but the frame
//! is still closed with its predicted display time.

use crate::api::{Format, Render};
use crate::composition::CompositionLayer;
use crate::compositor::{Compositor, FrameState};
use crate::config::SessionConfig;
use crate::device::{
    CommandStream, DeviceBootstrap, PipelineKind, PresentDevice, ResourceExporter,
    ResourceImporter, SurfaceDesc, check_device,
};
use crate::error::{CompositorError, Result};
use crate::handle::ResourceId;
use crate::layer::{Layer, LayerStatus, OverlayLayer, RenderContext, StereoLayer};
use crate::resource::ResourceStore;
use crate::swapchain::{Swapchain, SwapchainDesc};
use crate::trace::{FrameSummaryBuilder, FrameWaitEvent, SubmitEvent, Tracer};
use crate::view::{Eye, PerEye, View};

/// Running counts over a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames opened with `start_frame`.
    pub frames_started: u64,
    /// Frames the compositor displayed.
    pub frames_displayed: u64,
    /// Frames the compositor asked not to render.
    pub frames_skipped: u64,
    /// Composition layers submitted in total.
    pub layers_submitted: u64,
}

/// Owns a compositor session, the present device, the layers, and the
/// shared images.
#[derive(Debug)]
pub struct FrameOrchestrator<C: Compositor, D: PresentDevice> {
    compositor: C,
    device: D,
    config: SessionConfig,
    layers: Vec<Layer<C::Images, D::Pipeline>>,
    resources: ResourceStore,
    frame: Option<FrameState>,
    frame_index: u64,
    views: Option<PerEye<View>>,
    stats: FrameStats,
    shut_down: bool,
}

fn create_swapchain<C: Compositor>(
    compositor: &mut C,
    desc: SwapchainDesc,
) -> Result<Swapchain<C::Images>> {
    let images = compositor.create_swapchain(&desc)?;
    Ok(Swapchain::new(images, desc))
}

impl<C: Compositor, D: PresentDevice> FrameOrchestrator<C, D> {
    /// Starts a session.
    ///
    /// Checks interop support first, so a device that cannot import fails
    /// here before any swapchain exists. Then builds the overlay layer (if
    /// enabled) and the stereo layer from the recommended view
    /// configurations.
    pub fn new(
        mut compositor: C,
        mut device: D,
        bootstrap: &dyn DeviceBootstrap,
        config: SessionConfig,
    ) -> Result<Self> {
        check_device(bootstrap)?;

        let views = compositor.view_configurations()?;
        let [left, right, ..] = views.as_slice() else {
            return Err(CompositorError::new(
                "view_configurations",
                format_args!("stereo needs two views, runtime reported {}", views.len()),
            )
            .into());
        };
        let per_eye = PerEye {
            left: *left,
            right: *right,
        };

        let mut layers = Vec::with_capacity(2);
        if config.overlay.enabled {
            let desc = SwapchainDesc {
                extent: per_eye.left.recommended_extent,
                sample_count: per_eye.left.sample_count,
                format: config.formats.color,
            };
            let swapchain = create_swapchain(&mut compositor, desc)?;
            let pipeline = device.create_pipeline(PipelineKind::Overlay, desc.extent)?;
            layers.push(Layer::Overlay(OverlayLayer::new(swapchain, pipeline)));
        }

        let mut stereo_swapchain = |format: Format| {
            PerEye::try_from_fn(|eye| {
                let view = per_eye.get(eye);
                create_swapchain(
                    &mut compositor,
                    SwapchainDesc {
                        extent: view.recommended_extent,
                        sample_count: view.sample_count,
                        format,
                    },
                )
            })
        };
        let color = stereo_swapchain(config.formats.color)?;
        let depth = stereo_swapchain(config.formats.depth)?;
        let pipelines = PerEye::try_from_fn(|eye| {
            device.create_pipeline(PipelineKind::Stereo, per_eye.get(eye).recommended_extent)
        })?;
        layers.push(Layer::Stereo(StereoLayer::new(color, depth, pipelines)));

        tracing::info!(
            width = per_eye.left.recommended_extent.width,
            height = per_eye.left.recommended_extent.height,
            overlay = config.overlay.enabled,
            "session ready"
        );

        Ok(Self {
            compositor,
            device,
            config,
            layers,
            resources: ResourceStore::new(config.handoff_log_interval),
            frame: None,
            frame_index: 0,
            views: None,
            stats: FrameStats::default(),
            shut_down: false,
        })
    }

    /// Waits for the compositor, opens a frame, locates both eyes, and
    /// prepares every layer that is not already preparing.
    pub fn start_frame(&mut self, tracer: &mut Tracer<'_>) -> Result<()> {
        if self.frame.is_some() {
            return Err(CompositorError::new("start_frame", "previous frame was not ended").into());
        }
        let state = self.compositor.wait_frame()?;
        self.frame_index += 1;
        tracing::trace!(
            frame = self.frame_index,
            display_time = ?state.predicted_display_time,
            should_render = state.should_render,
            "frame released"
        );
        tracer.frame_wait(&FrameWaitEvent {
            frame_index: self.frame_index,
            predicted_display_time: state.predicted_display_time,
            predicted_period: state.predicted_period,
            should_render: state.should_render,
        });
        self.compositor.begin_frame()?;
        self.frame = Some(state);

        let time = state.predicted_display_time;
        let compositor = &mut self.compositor;
        self.views = Some(PerEye::try_from_fn(|eye| compositor.locate_eye(eye, time))?);

        let timeout = self.config.swapchain_wait_timeout();
        for layer in &mut self.layers {
            if layer.status() != LayerStatus::Preparing {
                layer.prepare_rendering(self.frame_index, timeout, tracer)?;
            }
        }
        self.stats.frames_started += 1;
        Ok(())
    }

    /// Starts bound layers, renders or skips them, and closes the frame.
    pub fn end_frame(&mut self, tracer: &mut Tracer<'_>) -> Result<()> {
        let Some(state) = self.frame.take() else {
            return Err(CompositorError::new("end_frame", "no frame was started").into());
        };
        let wait = FrameWaitEvent {
            frame_index: self.frame_index,
            predicted_display_time: state.predicted_display_time,
            predicted_period: state.predicted_period,
            should_render: state.should_render,
        };
        let mut summary = FrameSummaryBuilder::new(&wait);

        for layer in &mut self.layers {
            if layer.status() == LayerStatus::Binding {
                layer.start_rendering(tracer)?;
            }
        }

        let mut submitted = Vec::with_capacity(self.layers.len());
        if self
            .layers
            .iter()
            .any(|l| l.status() == LayerStatus::Rendering)
        {
            let mut stream = self.device.begin_commands("RenderSharedTexture")?;
            for layer in &mut self.layers {
                if layer.status() != LayerStatus::Rendering {
                    continue;
                }
                let mut ctx = RenderContext {
                    resources: &mut self.resources,
                    stream: &mut stream,
                    tracer: &mut *tracer,
                };
                if !state.should_render {
                    layer.skip(&mut ctx)?;
                    summary.layer_skipped();
                    continue;
                }
                let composed = match layer {
                    Layer::Overlay(overlay) => {
                        overlay.render(&mut ctx)?;
                        let head = self.compositor.locate_head(state.predicted_display_time)?;
                        CompositionLayer::Quad(overlay.finish_rendering(
                            head,
                            &self.resources,
                            &self.config.overlay,
                            tracer,
                        )?)
                    }
                    Layer::Stereo(stereo) => {
                        stereo.render(Eye::Left, &mut ctx)?;
                        stereo.render(Eye::Right, &mut ctx)?;
                        let views = self.views.ok_or_else(|| {
                            CompositorError::new("end_frame", "views were not located")
                        })?;
                        CompositionLayer::Projection(stereo.finish_rendering(
                            &views,
                            &self.config.depth,
                            tracer,
                        )?)
                    }
                };
                submitted.push(composed);
                summary.layer_submitted();
            }
            self.device.submit(stream)?;
        }

        self.compositor
            .end_frame(state.predicted_display_time, &submitted)?;

        #[expect(
            clippy::cast_possible_truncation,
            reason = "at most two layers are submitted"
        )]
        let layer_count = submitted.len() as u32;
        tracer.submit(&SubmitEvent {
            frame_index: self.frame_index,
            display_time: state.predicted_display_time,
            layer_count,
        });
        if state.should_render {
            self.stats.frames_displayed += 1;
        } else {
            self.stats.frames_skipped += 1;
        }
        self.stats.layers_submitted += u64::from(layer_count);
        let summary = summary.finish();
        tracing::trace!(
            frame = summary.frame_index,
            submitted = summary.layers_submitted,
            skipped = summary.layers_skipped,
            "frame ended"
        );
        tracer.frame_summary(&summary);
        Ok(())
    }

    /// Creates a shared image and registers it.
    ///
    /// The render side may take the first handoff with
    /// [`ResourceStore::take_parked`].
    pub fn import_resource<S>(
        &mut self,
        desc: &SurfaceDesc,
        exporter: &mut dyn ResourceExporter,
        importer: &mut dyn ResourceImporter,
        stream: &mut S,
    ) -> Result<ResourceId>
    where
        S: CommandStream<Render> + ?Sized,
    {
        self.resources.import(desc, exporter, importer, stream)
    }

    /// Winds the session down: waits for the present device, requests exit,
    /// and ends the session. Only the first call does anything.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        self.device.wait_idle()?;
        self.compositor.request_exit()?;
        self.compositor.end_session()?;
        tracing::info!(
            frames = self.stats.frames_started,
            displayed = self.stats.frames_displayed,
            skipped = self.stats.frames_skipped,
            "session ended"
        );
        Ok(())
    }

    /// Eye views located by the last `start_frame`.
    #[must_use]
    pub const fn views(&self) -> Option<&PerEye<View>> {
        self.views.as_ref()
    }

    /// The stereo layer.
    pub fn stereo_mut(&mut self) -> Option<&mut StereoLayer<C::Images, D::Pipeline>> {
        self.layers.iter_mut().find_map(Layer::as_stereo_mut)
    }

    /// The overlay layer, unless disabled in the config.
    pub fn overlay_mut(&mut self) -> Option<&mut OverlayLayer<C::Images, D::Pipeline>> {
        self.layers.iter_mut().find_map(Layer::as_overlay_mut)
    }

    /// Layers in submission order.
    #[must_use]
    pub fn layers(&self) -> &[Layer<C::Images, D::Pipeline>] {
        &self.layers
    }

    /// The shared images.
    #[must_use]
    pub const fn resources(&self) -> &ResourceStore {
        &self.resources
    }

    /// The shared images, for render-side handoffs.
    pub fn resources_mut(&mut self) -> &mut ResourceStore {
        &mut self.resources
    }

    /// Session counters.
    #[must_use]
    pub const fn stats(&self) -> FrameStats {
        self.stats
    }

    /// The frame counter of the current or last frame.
    #[must_use]
    pub const fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// The compositor.
    #[must_use]
    pub const fn compositor(&self) -> &C {
        &self.compositor
    }

    /// The present device.
    #[must_use]
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// The session config.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl<C: Compositor, D: PresentDevice> Drop for FrameOrchestrator<C, D> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::error!("session teardown failed: {err}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Present;
    use crate::composition::Extent;
    use crate::device::InteropCaps;
    use crate::error::{Capability, Error, ErrorClass, LayerError};
    use crate::layer::{LayerKind, LayerOp};
    use crate::time::XrDuration;
    use crate::testing::{
        FakeBootstrap, FakeExporter, FakeImporter, RecordingDevice, RecordingStream,
        ScriptedCompositor, render_handoff,
    };

    type Orchestrator = FrameOrchestrator<ScriptedCompositor, RecordingDevice>;

    const EYE: Extent = Extent::new(1832, 1920);

    fn session_with(compositor: ScriptedCompositor, config: SessionConfig) -> Orchestrator {
        FrameOrchestrator::new(
            compositor,
            RecordingDevice::default(),
            &FakeBootstrap::new(InteropCaps::ALL),
            config,
        )
        .unwrap()
    }

    fn session(config: SessionConfig) -> Orchestrator {
        session_with(ScriptedCompositor::new(EYE), config)
    }

    /// One export/import pair for every shared image of a session, as a
    /// game bridge holds them.
    struct Interop {
        exporter: FakeExporter,
        importer: FakeImporter,
    }

    impl Interop {
        fn new() -> Self {
            Self {
                exporter: FakeExporter::default(),
                importer: FakeImporter::new(InteropCaps::ALL),
            }
        }

        fn import(
            &mut self,
            o: &mut Orchestrator,
            render: &mut RecordingStream<Render>,
            format: Format,
        ) -> ResourceId {
            o.import_resource(
                &SurfaceDesc {
                    extent: Extent::new(1280, 720),
                    render_format: format,
                    present_format: format,
                },
                &mut self.exporter,
                &mut self.importer,
                render,
            )
            .unwrap()
        }
    }

    struct Bound {
        color: PerEye<ResourceId>,
        depth: PerEye<ResourceId>,
        overlay: ResourceId,
    }

    impl Bound {
        fn all(&self) -> [ResourceId; 5] {
            [
                self.color.left,
                self.color.right,
                self.depth.left,
                self.depth.right,
                self.overlay,
            ]
        }
    }

    fn import_all(o: &mut Orchestrator, render: &mut RecordingStream<Render>) -> Bound {
        let mut interop = Interop::new();
        Bound {
            color: PerEye::from_fn(|_| interop.import(o, render, Format::Rgba8Srgb)),
            depth: PerEye::from_fn(|_| interop.import(o, render, Format::D32Float)),
            overlay: interop.import(o, render, Format::Rgba8Srgb),
        }
    }

    fn bind_frame(o: &mut Orchestrator, render: &mut RecordingStream<Render>, b: &Bound) {
        let mut tracer = Tracer::none();
        for eye in Eye::BOTH {
            let t = render_handoff(o.resources_mut(), render, *b.color.get(eye)).unwrap();
            o.stereo_mut().unwrap().add_texture(eye, t, &mut tracer).unwrap();
            let t = render_handoff(o.resources_mut(), render, *b.depth.get(eye)).unwrap();
            o.stereo_mut().unwrap().add_depth_texture(eye, t, &mut tracer).unwrap();
        }
        let t = render_handoff(o.resources_mut(), render, b.overlay).unwrap();
        o.overlay_mut().unwrap().add_texture(t, &mut tracer).unwrap();
    }

    #[test]
    fn displayed_frame_submits_overlay_then_stereo() {
        let mut o = session(SessionConfig::default());
        let mut render = RecordingStream::<Render>::default();
        let b = import_all(&mut o, &mut render);
        let mut tracer = Tracer::none();

        o.start_frame(&mut tracer).unwrap();
        bind_frame(&mut o, &mut render, &b);
        o.end_frame(&mut tracer).unwrap();

        let frame = &o.compositor().submitted[0];
        assert_eq!(frame.layers.len(), 2, "both layers submitted");
        assert!(matches!(frame.layers[0], CompositionLayer::Quad(_)), "overlay first");
        assert!(
            matches!(frame.layers[1], CompositionLayer::Projection(_)),
            "stereo second"
        );
        assert_eq!(
            frame.display_time,
            o.compositor().frame_times[0],
            "closed with the predicted display time"
        );
        assert_eq!(o.device().submitted.len(), 1, "one present submission");
        assert_eq!(o.stats().frames_displayed, 1, "displayed");
        assert_eq!(o.stats().layers_submitted, 2, "two layers counted");
    }

    #[test]
    fn session_images_are_distinct_on_both_sides() {
        let mut o = session(SessionConfig::default());
        let mut render = RecordingStream::<Render>::default();
        let b = import_all(&mut o, &mut render);

        let mut present = Vec::new();
        let mut rendered = Vec::new();
        for id in b.all() {
            let res = o.resources().get(id).unwrap();
            present.push(res.side::<Present>().image().raw());
            rendered.push(res.side::<Render>().image().raw());
        }
        present.sort_unstable();
        present.dedup();
        rendered.sort_unstable();
        rendered.dedup();
        assert_eq!(present.len(), 5, "one present image per resource");
        assert_eq!(rendered.len(), 5, "one render image per resource");
    }

    #[test]
    fn counter_advances_by_one_per_handoff_across_frames() {
        let mut o = session(SessionConfig::default());
        let mut render = RecordingStream::<Render>::default();
        let b = import_all(&mut o, &mut render);
        let mut tracer = Tracer::none();

        for frame in 1..=3_u64 {
            o.start_frame(&mut tracer).unwrap();
            bind_frame(&mut o, &mut render, &b);
            o.end_frame(&mut tracer).unwrap();
            let counter = o.resources().get(b.color.left).unwrap().counter();
            assert_eq!(counter, frame * 2, "two handoffs per frame");
        }
        let present: Vec<_> = o
            .device()
            .submitted
            .iter()
            .flat_map(RecordingStream::<Present>::waits)
            .collect();
        assert_eq!(present.len(), 3 * 5, "five textures sampled per frame");
        assert!(present.iter().all(|v| v % 2 == 1), "present waits on odd render signals");
        assert!(render.waits().iter().all(|v| v % 2 == 0), "render waits on even values");
    }

    #[test]
    fn hidden_frame_skips_layers_but_still_closes() {
        let compositor = ScriptedCompositor::new(EYE).with_should_render(&[false, true]);
        let mut o = session_with(compositor, SessionConfig::default());
        let mut render = RecordingStream::<Render>::default();
        let b = import_all(&mut o, &mut render);
        let mut tracer = Tracer::none();

        o.start_frame(&mut tracer).unwrap();
        bind_frame(&mut o, &mut render, &b);
        o.end_frame(&mut tracer).unwrap();

        assert!(o.compositor().submitted[0].layers.is_empty(), "nothing displayed");
        assert_eq!(o.stats().frames_skipped, 1, "counted as skipped");
        for layer in o.layers() {
            assert_eq!(layer.status(), LayerStatus::NotRendering, "{:?} idle", layer.kind());
        }
        // The render side got every texture back and the next frame works.
        o.start_frame(&mut tracer).unwrap();
        bind_frame(&mut o, &mut render, &b);
        o.end_frame(&mut tracer).unwrap();
        assert_eq!(o.compositor().submitted[1].layers.len(), 2, "second frame displayed");
        assert_eq!(o.resources().get(b.overlay).unwrap().counter(), 4, "two full handoffs");
    }

    #[test]
    fn unbound_layers_stay_preparing_and_frame_closes_empty() {
        let mut o = session(SessionConfig::default());
        let mut tracer = Tracer::none();
        o.start_frame(&mut tracer).unwrap();
        o.end_frame(&mut tracer).unwrap();
        assert!(o.compositor().submitted[0].layers.is_empty(), "empty submission");
        assert!(o.device().submitted.is_empty(), "no present work");
        for layer in o.layers() {
            assert_eq!(layer.status(), LayerStatus::Preparing, "still holding images");
        }
        // Held images are reused rather than acquired twice.
        o.start_frame(&mut tracer).unwrap();
        o.end_frame(&mut tracer).unwrap();
    }

    #[test]
    fn double_prepare_is_a_precondition_failure() {
        let mut o = session(SessionConfig::default());
        let mut tracer = Tracer::none();
        o.start_frame(&mut tracer).unwrap();
        let stereo = o.stereo_mut().unwrap();
        let err = stereo
            .prepare_rendering(1, XrDuration::INFINITE, &mut tracer)
            .unwrap_err();
        assert!(
            matches!(
                err,
                Error::Layer(LayerError::InvalidTransition {
                    layer: LayerKind::Stereo,
                    op: LayerOp::PrepareRendering,
                    status: LayerStatus::Preparing,
                })
            ),
            "second prepare: {err}"
        );
        assert_eq!(err.class(), ErrorClass::Precondition, "precondition class");
    }

    #[test]
    fn device_without_import_fails_before_any_frame() {
        for caps in [
            InteropCaps {
                external_memory: false,
                ..InteropCaps::ALL
            },
            InteropCaps {
                external_semaphore: false,
                ..InteropCaps::ALL
            },
        ] {
            let result = FrameOrchestrator::new(
                ScriptedCompositor::new(EYE),
                RecordingDevice::default(),
                &FakeBootstrap::new(caps),
                SessionConfig::default(),
            );
            let Err(err) = result else {
                panic!("session started without {caps:?}");
            };
            assert_eq!(err.class(), ErrorClass::Capability, "capability class");
            assert!(
                matches!(
                    err,
                    Error::Capability(ref e) if matches!(
                        e.missing,
                        Capability::ExternalMemory | Capability::ExternalSemaphore
                    )
                ),
                "names the gap: {err}"
            );
        }
    }

    #[test]
    fn disabled_overlay_is_not_created() {
        let mut config = SessionConfig::default();
        config.overlay.enabled = false;
        let mut o = session(config);
        assert!(o.overlay_mut().is_none(), "no overlay");
        assert_eq!(o.layers().len(), 1, "stereo only");
        assert_eq!(o.compositor().swapchains_created, 4, "color and depth per eye");
    }

    #[test]
    fn shutdown_runs_once() {
        let mut o = session(SessionConfig::default());
        o.shutdown().unwrap();
        o.shutdown().unwrap();
        let calls = &o.compositor().calls;
        assert_eq!(
            calls.iter().filter(|c| **c == "request_exit").count(),
            1,
            "exit requested once"
        );
        assert_eq!(
            calls.iter().filter(|c| **c == "end_session").count(),
            1,
            "session ended once"
        );
        assert_eq!(o.device().idle_waits, 1, "device drained");
    }

    #[test]
    fn end_frame_without_start_fails() {
        let mut o = session(SessionConfig::default());
        let err = o.end_frame(&mut Tracer::none()).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Compositor, "call order");
    }
}
