// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The OpenXR frame loop.

use core::fmt;
use std::thread;
use std::time::{Duration, Instant};

use openxr as xr;
use xrbridge_backend_d3d12::format::swapchain_format;
use xrbridge_core::api::FormatKind;
use xrbridge_core::composition::{CompositionLayer, Extent, ProjectionLayer, QuadLayer};
use xrbridge_core::compositor::{Compositor, FrameState, ViewConfig};
use xrbridge_core::error::CompositorError;
use xrbridge_core::swapchain::SwapchainDesc;
use xrbridge_core::time::XrTime;
use xrbridge_core::view::{Eye, PerEye, Pose, View, ViewProvider};

use crate::convert::{
    duration_from_xr, eye_visibility_to_xr, fov_to_xr, pose_from_xr, pose_to_xr,
    sub_image_to_xr, time_from_xr, time_to_xr, view_from_xr,
};
use crate::swapchain::XrSwapchainImages;
use crate::{VIEW_TYPE, failed};

/// How often an idle session polls for state changes.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// How long `end_session` waits for the runtime to stop the session after
/// an exit request.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// A D3D12 OpenXR session as seen by the frame orchestrator.
///
/// Session state events are pumped at the start of every
/// [`wait_frame`](Compositor::wait_frame): the session is begun when the
/// runtime reports `READY` and ended on `STOPPING`. While the session is not
/// running, `wait_frame` blocks and keeps polling.
pub struct OpenXrCompositor {
    instance: xr::Instance,
    system: xr::SystemId,
    session: xr::Session<xr::D3D12>,
    frame_waiter: xr::FrameWaiter,
    frame_stream: xr::FrameStream<xr::D3D12>,
    stage: xr::Space,
    view: xr::Space,
    blend_mode: xr::EnvironmentBlendMode,
    events: xr::EventDataBuffer,
    running: bool,
    exiting: bool,
    located: Option<(XrTime, PerEye<View>)>,
    depth_noted: bool,
}

impl fmt::Debug for OpenXrCompositor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenXrCompositor")
            .field("system", &self.system)
            .field("blend_mode", &self.blend_mode)
            .field("running", &self.running)
            .field("exiting", &self.exiting)
            .finish_non_exhaustive()
    }
}

/// Native layers in submission order. Projection layers keep their views
/// here; the layer structs that point at them are built afterwards.
enum Prepared<'a> {
    Projection([xr::CompositionLayerProjectionView<'a, xr::D3D12>; 2]),
    Quad(xr::CompositionLayerQuad<'a, xr::D3D12>),
}

fn projection_views(
    layer: &ProjectionLayer,
) -> [xr::CompositionLayerProjectionView<'static, xr::D3D12>; 2] {
    Eye::BOTH.map(|eye| {
        let view = layer.views.get(eye);
        // SAFETY: the sub-image names a swapchain created by this session;
        // the core hands back only handles it got from `create_swapchain`.
        let sub_image =
            unsafe { xr::SwapchainSubImage::from_raw(sub_image_to_xr(&view.sub_image)) };
        xr::CompositionLayerProjectionView::new()
            .pose(pose_to_xr(view.pose))
            .fov(fov_to_xr(view.fov))
            .sub_image(sub_image)
    })
}

fn quad_layer<'a>(
    stage: &'a xr::Space,
    layer: &QuadLayer,
) -> xr::CompositionLayerQuad<'a, xr::D3D12> {
    // SAFETY: as for projection views.
    let sub_image = unsafe { xr::SwapchainSubImage::from_raw(sub_image_to_xr(&layer.sub_image)) };
    let flags = if layer.blend_source_alpha {
        xr::CompositionLayerFlags::BLEND_TEXTURE_SOURCE_ALPHA
    } else {
        xr::CompositionLayerFlags::EMPTY
    };
    xr::CompositionLayerQuad::new()
        .layer_flags(flags)
        .space(stage)
        .eye_visibility(eye_visibility_to_xr(layer.eye_visibility))
        .sub_image(sub_image)
        .pose(pose_to_xr(layer.pose))
        .size(xr::Extent2Df {
            width: layer.size.x,
            height: layer.size.y,
        })
}

impl OpenXrCompositor {
    pub(crate) fn new(
        instance: xr::Instance,
        system: xr::SystemId,
        session: xr::Session<xr::D3D12>,
        frame_waiter: xr::FrameWaiter,
        frame_stream: xr::FrameStream<xr::D3D12>,
        stage: xr::Space,
        view: xr::Space,
        blend_mode: xr::EnvironmentBlendMode,
    ) -> Self {
        Self {
            instance,
            system,
            session,
            frame_waiter,
            frame_stream,
            stage,
            view,
            blend_mode,
            events: xr::EventDataBuffer::new(),
            running: false,
            exiting: false,
            located: None,
            depth_noted: false,
        }
    }

    /// Whether the runtime has the session running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the runtime has asked the application to exit.
    #[must_use]
    pub const fn is_exiting(&self) -> bool {
        self.exiting
    }

    /// Handles every queued runtime event.
    pub fn pump_events(&mut self) -> Result<(), CompositorError> {
        while let Some(event) = self
            .instance
            .poll_event(&mut self.events)
            .map_err(failed("xrPollEvent"))?
        {
            let state = match event {
                xr::Event::SessionStateChanged(changed) => changed.state(),
                xr::Event::InstanceLossPending(_) => {
                    tracing::warn!("OpenXR instance loss pending");
                    self.exiting = true;
                    continue;
                }
                xr::Event::EventsLost(lost) => {
                    tracing::warn!(count = lost.lost_event_count(), "OpenXR events lost");
                    continue;
                }
                _ => continue,
            };
            tracing::debug!(?state, "session state changed");
            match state {
                xr::SessionState::READY => {
                    self.session
                        .begin(VIEW_TYPE)
                        .map_err(failed("xrBeginSession"))?;
                    self.running = true;
                }
                xr::SessionState::STOPPING => {
                    self.session.end().map_err(failed("xrEndSession"))?;
                    self.running = false;
                }
                xr::SessionState::EXITING | xr::SessionState::LOSS_PENDING => {
                    self.exiting = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn views_at(&mut self, display_time: XrTime) -> Result<PerEye<View>, CompositorError> {
        if let Some((time, views)) = self.located
            && time == display_time
        {
            return Ok(views);
        }
        let (_, located) = self
            .session
            .locate_views(VIEW_TYPE, time_to_xr(display_time), &self.stage)
            .map_err(failed("xrLocateViews"))?;
        let [left, right, ..] = located.as_slice() else {
            return Err(CompositorError::new(
                "xrLocateViews",
                format_args!("expected two views, got {}", located.len()),
            ));
        };
        let views = PerEye {
            left: view_from_xr(left),
            right: view_from_xr(right),
        };
        self.located = Some((display_time, views));
        Ok(views)
    }

    fn note_depth(&mut self, layers: &[CompositionLayer]) {
        if self.depth_noted {
            return;
        }
        let has_depth = layers.iter().any(|layer| match layer {
            CompositionLayer::Projection(p) => p.views.left.depth.is_some(),
            CompositionLayer::Quad(_) => false,
        });
        if has_depth {
            tracing::debug!("depth info is not forwarded to the runtime");
            self.depth_noted = true;
        }
    }
}

impl ViewProvider for OpenXrCompositor {
    fn locate_eye(&mut self, eye: Eye, display_time: XrTime) -> Result<View, CompositorError> {
        Ok(*self.views_at(display_time)?.get(eye))
    }

    fn locate_head(&mut self, display_time: XrTime) -> Result<Pose, CompositorError> {
        let location = self
            .view
            .locate(&self.stage, time_to_xr(display_time))
            .map_err(failed("xrLocateSpace"))?;
        if !location
            .location_flags
            .contains(xr::SpaceLocationFlags::POSITION_VALID)
        {
            tracing::trace!("head position not valid, using last reported pose");
        }
        Ok(pose_from_xr(location.pose))
    }
}

impl Compositor for OpenXrCompositor {
    type Images = XrSwapchainImages;

    fn view_configurations(&mut self) -> Result<Vec<ViewConfig>, CompositorError> {
        let views = self
            .instance
            .enumerate_view_configuration_views(self.system, VIEW_TYPE)
            .map_err(failed("xrEnumerateViewConfigurationViews"))?;
        Ok(views
            .iter()
            .map(|view| ViewConfig {
                recommended_extent: Extent::new(
                    view.recommended_image_rect_width,
                    view.recommended_image_rect_height,
                ),
                sample_count: view.recommended_swapchain_sample_count,
            })
            .collect())
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<Self::Images, CompositorError> {
        let format = swapchain_format(desc.format);
        let supported = self
            .session
            .enumerate_swapchain_formats()
            .map_err(failed("xrEnumerateSwapchainFormats"))?;
        if !supported.contains(&format) {
            return Err(CompositorError::new(
                "xrCreateSwapchain",
                format_args!("runtime does not offer {:?} (DXGI {format})", desc.format),
            ));
        }
        let usage_flags = match desc.format.kind() {
            FormatKind::Depth => xr::SwapchainUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            FormatKind::Color => xr::SwapchainUsageFlags::COLOR_ATTACHMENT,
        } | xr::SwapchainUsageFlags::SAMPLED;
        let swapchain = self
            .session
            .create_swapchain(&xr::SwapchainCreateInfo {
                create_flags: xr::SwapchainCreateFlags::EMPTY,
                usage_flags,
                format,
                sample_count: desc.sample_count,
                width: desc.extent.width,
                height: desc.extent.height,
                face_count: 1,
                array_size: 1,
                mip_count: 1,
            })
            .map_err(failed("xrCreateSwapchain"))?;
        let images = XrSwapchainImages::new(swapchain, desc.format)?;
        tracing::debug!(
            format = ?desc.format,
            width = desc.extent.width,
            height = desc.extent.height,
            images = images.len(),
            "created swapchain"
        );
        Ok(images)
    }

    fn wait_frame(&mut self) -> Result<FrameState, CompositorError> {
        self.pump_events()?;
        while !self.running {
            if self.exiting {
                return Err(CompositorError::new("xrWaitFrame", "session is exiting"));
            }
            thread::sleep(IDLE_POLL);
            self.pump_events()?;
        }
        let state = self.frame_waiter.wait().map_err(failed("xrWaitFrame"))?;
        Ok(FrameState {
            predicted_display_time: time_from_xr(state.predicted_display_time),
            predicted_period: duration_from_xr(state.predicted_display_period),
            should_render: state.should_render,
        })
    }

    fn begin_frame(&mut self) -> Result<(), CompositorError> {
        self.frame_stream.begin().map_err(failed("xrBeginFrame"))
    }

    fn end_frame(
        &mut self,
        display_time: XrTime,
        layers: &[CompositionLayer],
    ) -> Result<(), CompositorError> {
        self.note_depth(layers);
        let stage = &self.stage;
        let prepared: Vec<Prepared<'_>> = layers
            .iter()
            .map(|layer| match layer {
                CompositionLayer::Projection(p) => Prepared::Projection(projection_views(p)),
                CompositionLayer::Quad(q) => Prepared::Quad(quad_layer(stage, q)),
            })
            .collect();
        let projections: Vec<xr::CompositionLayerProjection<'_, xr::D3D12>> = prepared
            .iter()
            .filter_map(|p| match p {
                Prepared::Projection(views) => {
                    Some(xr::CompositionLayerProjection::new().space(stage).views(views))
                }
                Prepared::Quad(_) => None,
            })
            .collect();
        let mut next_projection = projections.iter();
        let native: Vec<&xr::CompositionLayerBase<'_, xr::D3D12>> = prepared
            .iter()
            .filter_map(|p| match p {
                Prepared::Projection(_) => next_projection.next().map(|layer| &**layer),
                Prepared::Quad(quad) => Some(&**quad),
            })
            .collect();
        self.frame_stream
            .end(time_to_xr(display_time), self.blend_mode, &native)
            .map_err(failed("xrEndFrame"))
    }

    fn request_exit(&mut self) -> Result<(), CompositorError> {
        match self.session.request_exit() {
            Ok(()) | Err(xr::sys::Result::ERROR_SESSION_NOT_RUNNING) => Ok(()),
            Err(err) => Err(failed("xrRequestExitSession")(err)),
        }
    }

    fn end_session(&mut self) -> Result<(), CompositorError> {
        let deadline = Instant::now() + STOP_TIMEOUT;
        while self.running && Instant::now() < deadline {
            self.pump_events()?;
            if self.running {
                thread::sleep(IDLE_POLL);
            }
        }
        if self.running {
            tracing::warn!("runtime did not stop the session, ending it directly");
            self.session.end().map_err(failed("xrEndSession"))?;
            self.running = false;
        }
        Ok(())
    }
}
