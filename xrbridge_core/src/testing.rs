// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory doubles for every collaborator trait.
//!
//! Enabled for this crate's own tests and, through the `testing` feature,
//! for downstream crates and demos. Nothing here touches a GPU or an XR
//! runtime; every double records what it was asked to do so tests can
//! inspect it afterwards.

use std::collections::VecDeque;

use crate::api::{Format, GraphicsApi, Present, Render};
use crate::composition::{CompositionLayer, Extent};
use crate::compositor::{Compositor, FrameState, ViewConfig};
use crate::device::{
    AdapterInfo, ClearValue, CommandStream, DeviceBootstrap, DrawJob, ExportedSurface,
    ImportedSurface, InteropCaps, MemoryHeap, PipelineKind, PresentDevice, PresentPipeline,
    ResourceExporter, ResourceImporter, SurfaceDesc,
};
use crate::error::{CompositorError, DeviceError, ProtocolError, Result};
use crate::handle::{NativeImage, OsHandle, ResourceId, SwapchainHandle, SyncHandle};
use crate::resource::{Handoff, ResourceStore};
use crate::swapchain::{SwapchainDesc, SwapchainImages};
use crate::time::{XrDuration, XrTime};
use crate::trace::Tracer;
use crate::view::{Eye, Fov, PerEye, Pose, View, ViewProvider};

// ---------------------------------------------------------------------------
// Command stream
// ---------------------------------------------------------------------------

/// One command captured by a [`RecordingStream`].
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCmd<S> {
    /// A timeline wait.
    Wait {
        /// Timeline object.
        sync: SyncHandle,
        /// Value waited for.
        value: u64,
    },
    /// A timeline signal.
    Signal {
        /// Timeline object.
        sync: SyncHandle,
        /// Value signaled.
        value: u64,
    },
    /// A full barrier.
    Barrier,
    /// A state transition.
    Transition {
        /// Image.
        image: NativeImage,
        /// State before.
        from: S,
        /// State after.
        to: S,
    },
    /// An image copy.
    Copy {
        /// Source image.
        src: NativeImage,
        /// Destination image.
        dst: NativeImage,
        /// Texel format of both images.
        format: Format,
        /// State of `src`.
        src_state: S,
        /// State of `dst`.
        dst_state: S,
        /// Texels copied.
        extent: Extent,
    },
    /// A clear.
    Clear {
        /// Image.
        image: NativeImage,
        /// Image format.
        format: Format,
        /// State the image is cleared in.
        state: S,
        /// Clear value.
        value: ClearValue,
    },
}

/// A [`CommandStream`] that records into a `Vec`.
#[derive(Debug)]
pub struct RecordingStream<A: GraphicsApi> {
    /// Label passed to `begin_commands`, or `"test"`.
    pub label: &'static str,
    /// Commands in recording order.
    pub cmds: Vec<RecordedCmd<A::State>>,
}

impl<A: GraphicsApi> Default for RecordingStream<A> {
    fn default() -> Self {
        Self::new("test")
    }
}

impl<A: GraphicsApi> RecordingStream<A> {
    /// An empty stream.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            cmds: Vec::new(),
        }
    }

    /// Values waited for, in order.
    #[must_use]
    pub fn waits(&self) -> Vec<u64> {
        self.cmds
            .iter()
            .filter_map(|c| match c {
                RecordedCmd::Wait { value, .. } => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Values signaled, in order.
    #[must_use]
    pub fn signals(&self) -> Vec<u64> {
        self.cmds
            .iter()
            .filter_map(|c| match c {
                RecordedCmd::Signal { value, .. } => Some(*value),
                _ => None,
            })
            .collect()
    }
}

impl<A: GraphicsApi> CommandStream<A> for RecordingStream<A> {
    fn wait(&mut self, sync: SyncHandle, value: u64) {
        self.cmds.push(RecordedCmd::Wait { sync, value });
    }

    fn signal(&mut self, sync: SyncHandle, value: u64) {
        self.cmds.push(RecordedCmd::Signal { sync, value });
    }

    fn full_barrier(&mut self) {
        self.cmds.push(RecordedCmd::Barrier);
    }

    fn transition(&mut self, image: NativeImage, _format: Format, from: A::State, to: A::State) {
        self.cmds.push(RecordedCmd::Transition { image, from, to });
    }

    fn copy_image(
        &mut self,
        src: NativeImage,
        dst: NativeImage,
        format: Format,
        src_state: A::State,
        dst_state: A::State,
        extent: Extent,
    ) {
        self.cmds.push(RecordedCmd::Copy {
            src,
            dst,
            format,
            src_state,
            dst_state,
            extent,
        });
    }

    fn clear(&mut self, image: NativeImage, format: Format, state: A::State, value: ClearValue) {
        self.cmds.push(RecordedCmd::Clear {
            image,
            format,
            state,
            value,
        });
    }

    fn raw_commands(&self) -> u64 {
        0
    }
}

// ---------------------------------------------------------------------------
// Export / import
// ---------------------------------------------------------------------------

/// Hands out fresh fake present-side images and fences.
#[derive(Debug, Default)]
pub struct FakeExporter {
    exported: u64,
}

impl ResourceExporter for FakeExporter {
    fn export(&mut self, desc: &SurfaceDesc) -> Result<ExportedSurface, DeviceError> {
        if desc.extent.is_empty() {
            return Err(DeviceError::new("CreateCommittedResource", "empty extent"));
        }
        self.exported += 1;
        let n = self.exported;
        Ok(ExportedSurface {
            image: NativeImage(0xd300_0000 + n),
            sync: SyncHandle(0xfe00_0000 + n),
            os_image: OsHandle(0x1000 + 2 * n),
            os_sync: OsHandle(0x1001 + 2 * n),
        })
    }
}

/// An importer with configurable capabilities.
#[derive(Debug)]
pub struct FakeImporter {
    caps: InteropCaps,
    /// Handle pairs imported so far.
    pub imported: Vec<(OsHandle, OsHandle)>,
}

impl FakeImporter {
    /// An importer reporting `caps`.
    #[must_use]
    pub fn new(caps: InteropCaps) -> Self {
        Self {
            caps,
            imported: Vec::new(),
        }
    }
}

impl ResourceImporter for FakeImporter {
    fn caps(&self) -> InteropCaps {
        self.caps
    }

    fn import(
        &mut self,
        _desc: &SurfaceDesc,
        os_image: OsHandle,
        os_sync: OsHandle,
    ) -> Result<ImportedSurface, DeviceError> {
        self.imported.push((os_image, os_sync));
        Ok(ImportedSurface {
            image: NativeImage(0x7c00_0000 + os_image.raw()),
            sync: SyncHandle(0x5e00_0000 + os_sync.raw()),
        })
    }
}

/// Imports one shared image of `extent` and `format` with fake devices.
pub fn import_resource(
    store: &mut ResourceStore,
    extent: Extent,
    format: Format,
) -> Result<ResourceId> {
    store.import(
        &SurfaceDesc {
            extent,
            render_format: format,
            present_format: format,
        },
        &mut FakeExporter::default(),
        &mut FakeImporter::new(InteropCaps::ALL),
        &mut RecordingStream::<Render>::default(),
    )
}

/// Performs one render-side write of `id` on `stream` and returns the
/// present-side token.
pub fn render_handoff(
    store: &mut ResourceStore,
    stream: &mut RecordingStream<Render>,
    id: ResourceId,
) -> Result<Handoff<Present>, ProtocolError> {
    let mut tracer = Tracer::none();
    let token = store.take_parked(id)?;
    let access = store.wait_before_write(stream, token, &mut tracer)?;
    store.signal_after_write(stream, access, &mut tracer)
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// A device report with configurable capabilities.
#[derive(Debug)]
pub struct FakeBootstrap {
    caps: InteropCaps,
    /// Reported adapter.
    pub adapter: AdapterInfo,
    /// Reported heaps.
    pub heaps: Vec<MemoryHeap>,
}

impl FakeBootstrap {
    /// A single-heap 8 GiB adapter reporting `caps`.
    #[must_use]
    pub fn new(caps: InteropCaps) -> Self {
        Self {
            caps,
            adapter: AdapterInfo {
                name: "Fake Adapter".into(),
                vendor_id: 0x10de,
                device_id: 0x2684,
            },
            heaps: vec![MemoryHeap {
                size: 8 << 30,
                device_local: true,
            }],
        }
    }
}

impl DeviceBootstrap for FakeBootstrap {
    fn interop_caps(&self) -> InteropCaps {
        self.caps
    }

    fn adapter(&self) -> AdapterInfo {
        self.adapter.clone()
    }

    fn memory_heaps(&self) -> Vec<MemoryHeap> {
        self.heaps.clone()
    }
}

// ---------------------------------------------------------------------------
// Present device
// ---------------------------------------------------------------------------

/// A pipeline that records its draws.
#[derive(Debug, Default)]
pub struct RecordingPipeline {
    /// Target size the pipeline was built for.
    pub target: Extent,
    /// Draws in order.
    pub draws: Vec<DrawJob>,
}

impl PresentPipeline for RecordingPipeline {
    fn draw(
        &mut self,
        _stream: &mut dyn CommandStream<Present>,
        job: &DrawJob,
    ) -> Result<(), DeviceError> {
        if job.color.is_none() && job.depth.is_none() {
            return Err(DeviceError::new("draw", "nothing bound"));
        }
        self.draws.push(*job);
        Ok(())
    }
}

/// A present device that keeps every submitted stream.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    /// Pipelines created, in order.
    pub pipelines: Vec<PipelineKind>,
    /// Submitted streams, in order.
    pub submitted: Vec<RecordingStream<Present>>,
    /// Calls to `wait_idle`.
    pub idle_waits: u32,
}

impl PresentDevice for RecordingDevice {
    type Stream = RecordingStream<Present>;
    type Pipeline = RecordingPipeline;

    fn create_pipeline(
        &mut self,
        kind: PipelineKind,
        target: Extent,
    ) -> Result<RecordingPipeline, DeviceError> {
        self.pipelines.push(kind);
        Ok(RecordingPipeline {
            target,
            draws: Vec::new(),
        })
    }

    fn begin_commands(&mut self, label: &'static str) -> Result<Self::Stream, DeviceError> {
        Ok(RecordingStream::new(label))
    }

    fn submit(&mut self, stream: Self::Stream) -> Result<(), DeviceError> {
        self.submitted.push(stream);
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<(), DeviceError> {
        self.idle_waits += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Compositor
// ---------------------------------------------------------------------------

/// A swapchain ring that enforces acquire/release order like a runtime
/// would.
#[derive(Debug)]
pub struct RingImages {
    handle: SwapchainHandle,
    len: u32,
    next: u32,
    acquired: Option<u32>,
}

impl RingImages {
    /// A ring of `len` images.
    #[must_use]
    pub fn new(handle: u64, len: u32) -> Self {
        Self {
            handle: SwapchainHandle(handle),
            len,
            next: 0,
            acquired: None,
        }
    }
}

impl SwapchainImages for RingImages {
    fn handle(&self) -> SwapchainHandle {
        self.handle
    }

    fn acquire(&mut self) -> Result<u32, CompositorError> {
        if self.acquired.is_some() {
            return Err(CompositorError::new("acquire_image", "an image is already acquired"));
        }
        let index = self.next;
        self.next = (self.next + 1) % self.len.max(1);
        self.acquired = Some(index);
        Ok(index)
    }

    fn wait(&mut self, _timeout: XrDuration) -> Result<(), CompositorError> {
        match self.acquired {
            Some(_) => Ok(()),
            None => Err(CompositorError::new("wait_image", "no image acquired")),
        }
    }

    fn release(&mut self) -> Result<(), CompositorError> {
        self.acquired
            .take()
            .map(|_| ())
            .ok_or_else(|| CompositorError::new("release_image", "no image acquired"))
    }

    fn image(&self, index: u32) -> Option<NativeImage> {
        (index < self.len).then(|| NativeImage((self.handle.0 << 8) | u64::from(index + 1)))
    }
}

/// One `end_frame` call captured by [`ScriptedCompositor`].
#[derive(Clone, Debug)]
pub struct SubmittedFrame {
    /// Display time passed back.
    pub display_time: XrTime,
    /// Layers submitted.
    pub layers: Vec<CompositionLayer>,
}

/// A compositor with a scripted `should_render` sequence and a fixed
/// 90 Hz clock.
#[derive(Debug)]
pub struct ScriptedCompositor {
    views: Vec<ViewConfig>,
    should_render: VecDeque<bool>,
    next_time: XrTime,
    period: XrDuration,
    frame_open: bool,
    /// Eye views returned by `locate_eye`.
    pub eye_views: PerEye<View>,
    /// Head pose returned by `locate_head`.
    pub head: Pose,
    /// Predicted display times handed out by `wait_frame`.
    pub frame_times: Vec<XrTime>,
    /// Frames closed with `end_frame`.
    pub submitted: Vec<SubmittedFrame>,
    /// Session calls in order.
    pub calls: Vec<&'static str>,
    /// Swapchains created.
    pub swapchains_created: u32,
}

impl ScriptedCompositor {
    /// A compositor recommending `extent` for both eyes.
    #[must_use]
    pub fn new(extent: Extent) -> Self {
        let view = ViewConfig {
            recommended_extent: extent,
            sample_count: 1,
        };
        let eye = |x: f32| View {
            pose: Pose {
                position: glam::Vec3::new(x, 1.6, 0.0),
                orientation: glam::Quat::IDENTITY,
            },
            fov: Fov::symmetric(0.8, 0.8),
        };
        Self {
            views: vec![view, view],
            should_render: VecDeque::new(),
            next_time: XrTime(1_000_000_000),
            period: XrDuration(11_111_111),
            frame_open: false,
            eye_views: PerEye {
                left: eye(-0.032),
                right: eye(0.032),
            },
            head: Pose {
                position: glam::Vec3::new(0.0, 1.6, 0.0),
                orientation: glam::Quat::IDENTITY,
            },
            frame_times: Vec::new(),
            submitted: Vec::new(),
            calls: Vec::new(),
            swapchains_created: 0,
        }
    }

    /// Scripts `should_render` for the next frames; later frames render.
    #[must_use]
    pub fn with_should_render(mut self, script: &[bool]) -> Self {
        self.should_render = script.iter().copied().collect();
        self
    }

    /// Replaces the recommended view configurations.
    #[must_use]
    pub fn with_views(mut self, views: Vec<ViewConfig>) -> Self {
        self.views = views;
        self
    }
}

impl ViewProvider for ScriptedCompositor {
    fn locate_eye(&mut self, eye: Eye, _display_time: XrTime) -> Result<View, CompositorError> {
        Ok(*self.eye_views.get(eye))
    }

    fn locate_head(&mut self, _display_time: XrTime) -> Result<Pose, CompositorError> {
        Ok(self.head)
    }
}

impl Compositor for ScriptedCompositor {
    type Images = RingImages;

    fn view_configurations(&mut self) -> Result<Vec<ViewConfig>, CompositorError> {
        Ok(self.views.clone())
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<RingImages, CompositorError> {
        if desc.extent.is_empty() {
            return Err(CompositorError::new("create_swapchain", "empty extent"));
        }
        self.swapchains_created += 1;
        Ok(RingImages::new(0x100 + u64::from(self.swapchains_created), 3))
    }

    fn wait_frame(&mut self) -> Result<FrameState, CompositorError> {
        self.calls.push("wait_frame");
        self.next_time = self.next_time + self.period;
        self.frame_times.push(self.next_time);
        Ok(FrameState {
            predicted_display_time: self.next_time,
            predicted_period: self.period,
            should_render: self.should_render.pop_front().unwrap_or(true),
        })
    }

    fn begin_frame(&mut self) -> Result<(), CompositorError> {
        self.calls.push("begin_frame");
        if self.frame_open {
            return Err(CompositorError::new("begin_frame", "frame already open"));
        }
        self.frame_open = true;
        Ok(())
    }

    fn end_frame(
        &mut self,
        display_time: XrTime,
        layers: &[CompositionLayer],
    ) -> Result<(), CompositorError> {
        self.calls.push("end_frame");
        if !self.frame_open {
            return Err(CompositorError::new("end_frame", "no frame open"));
        }
        self.frame_open = false;
        self.submitted.push(SubmittedFrame {
            display_time,
            layers: layers.to_vec(),
        });
        Ok(())
    }

    fn request_exit(&mut self) -> Result<(), CompositorError> {
        self.calls.push("request_exit");
        Ok(())
    }

    fn end_session(&mut self) -> Result<(), CompositorError> {
        self.calls.push("end_session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_rejects_double_acquire() {
        let mut ring = RingImages::new(1, 2);
        assert_eq!(ring.acquire().unwrap(), 0, "first image");
        assert!(ring.acquire().is_err(), "second acquire without release");
        ring.release().unwrap();
        assert_eq!(ring.acquire().unwrap(), 1, "ring advances");
        ring.release().unwrap();
        assert_eq!(ring.acquire().unwrap(), 0, "ring wraps");
        assert!(ring.image(2).is_none(), "out of range");
    }

    #[test]
    fn scripted_clock_advances_by_period() {
        let mut c = ScriptedCompositor::new(Extent::new(8, 8)).with_should_render(&[false]);
        let a = c.wait_frame().unwrap();
        let b = c.wait_frame().unwrap();
        assert!(!a.should_render, "scripted value");
        assert!(b.should_render, "default after the script");
        assert_eq!(
            b.predicted_display_time - a.predicted_display_time,
            XrDuration(11_111_111),
            "one period apart"
        );
    }
}
