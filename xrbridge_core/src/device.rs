// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend contract for graphics devices.
//!
//! Each graphics API backend provides some of the following pieces:
//!
//! - **Command stream**: implements [`CommandStream<A>`] over a native
//!   command buffer or command list. Waits and signals recorded on a stream
//!   take effect at submission, around the recorded work.
//!
//! - **Export / import**: the present API creates shareable images and fences
//!   ([`ResourceExporter`]); the render API opens them by OS handle
//!   ([`ResourceImporter`]).
//!
//! - **Bootstrap**: reports adapter identity, memory heaps, and interop
//!   capabilities ([`DeviceBootstrap`]). Consumed once, at session start.
//!
//! - **Present device**: begins and submits present-API command streams and
//!   builds the fixed [`PresentPipeline`] objects the layers draw with
//!   ([`PresentDevice`]).
//!
//! # Crate boundaries
//!
//! `xrbridge_core` owns the protocol and the state machines. Backend crates
//! depend on `xrbridge_core` and translate these calls into native ones.
//! Test doubles for every trait live in [`testing`](crate::testing).

use crate::api::{Format, GraphicsApi, Present};
use crate::composition::Extent;
use crate::error::{Capability, CapabilityError, DeviceError};
use crate::handle::{NativeImage, OsHandle, SyncHandle};

/// A value to clear an image with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearValue {
    /// Linear RGBA.
    Color([f32; 4]),
    /// Depth in `[0, 1]`.
    Depth(f32),
}

impl ClearValue {
    /// `"color"` or `"depth"`.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Color(_) => "color",
            Self::Depth(_) => "depth",
        }
    }
}

/// Records GPU work for one graphics API.
///
/// Recording is infallible; failures surface when the backend submits.
pub trait CommandStream<A: GraphicsApi> {
    /// Makes work submitted with this stream wait until `sync` reaches
    /// `value`.
    fn wait(&mut self, sync: SyncHandle, value: u64);

    /// Sets `sync` to `value` once the work submitted with this stream
    /// completes.
    fn signal(&mut self, sync: SyncHandle, value: u64);

    /// Orders all prior work on all resources before all later work.
    fn full_barrier(&mut self);

    /// Moves `image` from one access state to another.
    fn transition(&mut self, image: NativeImage, format: Format, from: A::State, to: A::State);

    /// Copies `extent` texels of `format` from `src` to `dst`, which are in
    /// `src_state` and `dst_state`.
    ///
    /// The states are the caller's record of each image; the stream keeps no
    /// per-image state of its own.
    fn copy_image(
        &mut self,
        src: NativeImage,
        dst: NativeImage,
        format: Format,
        src_state: A::State,
        dst_state: A::State,
        extent: Extent,
    );

    /// Clears `image`, which is in `state`, a clear-capable state for
    /// `format`.
    fn clear(&mut self, image: NativeImage, format: Format, state: A::State, value: ClearValue);

    /// The native command buffer or command list being recorded, as a raw
    /// pointer or handle. Pipelines use it to record draws directly.
    fn raw_commands(&self) -> u64;
}

// ---------------------------------------------------------------------------
// Capabilities and bootstrap
// ---------------------------------------------------------------------------

/// What the render device can import from the present device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct InteropCaps {
    /// External memory import of present-API images.
    pub external_memory: bool,
    /// External semaphore import of present-API fences.
    pub external_semaphore: bool,
    /// Timeline semaphore support.
    pub timeline_semaphore: bool,
}

impl InteropCaps {
    /// Everything supported.
    pub const ALL: Self = Self {
        external_memory: true,
        external_semaphore: true,
        timeline_semaphore: true,
    };

    /// Returns the first missing capability as an error.
    pub fn require_all(&self) -> Result<(), CapabilityError> {
        let missing = if !self.external_memory {
            Capability::ExternalMemory
        } else if !self.external_semaphore {
            Capability::ExternalSemaphore
        } else if !self.timeline_semaphore {
            Capability::TimelineSemaphore
        } else {
            return Ok(());
        };
        Err(CapabilityError { missing })
    }
}

/// Adapter identity, as reported by the render device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdapterInfo {
    /// Human-readable name.
    pub name: String,
    /// PCI vendor id.
    pub vendor_id: u32,
    /// PCI device id.
    pub device_id: u32,
}

/// One memory heap of the render device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryHeap {
    /// Heap size in bytes.
    pub size: u64,
    /// Whether the heap is device-local (VRAM).
    pub device_local: bool,
}

/// Sums the device-local heaps.
#[must_use]
pub fn device_local_bytes(heaps: &[MemoryHeap]) -> u64 {
    heaps
        .iter()
        .filter(|h| h.device_local)
        .fold(0_u64, |acc, h| acc.saturating_add(h.size))
}

/// Device facts consumed once at session start.
pub trait DeviceBootstrap {
    /// Interop support on the render device.
    fn interop_caps(&self) -> InteropCaps;

    /// Adapter identity.
    fn adapter(&self) -> AdapterInfo;

    /// Memory heaps of the render device.
    fn memory_heaps(&self) -> Vec<MemoryHeap>;
}

/// Checks interop support and logs the adapter.
///
/// This runs before any swapchain or shared image exists, so a device that
/// cannot import fails the session before its first frame.
pub fn check_device(bootstrap: &dyn DeviceBootstrap) -> Result<AdapterInfo, CapabilityError> {
    let adapter = bootstrap.adapter();
    let vram = device_local_bytes(&bootstrap.memory_heaps());
    tracing::info!(
        adapter = %adapter.name,
        vendor = format_args!("{:#06x}", adapter.vendor_id),
        device = format_args!("{:#06x}", adapter.device_id),
        vram_gib = vram as f64 / f64::from(1_u32 << 30),
        "using adapter"
    );
    if let Err(err) = bootstrap.interop_caps().require_all() {
        tracing::error!(adapter = %adapter.name, "{err}");
        return Err(err);
    }
    Ok(adapter)
}

// ---------------------------------------------------------------------------
// Export / import
// ---------------------------------------------------------------------------

/// Size and per-API formats of a shared image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceDesc {
    /// Image size in texels.
    pub extent: Extent,
    /// Format on the render side.
    pub render_format: Format,
    /// Format on the present side.
    pub present_format: Format,
}

/// A present-API image and fence, plus OS handles for importing them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportedSurface {
    /// The present-side image.
    pub image: NativeImage,
    /// The present-side fence.
    pub sync: SyncHandle,
    /// Shareable handle of the image.
    pub os_image: OsHandle,
    /// Shareable handle of the fence.
    pub os_sync: OsHandle,
}

/// Creates shareable images and fences on the present device.
pub trait ResourceExporter {
    /// Creates an image and a fence (initial value 0) and exports both.
    fn export(&mut self, desc: &SurfaceDesc) -> Result<ExportedSurface, DeviceError>;
}

/// The render-API objects bound to an exported surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportedSurface {
    /// Render-side image aliasing the exported memory.
    pub image: NativeImage,
    /// Render-side timeline semaphore aliasing the exported fence.
    pub sync: SyncHandle,
}

/// Opens exported surfaces on the render device.
pub trait ResourceImporter {
    /// What this device can import.
    fn caps(&self) -> InteropCaps;

    /// Imports the image and fence behind `os_image` and `os_sync`.
    fn import(
        &mut self,
        desc: &SurfaceDesc,
        os_image: OsHandle,
        os_sync: OsHandle,
    ) -> Result<ImportedSurface, DeviceError>;
}

// ---------------------------------------------------------------------------
// Present device and pipelines
// ---------------------------------------------------------------------------

/// Which fixed pipeline a layer draws with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Samples color and depth, writes color and depth targets.
    Stereo,
    /// Samples color, writes a color target.
    Overlay,
}

/// An image sampled by a present pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawSource {
    /// The present-side shared image.
    pub image: NativeImage,
    /// Format of the shader view.
    pub view_format: Format,
}

/// An image a present pipeline writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawTarget {
    /// The swapchain image.
    pub image: NativeImage,
    /// Its format.
    pub format: Format,
}

/// One draw of a present pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawJob {
    /// Color input, if bound.
    pub color: Option<DrawSource>,
    /// Depth input, if bound.
    pub depth: Option<DrawSource>,
    /// Color output.
    pub target: DrawTarget,
    /// Depth output, for stereo layers.
    pub depth_target: Option<DrawTarget>,
    /// Viewport size.
    pub extent: Extent,
}

/// Samples shared images into swapchain images.
pub trait PresentPipeline {
    /// Records the draw described by `job`.
    fn draw(
        &mut self,
        stream: &mut dyn CommandStream<Present>,
        job: &DrawJob,
    ) -> Result<(), DeviceError>;
}

/// The present-API device as seen by the frame orchestrator.
pub trait PresentDevice {
    /// Command stream type.
    type Stream: CommandStream<Present>;
    /// Pipeline type.
    type Pipeline: PresentPipeline;

    /// Builds a fixed pipeline for a layer. Called once per pipeline at
    /// session start.
    fn create_pipeline(
        &mut self,
        kind: PipelineKind,
        target: Extent,
    ) -> Result<Self::Pipeline, DeviceError>;

    /// Starts recording a new stream.
    fn begin_commands(&mut self, label: &'static str) -> Result<Self::Stream, DeviceError>;

    /// Submits a recorded stream to the present queue.
    fn submit(&mut self, stream: Self::Stream) -> Result<(), DeviceError>;

    /// Blocks until all submitted work has finished.
    fn wait_idle(&mut self) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_all_reports_first_missing() {
        let caps = InteropCaps {
            external_memory: true,
            external_semaphore: false,
            timeline_semaphore: false,
        };
        let err = caps.require_all().unwrap_err();
        assert_eq!(err.missing, Capability::ExternalSemaphore, "first gap wins");
        assert!(InteropCaps::ALL.require_all().is_ok(), "all supported");
    }

    #[test]
    fn device_local_sum_skips_host_heaps() {
        let heaps = [
            MemoryHeap {
                size: 8 << 30,
                device_local: true,
            },
            MemoryHeap {
                size: 32 << 30,
                device_local: false,
            },
            MemoryHeap {
                size: 256 << 20,
                device_local: true,
            },
        ];
        assert_eq!(device_local_bytes(&heaps), (8 << 30) + (256 << 20), "vram only");
    }
}
