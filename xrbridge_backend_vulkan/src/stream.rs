// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command buffer recording for the render side.

use core::fmt;

use ash::vk::{self, Handle};
use xrbridge_core::api::{Format, ImageLayout, Render};
use xrbridge_core::composition::Extent;
use xrbridge_core::device::{ClearValue, CommandStream};
use xrbridge_core::error::DeviceError;
use xrbridge_core::handle::{NativeImage, SyncHandle};

use crate::failed;
use crate::format::{aspect, full_range, vk_layout};

fn layers(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(aspect)
        .mip_level(0)
        .base_array_layer(0)
        .layer_count(1)
}

/// Region and layouts of one `vkCmdCopyImage`.
#[derive(Clone, Copy, Debug)]
struct CopyCommand {
    region: vk::ImageCopy,
    src_layout: vk::ImageLayout,
    dst_layout: vk::ImageLayout,
}

/// Both sides of a copy address the shared image's aspect; the caller's
/// image has the same format.
fn copy_command(
    format: Format,
    src_state: ImageLayout,
    dst_state: ImageLayout,
    extent: Extent,
) -> CopyCommand {
    let aspect = aspect(format);
    CopyCommand {
        region: vk::ImageCopy::default()
            .src_subresource(layers(aspect))
            .dst_subresource(layers(aspect))
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            }),
        src_layout: vk_layout(src_state),
        dst_layout: vk_layout(dst_state),
    }
}

/// A command buffer being recorded for the render queue.
///
/// Timeline waits and signals are collected and attached to the
/// `vkQueueSubmit2` in [`submit`](Self::submit). Applications that submit
/// the buffer themselves take them with [`take_sync`](Self::take_sync).
pub struct VulkanStream {
    device: ash::Device,
    cmd: vk::CommandBuffer,
    waits: Vec<vk::SemaphoreSubmitInfo<'static>>,
    signals: Vec<vk::SemaphoreSubmitInfo<'static>>,
}

impl fmt::Debug for VulkanStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanStream")
            .field("cmd", &self.cmd)
            .field("waits", &self.waits.len())
            .field("signals", &self.signals.len())
            .finish_non_exhaustive()
    }
}

fn semaphore_info(sync: SyncHandle, value: u64) -> vk::SemaphoreSubmitInfo<'static> {
    vk::SemaphoreSubmitInfo::default()
        .semaphore(vk::Semaphore::from_raw(sync.raw()))
        .value(value)
        .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
}

impl VulkanStream {
    /// Begins one-time recording into `cmd`, which must be in the initial
    /// state.
    pub fn begin(device: ash::Device, cmd: vk::CommandBuffer) -> Result<Self, DeviceError> {
        let info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        // SAFETY: cmd is in the initial state per the caller.
        unsafe { device.begin_command_buffer(cmd, &info) }
            .map_err(failed("vkBeginCommandBuffer"))?;
        Ok(Self::wrap(device, cmd))
    }

    /// Wraps `cmd`, which the caller is already recording into.
    #[must_use]
    pub fn wrap(device: ash::Device, cmd: vk::CommandBuffer) -> Self {
        Self {
            device,
            cmd,
            waits: Vec::new(),
            signals: Vec::new(),
        }
    }

    /// The command buffer being recorded.
    #[must_use]
    pub const fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }

    /// Removes and returns the collected waits and signals.
    pub fn take_sync(
        &mut self,
    ) -> (
        Vec<vk::SemaphoreSubmitInfo<'static>>,
        Vec<vk::SemaphoreSubmitInfo<'static>>,
    ) {
        (
            core::mem::take(&mut self.waits),
            core::mem::take(&mut self.signals),
        )
    }

    /// Ends recording and submits to `queue` with the collected waits and
    /// signals. `fence`, if not null, is signaled on completion.
    pub fn submit(mut self, queue: vk::Queue, fence: vk::Fence) -> Result<(), DeviceError> {
        // SAFETY: cmd is recording.
        unsafe { self.device.end_command_buffer(self.cmd) }
            .map_err(failed("vkEndCommandBuffer"))?;
        let (waits, signals) = self.take_sync();
        let cmds = [vk::CommandBufferSubmitInfo::default().command_buffer(self.cmd)];
        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&waits)
            .command_buffer_infos(&cmds)
            .signal_semaphore_infos(&signals);
        // SAFETY: every referenced semaphore was imported by the importer,
        // which outlives the submission.
        unsafe { self.device.queue_submit2(queue, &[submit], fence) }
            .map_err(failed("vkQueueSubmit2"))?;
        tracing::trace!(
            waits = waits.len(),
            signals = signals.len(),
            "submitted render commands"
        );
        Ok(())
    }

    fn barrier(&self, barrier: vk::ImageMemoryBarrier2<'_>) {
        let barriers = [barrier];
        let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        // SAFETY: cmd is recording and the barrier names a live image.
        unsafe { self.device.cmd_pipeline_barrier2(self.cmd, &dependency) };
    }
}

impl CommandStream<Render> for VulkanStream {
    fn wait(&mut self, sync: SyncHandle, value: u64) {
        self.waits.push(semaphore_info(sync, value));
    }

    fn signal(&mut self, sync: SyncHandle, value: u64) {
        self.signals.push(semaphore_info(sync, value));
    }

    fn full_barrier(&mut self) {
        let memory = [vk::MemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .src_access_mask(vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .dst_access_mask(vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE)];
        let dependency = vk::DependencyInfo::default().memory_barriers(&memory);
        // SAFETY: cmd is recording.
        unsafe { self.device.cmd_pipeline_barrier2(self.cmd, &dependency) };
    }

    fn transition(
        &mut self,
        image: NativeImage,
        format: Format,
        from: ImageLayout,
        to: ImageLayout,
    ) {
        if from == to {
            return;
        }
        let aspect = aspect(format);
        self.barrier(
            vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
                .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
                .dst_access_mask(vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE)
                .old_layout(vk_layout(from))
                .new_layout(vk_layout(to))
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(vk::Image::from_raw(image.raw()))
                .subresource_range(full_range(aspect)),
        );
    }

    fn copy_image(
        &mut self,
        src: NativeImage,
        dst: NativeImage,
        format: Format,
        src_state: ImageLayout,
        dst_state: ImageLayout,
        extent: Extent,
    ) {
        let copy = copy_command(format, src_state, dst_state, extent);
        // SAFETY: cmd is recording; both images are live and in the layouts
        // passed here.
        unsafe {
            self.device.cmd_copy_image(
                self.cmd,
                vk::Image::from_raw(src.raw()),
                copy.src_layout,
                vk::Image::from_raw(dst.raw()),
                copy.dst_layout,
                &[copy.region],
            );
        }
    }

    fn clear(&mut self, image: NativeImage, format: Format, state: ImageLayout, value: ClearValue) {
        let range = full_range(aspect(format));
        let layout = vk_layout(state);
        let handle = vk::Image::from_raw(image.raw());
        // SAFETY: cmd is recording and the image is in a layout that allows
        // clears (GENERAL or TRANSFER_DST_OPTIMAL).
        unsafe {
            match value {
                ClearValue::Color(rgba) => self.device.cmd_clear_color_image(
                    self.cmd,
                    handle,
                    layout,
                    &vk::ClearColorValue { float32: rgba },
                    &[range],
                ),
                ClearValue::Depth(depth) => self.device.cmd_clear_depth_stencil_image(
                    self.cmd,
                    handle,
                    layout,
                    &vk::ClearDepthStencilValue { depth, stencil: 0 },
                    &[range],
                ),
            }
        }
    }

    fn raw_commands(&self) -> u64 {
        self.cmd.as_raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrbridge_core::device::{InteropCaps, SurfaceDesc};
    use xrbridge_core::resource::ResourceStore;
    use xrbridge_core::testing::{FakeExporter, FakeImporter, RecordedCmd, RecordingStream};
    use xrbridge_core::trace::Tracer;

    #[test]
    fn depth_copy_addresses_depth_aspect_on_both_sides() {
        let copy = copy_command(
            Format::D32Float,
            ImageLayout::TransferSrc,
            ImageLayout::TransferDst,
            Extent::new(64, 32),
        );
        assert_eq!(copy.region.src_subresource.aspect_mask, vk::ImageAspectFlags::DEPTH, "src");
        assert_eq!(copy.region.dst_subresource.aspect_mask, vk::ImageAspectFlags::DEPTH, "dst");
        assert_eq!(copy.region.extent.depth, 1, "single slice");
        assert_eq!(copy.src_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, "src layout");
        assert_eq!(copy.dst_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL, "dst layout");
    }

    #[test]
    fn second_frame_depth_copy_uses_layout_from_earlier_frame() {
        let mut store = ResourceStore::new(0);
        let mut first = RecordingStream::<Render>::default();
        let desc = SurfaceDesc {
            extent: Extent::new(64, 32),
            render_format: Format::D32Float,
            present_format: Format::D32Float,
        };
        let id = store
            .import(
                &desc,
                &mut FakeExporter::default(),
                &mut FakeImporter::new(InteropCaps::ALL),
                &mut first,
            )
            .unwrap();
        let mut tracer = Tracer::none();
        let token = store.take_parked(id).unwrap();
        let access = store.wait_before_write(&mut first, token, &mut tracer).unwrap();
        let src = NativeImage(0xbeef);
        store.get_mut(id).unwrap().copy_from(&access, &mut first, src);

        // A fresh command buffer: the layout was set while recording `first`.
        let mut second = RecordingStream::<Render>::default();
        store.get_mut(id).unwrap().copy_from(&access, &mut second, src);
        let recorded = second.cmds.iter().find_map(|c| match *c {
            RecordedCmd::Copy {
                format,
                src_state,
                dst_state,
                extent,
                ..
            } => Some(copy_command(format, src_state, dst_state, extent)),
            _ => None,
        });
        let copy = recorded.unwrap();
        assert_eq!(copy.region.dst_subresource.aspect_mask, vk::ImageAspectFlags::DEPTH, "aspect");
        assert_eq!(copy.dst_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL, "dst layout");
        assert!(
            !second.cmds.iter().any(|c| matches!(c, RecordedCmd::Transition { .. })),
            "no barrier in the second buffer"
        );
        let _present = store.signal_after_write(&mut second, access, &mut tracer).unwrap();
    }

    #[test]
    fn semaphore_info_waits_on_all_commands() {
        let info = semaphore_info(SyncHandle(0xabc), 7);
        assert_eq!(info.semaphore.as_raw(), 0xabc, "handle");
        assert_eq!(info.value, 7, "value");
        assert_eq!(
            info.stage_mask,
            vk::PipelineStageFlags2::ALL_COMMANDS,
            "stage"
        );
    }
}
