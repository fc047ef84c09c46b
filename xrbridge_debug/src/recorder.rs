// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].

use xrbridge_core::api::ApiId;
use xrbridge_core::handle::{ResourceId, SwapchainHandle};
use xrbridge_core::layer::{LayerKind, LayerStatus};
use xrbridge_core::time::{XrDuration, XrTime};
use xrbridge_core::trace::{
    FrameSummary, FrameWaitEvent, HandoffEvent, HandoffOp, LayerTransitionEvent, SubmitEvent,
    SwapchainEvent, SwapchainOp, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_FRAME_WAIT: u8 = 1;
const TAG_LAYER_TRANSITION: u8 = 2;
const TAG_HANDOFF: u8 = 3;
const TAG_SWAPCHAIN: u8 = 4;
const TAG_SUBMIT: u8 = 5;
const TAG_FRAME_SUMMARY: u8 = 6;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_resource(&mut self, id: ResourceId) {
        self.write_u32(id.index());
        self.write_u32(id.generation());
    }

    fn write_layer(&mut self, kind: LayerKind) {
        self.write_u8(match kind {
            LayerKind::Stereo => 0,
            LayerKind::Overlay => 1,
        });
    }

    fn write_status(&mut self, status: LayerStatus) {
        self.write_u8(match status {
            LayerStatus::NotRendering => 0,
            LayerStatus::Preparing => 1,
            LayerStatus::Binding => 2,
            LayerStatus::Rendering => 3,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_frame_wait(&mut self, e: &FrameWaitEvent) {
        self.write_u8(TAG_FRAME_WAIT);
        self.write_u64(e.frame_index);
        self.write_i64(e.predicted_display_time.nanos());
        self.write_i64(e.predicted_period.nanos());
        self.write_bool(e.should_render);
    }

    fn on_layer_transition(&mut self, e: &LayerTransitionEvent) {
        self.write_u8(TAG_LAYER_TRANSITION);
        self.write_u64(e.frame_index);
        self.write_layer(e.layer);
        self.write_status(e.from);
        self.write_status(e.to);
    }

    fn on_handoff(&mut self, e: &HandoffEvent) {
        self.write_u8(TAG_HANDOFF);
        self.write_resource(e.resource);
        self.write_u8(match e.api {
            ApiId::Render => 0,
            ApiId::Present => 1,
        });
        self.write_u8(match e.op {
            HandoffOp::Wait => 0,
            HandoffOp::Signal => 1,
        });
        self.write_u64(e.value);
    }

    fn on_swapchain(&mut self, e: &SwapchainEvent) {
        self.write_u8(TAG_SWAPCHAIN);
        self.write_u64(e.swapchain.0);
        self.write_u8(match e.op {
            SwapchainOp::Acquire => 0,
            SwapchainOp::Release => 1,
        });
        self.write_u32(e.image_index);
    }

    fn on_submit(&mut self, e: &SubmitEvent) {
        self.write_u8(TAG_SUBMIT);
        self.write_u64(e.frame_index);
        self.write_i64(e.display_time.nanos());
        self.write_u32(e.layer_count);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.write_u8(TAG_FRAME_SUMMARY);
        self.write_u64(s.frame_index);
        self.write_i64(s.display_time.nanos());
        self.write_bool(s.should_render);
        self.write_u32(s.layers_submitted);
        self.write_u32(s.layers_skipped);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`FrameWaitEvent`].
    FrameWait(FrameWaitEvent),
    /// A [`LayerTransitionEvent`].
    LayerTransition(LayerTransitionEvent),
    /// A [`HandoffEvent`].
    Handoff(HandoffEvent),
    /// A [`SwapchainEvent`].
    Swapchain(SwapchainEvent),
    /// A [`SubmitEvent`].
    Submit(SubmitEvent),
    /// A [`FrameSummary`].
    FrameSummary(FrameSummary),
}

impl RecordedEvent {
    /// Replays this event into `sink`.
    pub fn replay(&self, sink: &mut dyn TraceSink) {
        match self {
            Self::FrameWait(e) => sink.on_frame_wait(e),
            Self::LayerTransition(e) => sink.on_layer_transition(e),
            Self::Handoff(e) => sink.on_handoff(e),
            Self::Swapchain(e) => sink.on_swapchain(e),
            Self::Submit(e) => sink.on_submit(e),
            Self::FrameSummary(s) => sink.on_frame_summary(s),
        }
    }
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> Option<u8> {
        if self.remaining() < 1 {
            return None;
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Some(v)
    }

    fn read_bool(&mut self) -> Option<bool> {
        Some(self.read_u8()? != 0)
    }

    fn read_u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let v = u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().ok()?);
        self.pos += 4;
        Some(v)
    }

    fn read_u64(&mut self) -> Option<u64> {
        if self.remaining() < 8 {
            return None;
        }
        let v = u64::from_le_bytes(self.data[self.pos..self.pos + 8].try_into().ok()?);
        self.pos += 8;
        Some(v)
    }

    fn read_i64(&mut self) -> Option<i64> {
        if self.remaining() < 8 {
            return None;
        }
        let v = i64::from_le_bytes(self.data[self.pos..self.pos + 8].try_into().ok()?);
        self.pos += 8;
        Some(v)
    }

    fn read_resource(&mut self) -> Option<ResourceId> {
        let idx = self.read_u32()?;
        let generation = self.read_u32()?;
        Some(ResourceId::from_raw(idx, generation))
    }

    fn read_layer(&mut self) -> Option<LayerKind> {
        Some(match self.read_u8()? {
            0 => LayerKind::Stereo,
            _ => LayerKind::Overlay,
        })
    }

    fn read_status(&mut self) -> Option<LayerStatus> {
        Some(match self.read_u8()? {
            0 => LayerStatus::NotRendering,
            1 => LayerStatus::Preparing,
            2 => LayerStatus::Binding,
            _ => LayerStatus::Rendering,
        })
    }

    fn decode_frame_wait(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameWait(FrameWaitEvent {
            frame_index: self.read_u64()?,
            predicted_display_time: XrTime(self.read_i64()?),
            predicted_period: XrDuration(self.read_i64()?),
            should_render: self.read_bool()?,
        }))
    }

    fn decode_layer_transition(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::LayerTransition(LayerTransitionEvent {
            frame_index: self.read_u64()?,
            layer: self.read_layer()?,
            from: self.read_status()?,
            to: self.read_status()?,
        }))
    }

    fn decode_handoff(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Handoff(HandoffEvent {
            resource: self.read_resource()?,
            api: match self.read_u8()? {
                0 => ApiId::Render,
                _ => ApiId::Present,
            },
            op: match self.read_u8()? {
                0 => HandoffOp::Wait,
                _ => HandoffOp::Signal,
            },
            value: self.read_u64()?,
        }))
    }

    fn decode_swapchain(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Swapchain(SwapchainEvent {
            swapchain: SwapchainHandle(self.read_u64()?),
            op: match self.read_u8()? {
                0 => SwapchainOp::Acquire,
                _ => SwapchainOp::Release,
            },
            image_index: self.read_u32()?,
        }))
    }

    fn decode_submit(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Submit(SubmitEvent {
            frame_index: self.read_u64()?,
            display_time: XrTime(self.read_i64()?),
            layer_count: self.read_u32()?,
        }))
    }

    fn decode_frame_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameSummary(FrameSummary {
            frame_index: self.read_u64()?,
            display_time: XrTime(self.read_i64()?),
            should_render: self.read_bool()?,
            layers_submitted: self.read_u32()?,
            layers_skipped: self.read_u32()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_FRAME_WAIT => self.decode_frame_wait(),
            TAG_LAYER_TRANSITION => self.decode_layer_transition(),
            TAG_HANDOFF => self.decode_handoff(),
            TAG_SWAPCHAIN => self.decode_swapchain(),
            TAG_SUBMIT => self.decode_submit(),
            TAG_FRAME_SUMMARY => self.decode_frame_summary(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
