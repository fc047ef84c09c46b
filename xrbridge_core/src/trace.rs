// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Machine-readable instrumentation for the frame loop.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! orchestrator, layers, swapchains, and resource store call as they work.
//! All method bodies default to no-ops, so implementing only the events you
//! care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing. When **on**, each
//! method performs a single `Option` branch before dispatching.
//!
//! Human-readable logs go through `tracing` instead; the two are independent.
//!
//! [`FrameSummaryBuilder`] collects per-frame facts and produces a
//! [`FrameSummary`] when the frame ends.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies (one branch per call).

use crate::api::ApiId;
use crate::handle::{ResourceId, SwapchainHandle};
use crate::layer::{LayerKind, LayerStatus};
use crate::time::{XrDuration, XrTime};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which half of a handoff happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandoffOp {
    /// A wait on the counter was recorded.
    Wait,
    /// A signal of the counter was recorded.
    Signal,
}

/// Which swapchain call happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwapchainOp {
    /// An image was acquired and waited on.
    Acquire,
    /// The acquired image was released.
    Release,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted after the compositor releases the frame loop.
#[derive(Clone, Copy, Debug)]
pub struct FrameWaitEvent {
    /// Monotonic frame counter.
    pub frame_index: u64,
    /// When the frame is expected to reach the display.
    pub predicted_display_time: XrTime,
    /// Expected time between displayed frames.
    pub predicted_period: XrDuration,
    /// Whether the compositor will display this frame.
    pub should_render: bool,
}

/// Emitted on every layer status change.
#[derive(Clone, Copy, Debug)]
pub struct LayerTransitionEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which layer.
    pub layer: LayerKind,
    /// Status before.
    pub from: LayerStatus,
    /// Status after.
    pub to: LayerStatus,
}

/// Emitted when a wait or signal is recorded on a shared resource.
#[derive(Clone, Copy, Debug)]
pub struct HandoffEvent {
    /// The resource.
    pub resource: ResourceId,
    /// The API whose stream recorded the operation.
    pub api: ApiId,
    /// Wait or signal.
    pub op: HandoffOp,
    /// Counter value waited for or signaled.
    pub value: u64,
}

/// Emitted on swapchain acquire and release.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainEvent {
    /// The swapchain.
    pub swapchain: SwapchainHandle,
    /// Acquire or release.
    pub op: SwapchainOp,
    /// Image index involved.
    pub image_index: u32,
}

/// Emitted when layers are submitted and the frame ends.
#[derive(Clone, Copy, Debug)]
pub struct SubmitEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Display time passed back to the compositor.
    pub display_time: XrTime,
    /// Number of composition layers submitted.
    pub layer_count: u32,
}

/// Per-frame summary produced by [`FrameSummaryBuilder`].
#[derive(Clone, Copy, Debug)]
pub struct FrameSummary {
    /// Frame counter.
    pub frame_index: u64,
    /// Predicted display time of the frame.
    pub display_time: XrTime,
    /// Whether the compositor asked for this frame to be rendered.
    pub should_render: bool,
    /// Layers included in the submission.
    pub layers_submitted: u32,
    /// Layers that were ready but not displayed because `should_render` was
    /// false.
    pub layers_skipped: u32,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the frame loop.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called after the compositor frame wait returns.
    fn on_frame_wait(&mut self, e: &FrameWaitEvent) {
        _ = e;
    }

    /// Called on each layer status change.
    fn on_layer_transition(&mut self, e: &LayerTransitionEvent) {
        _ = e;
    }

    /// Called when a handoff wait or signal is recorded.
    fn on_handoff(&mut self, e: &HandoffEvent) {
        _ = e;
    }

    /// Called on swapchain acquire and release.
    fn on_swapchain(&mut self, e: &SwapchainEvent) {
        _ = e;
    }

    /// Called when the frame is submitted.
    fn on_submit(&mut self, e: &SubmitEvent) {
        _ = e;
    }

    /// Called with a per-frame summary.
    fn on_frame_summary(&mut self, s: &FrameSummary) {
        _ = s;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

macro_rules! dispatch {
    ($self:ident, $method:ident, $e:ident) => {{
        #[cfg(feature = "trace")]
        if let Some(s) = &mut $self.sink {
            s.$method($e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = $e;
        }
    }};
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`FrameWaitEvent`].
    #[inline]
    pub fn frame_wait(&mut self, e: &FrameWaitEvent) {
        dispatch!(self, on_frame_wait, e);
    }

    /// Emits a [`LayerTransitionEvent`].
    #[inline]
    pub fn layer_transition(&mut self, e: &LayerTransitionEvent) {
        dispatch!(self, on_layer_transition, e);
    }

    /// Emits a [`HandoffEvent`].
    #[inline]
    pub fn handoff(&mut self, e: &HandoffEvent) {
        dispatch!(self, on_handoff, e);
    }

    /// Emits a [`SwapchainEvent`].
    #[inline]
    pub fn swapchain(&mut self, e: &SwapchainEvent) {
        dispatch!(self, on_swapchain, e);
    }

    /// Emits a [`SubmitEvent`].
    #[inline]
    pub fn submit(&mut self, e: &SubmitEvent) {
        dispatch!(self, on_submit, e);
    }

    /// Emits a [`FrameSummary`].
    #[inline]
    pub fn frame_summary(&mut self, s: &FrameSummary) {
        dispatch!(self, on_frame_summary, s);
    }
}

// ---------------------------------------------------------------------------
// FrameSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects per-frame facts and produces a [`FrameSummary`].
#[derive(Debug)]
pub struct FrameSummaryBuilder {
    wait: FrameWaitEvent,
    layers_submitted: u32,
    layers_skipped: u32,
}

impl FrameSummaryBuilder {
    /// Starts building a summary for the frame described by `wait`.
    #[must_use]
    pub fn new(wait: &FrameWaitEvent) -> Self {
        Self {
            wait: *wait,
            layers_submitted: 0,
            layers_skipped: 0,
        }
    }

    /// Records a layer included in the submission.
    pub fn layer_submitted(&mut self) {
        self.layers_submitted += 1;
    }

    /// Records a layer that was ready but not displayed.
    pub fn layer_skipped(&mut self) {
        self.layers_skipped += 1;
    }

    /// Consumes the builder and produces the final [`FrameSummary`].
    #[must_use]
    pub fn finish(self) -> FrameSummary {
        FrameSummary {
            frame_index: self.wait.frame_index,
            display_time: self.wait.predicted_display_time,
            should_render: self.wait.should_render,
            layers_submitted: self.layers_submitted,
            layers_skipped: self.layers_skipped,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_wait() -> FrameWaitEvent {
        FrameWaitEvent {
            frame_index: 42,
            predicted_display_time: XrTime(1_016_667),
            predicted_period: XrDuration(11_111_111),
            should_render: true,
        }
    }

    #[test]
    fn noop_sink_compiles() {
        let mut sink = NoopSink;
        sink.on_frame_wait(&sample_wait());
        sink.on_handoff(&HandoffEvent {
            resource: ResourceId::from_raw(0, 0),
            api: ApiId::Render,
            op: HandoffOp::Wait,
            value: 0,
        });
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        tracer.frame_wait(&sample_wait());
        tracer.submit(&SubmitEvent {
            frame_index: 42,
            display_time: XrTime(1_016_667),
            layer_count: 2,
        });
    }

    #[test]
    fn summary_builder_counts_layers() {
        let mut builder = FrameSummaryBuilder::new(&sample_wait());
        builder.layer_submitted();
        builder.layer_submitted();
        builder.layer_skipped();
        let summary = builder.finish();
        assert_eq!(summary.frame_index, 42, "frame index carried over");
        assert_eq!(summary.layers_submitted, 2, "two submitted");
        assert_eq!(summary.layers_skipped, 1, "one skipped");
        assert!(summary.should_render, "should_render carried over");
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        struct RecordingSink {
            values: Vec<u64>,
        }
        impl TraceSink for RecordingSink {
            fn on_handoff(&mut self, e: &HandoffEvent) {
                self.values.push(e.value);
            }
        }

        let mut sink = RecordingSink { values: Vec::new() };
        let mut tracer = Tracer::new(&mut sink);
        tracer.handoff(&HandoffEvent {
            resource: ResourceId::from_raw(1, 0),
            api: ApiId::Present,
            op: HandoffOp::Signal,
            value: 2,
        });
        // Access sink after tracer is dropped.
        drop(tracer);
        assert_eq!(sink.values, &[2], "one handoff recorded");
    }
}
