// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Display times
//! are printed in microseconds of the runtime clock.

use std::io::Write;

use xrbridge_core::trace::{
    FrameSummary, FrameWaitEvent, HandoffEvent, HandoffOp, LayerTransitionEvent, SubmitEvent,
    SwapchainEvent, SwapchainOp, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    handoffs: bool,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("handoffs", &self.handoffs)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self {
            writer,
            handoffs: true,
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer,
            handoffs: true,
        }
    }

    /// Omits per-handoff lines, which dominate the output at four or more
    /// per shared image per frame.
    #[must_use]
    pub fn without_handoffs(mut self) -> Self {
        self.handoffs = false;
        self
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_frame_wait(&mut self, e: &FrameWaitEvent) {
        let shown = if e.should_render { "shown" } else { "HIDDEN" };
        let _ = writeln!(
            self.writer,
            "[wait] frame={} display={:.1}µs period={:.1}µs {shown}",
            e.frame_index,
            e.predicted_display_time.as_micros_f64(),
            e.predicted_period.nanos() as f64 / 1000.0,
        );
    }

    fn on_layer_transition(&mut self, e: &LayerTransitionEvent) {
        let _ = writeln!(
            self.writer,
            "[layer] frame={} {}: {} -> {}",
            e.frame_index, e.layer, e.from, e.to,
        );
    }

    fn on_handoff(&mut self, e: &HandoffEvent) {
        if !self.handoffs {
            return;
        }
        let op = match e.op {
            HandoffOp::Wait => "wait",
            HandoffOp::Signal => "signal",
        };
        let _ = writeln!(
            self.writer,
            "[handoff] {} {op} {} value={}",
            e.api, e.resource, e.value,
        );
    }

    fn on_swapchain(&mut self, e: &SwapchainEvent) {
        let op = match e.op {
            SwapchainOp::Acquire => "acquire",
            SwapchainOp::Release => "release",
        };
        let _ = writeln!(
            self.writer,
            "[swapchain] {op} {:#x} image={}",
            e.swapchain.0, e.image_index,
        );
    }

    fn on_submit(&mut self, e: &SubmitEvent) {
        let _ = writeln!(
            self.writer,
            "[submit] frame={} display={:.1}µs layers={}",
            e.frame_index,
            e.display_time.as_micros_f64(),
            e.layer_count,
        );
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        let _ = writeln!(
            self.writer,
            "[summary] frame={} submitted={} skipped={}",
            s.frame_index, s.layers_submitted, s.layers_skipped,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrbridge_core::api::ApiId;
    use xrbridge_core::handle::ResourceId;
    use xrbridge_core::layer::{LayerKind, LayerStatus};
    use xrbridge_core::time::{XrDuration, XrTime};

    #[test]
    fn hidden_frame_is_flagged() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_frame_wait(&FrameWaitEvent {
            frame_index: 1,
            predicted_display_time: XrTime(2_000_000),
            predicted_period: XrDuration(11_111_111),
            should_render: false,
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.contains("[wait] frame=1"), "got: {output}");
        assert!(output.contains("HIDDEN"), "got: {output}");
    }

    #[test]
    fn layer_transition_uses_status_names() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_layer_transition(&LayerTransitionEvent {
            frame_index: 4,
            layer: LayerKind::Stereo,
            from: LayerStatus::Preparing,
            to: LayerStatus::Binding,
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.contains("stereo: preparing -> binding"), "got: {output}");
    }

    #[test]
    fn handoff_lines_can_be_suppressed() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new()).without_handoffs();
        sink.on_handoff(&HandoffEvent {
            resource: ResourceId::from_raw(0, 0),
            api: ApiId::Render,
            op: HandoffOp::Wait,
            value: 0,
        });
        assert!(sink.into_inner().is_empty(), "nothing written");
    }
}
