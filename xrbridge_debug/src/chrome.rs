// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! Handoff, layer and swapchain events carry no timestamp of their own. They
//! are placed at the predicted display time of the frame they belong to, one
//! microsecond apart, so their order survives in the viewer.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use xrbridge_core::layer::LayerKind;
use xrbridge_core::trace::{HandoffOp, SwapchainOp};

use crate::recorder::{RecordedEvent, decode};

const TID_FRAME: u32 = 0;
const TID_STEREO: u32 = 1;
const TID_OVERLAY: u32 = 2;
const TID_SWAPCHAIN: u32 = 3;
const TID_RESOURCE_BASE: u32 = 100;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Frames become complete (`X`) events spanning one predicted period. Each
/// shared resource gets its own track plus a counter series with the last
/// value signaled on its timeline.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    let mut frame_ts = 0.0_f64;
    let mut step = 0_u32;

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::FrameWait(e) => {
                frame_ts = e.predicted_display_time.as_micros_f64();
                step = 0;
                events.push(json!({
                    "ph": "X",
                    "name": if e.should_render { "Frame" } else { "Frame (hidden)" },
                    "cat": "Frame",
                    "ts": frame_ts,
                    "dur": e.predicted_period.nanos() as f64 / 1000.0,
                    "pid": 0,
                    "tid": TID_FRAME,
                    "args": {
                        "frame_index": e.frame_index,
                        "should_render": e.should_render,
                    }
                }));
            }
            RecordedEvent::LayerTransition(e) => {
                let tid = match e.layer {
                    LayerKind::Stereo => TID_STEREO,
                    LayerKind::Overlay => TID_OVERLAY,
                };
                events.push(json!({
                    "ph": "i",
                    "name": e.to.to_string(),
                    "cat": "Layer",
                    "ts": next_ts(frame_ts, &mut step),
                    "pid": 0,
                    "tid": tid,
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "layer": e.layer.to_string(),
                        "from": e.from.to_string(),
                    }
                }));
            }
            RecordedEvent::Handoff(e) => {
                let ts = next_ts(frame_ts, &mut step);
                let tid = TID_RESOURCE_BASE + e.resource.index();
                let op = match e.op {
                    HandoffOp::Wait => "wait",
                    HandoffOp::Signal => "signal",
                };
                events.push(json!({
                    "ph": "i",
                    "name": format!("{} {op}", e.api),
                    "cat": "Handoff",
                    "ts": ts,
                    "pid": 0,
                    "tid": tid,
                    "s": "t",
                    "args": {
                        "resource": e.resource.to_string(),
                        "value": e.value,
                    }
                }));
                if e.op == HandoffOp::Signal {
                    events.push(json!({
                        "ph": "C",
                        "name": format!("timeline {}", e.resource),
                        "cat": "Handoff",
                        "ts": ts,
                        "pid": 0,
                        "args": { "value": e.value }
                    }));
                }
            }
            RecordedEvent::Swapchain(e) => {
                let name = match e.op {
                    SwapchainOp::Acquire => "acquire",
                    SwapchainOp::Release => "release",
                };
                events.push(json!({
                    "ph": "i",
                    "name": name,
                    "cat": "Swapchain",
                    "ts": next_ts(frame_ts, &mut step),
                    "pid": 0,
                    "tid": TID_SWAPCHAIN,
                    "s": "t",
                    "args": {
                        "swapchain": format!("{:#x}", e.swapchain.0),
                        "image_index": e.image_index,
                    }
                }));
            }
            RecordedEvent::Submit(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Submit",
                    "cat": "Frame",
                    "ts": next_ts(frame_ts, &mut step),
                    "pid": 0,
                    "tid": TID_FRAME,
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "layer_count": e.layer_count,
                    }
                }));
            }
            RecordedEvent::FrameSummary(s) => {
                events.push(json!({
                    "ph": "i",
                    "name": "FrameSummary",
                    "cat": "Summary",
                    "ts": next_ts(frame_ts, &mut step),
                    "pid": 0,
                    "tid": TID_FRAME,
                    "s": "g",
                    "args": {
                        "frame_index": s.frame_index,
                        "should_render": s.should_render,
                        "layers_submitted": s.layers_submitted,
                        "layers_skipped": s.layers_skipped,
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn next_ts(frame_ts: f64, step: &mut u32) -> f64 {
    *step += 1;
    frame_ts + f64::from(*step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderSink;
    use xrbridge_core::api::ApiId;
    use xrbridge_core::handle::ResourceId;
    use xrbridge_core::time::{XrDuration, XrTime};
    use xrbridge_core::trace::{FrameWaitEvent, HandoffEvent, TraceSink};

    #[test]
    fn export_produces_valid_json() {
        let mut rec = RecorderSink::new();
        rec.on_frame_wait(&FrameWaitEvent {
            frame_index: 0,
            predicted_display_time: XrTime(1_000_000),
            predicted_period: XrDuration(11_111_000),
            should_render: true,
        });
        rec.on_handoff(&HandoffEvent {
            resource: ResourceId::from_raw(2, 0),
            api: ApiId::Present,
            op: HandoffOp::Wait,
            value: 1,
        });
        rec.on_handoff(&HandoffEvent {
            resource: ResourceId::from_raw(2, 0),
            api: ApiId::Present,
            op: HandoffOp::Signal,
            value: 2,
        });

        let mut out = Vec::new();
        export(rec.as_bytes(), &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();

        // Should parse as a JSON array.
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.len(), 4, "frame, wait, signal, counter");

        assert_eq!(parsed[0]["ph"], "X", "frame span");
        assert_eq!(parsed[0]["ts"], 1000.0, "display time in µs");
        assert_eq!(parsed[0]["dur"], 11_111.0, "one period");

        assert_eq!(parsed[1]["name"], "present wait", "wait instant");
        assert_eq!(parsed[1]["tid"], 102, "per-resource track");
        assert_eq!(parsed[1]["ts"], 1001.0, "ordered after the frame");

        assert_eq!(parsed[3]["ph"], "C", "counter follows the signal");
        assert_eq!(parsed[3]["args"]["value"], 2, "signaled value");
    }

    #[test]
    fn export_empty_recording() {
        let mut out = Vec::new();
        export(&[], &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert!(parsed.is_empty(), "no events");
    }
}
