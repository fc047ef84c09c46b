// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Handoff protocol audit and grading over trace events.
//!
//! [`ProtocolAudit`] is a [`TraceSink`] that replays the rules every shared
//! image must follow and records a [`Violation`] for each break. It never
//! panics and never stops the frame loop; violations are logged at `warn` and
//! counted into an [`AuditReport`].

use std::collections::HashMap;
use std::fmt;

use xrbridge_core::api::ApiId;
use xrbridge_core::handle::{ResourceId, SwapchainHandle};
use xrbridge_core::layer::{LayerKind, LayerStatus};
use xrbridge_core::trace::{
    FrameSummary, FrameWaitEvent, HandoffEvent, HandoffOp, LayerTransitionEvent, SwapchainEvent,
    SwapchainOp, TraceSink,
};

/// One broken protocol rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Violation {
    /// A timeline value went backwards.
    NonMonotonic {
        /// The resource.
        resource: ResourceId,
        /// Highest value seen before.
        last: u64,
        /// The offending value.
        value: u64,
    },
    /// A wait did not target the value the other API last signaled.
    WaitWithoutSignal {
        /// The resource.
        resource: ResourceId,
        /// API that waited.
        api: ApiId,
        /// Value waited for.
        value: u64,
        /// Value that was actually available.
        expected: u64,
    },
    /// A signal did not follow a wait for the value below it on the same API.
    SignalWithoutWait {
        /// The resource.
        resource: ResourceId,
        /// API that signaled.
        api: ApiId,
        /// Value signaled.
        value: u64,
    },
    /// A swapchain was acquired twice without a release.
    DoubleAcquire(SwapchainHandle),
    /// A swapchain was released without an acquire.
    ReleaseWithoutAcquire(SwapchainHandle),
    /// A layer transition did not start from the layer's last status.
    LayerDiscontinuity {
        /// The layer.
        layer: LayerKind,
        /// Status the previous transition ended in.
        expected: LayerStatus,
        /// Status this transition claims to start from.
        from: LayerStatus,
    },
    /// A frame index was skipped or repeated.
    FrameGap {
        /// Index that should have come next.
        expected: u64,
        /// Index that came.
        actual: u64,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonMonotonic {
                resource,
                last,
                value,
            } => write!(f, "timeline of {resource} went back from {last} to {value}"),
            Self::WaitWithoutSignal {
                resource,
                api,
                value,
                expected,
            } => write!(
                f,
                "{api} waited for {value} on {resource}, but {expected} is the value handed over"
            ),
            Self::SignalWithoutWait {
                resource,
                api,
                value,
            } => write!(f, "{api} signaled {value} on {resource} without waiting first"),
            Self::DoubleAcquire(sc) => write!(f, "{sc:?} acquired twice"),
            Self::ReleaseWithoutAcquire(sc) => write!(f, "{sc:?} released without an acquire"),
            Self::LayerDiscontinuity {
                layer,
                expected,
                from,
            } => write!(f, "{layer} layer left {from} but was {expected}"),
            Self::FrameGap { expected, actual } => {
                write!(f, "frame {actual} followed frame {}", expected - 1)
            }
        }
    }
}

/// Letter grade for protocol health.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditGrade {
    /// No violations.
    A,
    /// Under one violation per 1000 handoffs.
    B,
    /// Under ten violations per 1000 handoffs.
    C,
    /// Anything worse.
    D,
}

impl AuditGrade {
    /// Returns a short label for HUD rendering.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

/// Aggregated report returned by [`ProtocolAudit::report`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AuditReport {
    /// Current grade.
    pub grade: AuditGrade,
    /// Frames observed.
    pub frames: u64,
    /// Frames the compositor did not display.
    pub hidden_frames: u64,
    /// Handoff waits and signals observed.
    pub handoffs: u64,
    /// Violations recorded.
    pub violations: u64,
    /// Violations per 1000 handoffs.
    pub violations_per_1000: f64,
}

#[derive(Clone, Copy, Debug, Default)]
struct Timeline {
    highest: Option<u64>,
    handed_over: Option<(ApiId, u64)>,
    waited: Option<(ApiId, u64)>,
}

/// Audits handoff, swapchain, layer and frame events as they happen.
///
/// `N` is the length of the per-frame handoff history.
#[derive(Debug)]
pub struct ProtocolAudit<const N: usize = 32> {
    timelines: HashMap<ResourceId, Timeline>,
    acquired: HashMap<SwapchainHandle, bool>,
    layers: HashMap<LayerKind, LayerStatus>,
    next_frame: Option<u64>,
    violations: Vec<Violation>,
    frames: u64,
    hidden_frames: u64,
    handoffs: u64,
    frame_handoffs: [u32; N],
    cursor: usize,
}

impl<const N: usize> Default for ProtocolAudit<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ProtocolAudit<N> {
    /// Creates an empty audit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timelines: HashMap::new(),
            acquired: HashMap::new(),
            layers: HashMap::new(),
            next_frame: None,
            violations: Vec::new(),
            frames: 0,
            hidden_frames: 0,
            handoffs: 0,
            frame_handoffs: [0; N],
            cursor: 0,
        }
    }

    /// Violations recorded so far, oldest first.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Returns the current report.
    #[must_use]
    pub fn report(&self) -> AuditReport {
        let violations = self.violations.len() as u64;
        let per_1000 = if self.handoffs == 0 {
            0.0
        } else {
            violations as f64 * 1000.0 / self.handoffs as f64
        };
        AuditReport {
            grade: grade_for(violations, per_1000),
            frames: self.frames,
            hidden_frames: self.hidden_frames,
            handoffs: self.handoffs,
            violations,
            violations_per_1000: per_1000,
        }
    }

    /// Returns per-frame handoff counts oldest→newest. The newest entry is
    /// the frame in progress.
    #[must_use]
    pub fn frame_handoffs(&self) -> [u32; N] {
        let mut out = [0; N];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.frame_handoffs[(self.cursor + 1 + i) % N];
        }
        out
    }

    /// Returns an ASCII sparkline over [`frame_handoffs`](Self::frame_handoffs),
    /// scaled to `max`.
    #[must_use]
    pub fn sparkline_ascii(&self, max: u32) -> String {
        const LEVELS: &[u8] = b" .:-=+*#%@";
        let max = max.max(1);
        self.frame_handoffs()
            .iter()
            .map(|&v| {
                let t = f64::from(v.min(max)) / f64::from(max);
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "index is clamped to ASCII level count"
                )]
                let level = (t * (LEVELS.len() as f64 - 1.0) + 0.5) as usize;
                LEVELS[level] as char
            })
            .collect()
    }

    fn record(&mut self, v: Violation) {
        tracing::warn!("protocol violation: {v}");
        self.violations.push(v);
    }
}

fn grade_for(violations: u64, per_1000: f64) -> AuditGrade {
    if violations == 0 {
        AuditGrade::A
    } else if per_1000 < 1.0 {
        AuditGrade::B
    } else if per_1000 < 10.0 {
        AuditGrade::C
    } else {
        AuditGrade::D
    }
}

impl<const N: usize> TraceSink for ProtocolAudit<N> {
    fn on_frame_wait(&mut self, e: &FrameWaitEvent) {
        if let Some(expected) = self.next_frame
            && e.frame_index != expected
        {
            self.record(Violation::FrameGap {
                expected,
                actual: e.frame_index,
            });
        }
        self.next_frame = Some(e.frame_index + 1);
        self.frames += 1;
        if !e.should_render {
            self.hidden_frames += 1;
        }
        if N > 0 {
            self.cursor = (self.cursor + 1) % N;
            self.frame_handoffs[self.cursor] = 0;
        }
    }

    fn on_layer_transition(&mut self, e: &LayerTransitionEvent) {
        let expected = self
            .layers
            .insert(e.layer, e.to)
            .unwrap_or(LayerStatus::NotRendering);
        if expected != e.from {
            self.record(Violation::LayerDiscontinuity {
                layer: e.layer,
                expected,
                from: e.from,
            });
        }
    }

    fn on_handoff(&mut self, e: &HandoffEvent) {
        self.handoffs += 1;
        if N > 0 {
            self.frame_handoffs[self.cursor] = self.frame_handoffs[self.cursor].saturating_add(1);
        }

        let t = *self.timelines.entry(e.resource).or_default();
        let mut found = Vec::new();
        if let Some(last) = t.highest
            && e.value < last
        {
            found.push(Violation::NonMonotonic {
                resource: e.resource,
                last,
                value: e.value,
            });
        }

        let mut next = t;
        next.highest = Some(t.highest.map_or(e.value, |h| h.max(e.value)));
        match e.op {
            HandoffOp::Wait => {
                // A fresh image starts on the render side at zero.
                let (owner, available) = t.handed_over.unwrap_or((ApiId::Present, 0));
                if owner != e.api.other() || available != e.value {
                    found.push(Violation::WaitWithoutSignal {
                        resource: e.resource,
                        api: e.api,
                        value: e.value,
                        expected: available,
                    });
                }
                next.waited = Some((e.api, e.value));
            }
            HandoffOp::Signal => {
                let paired = t
                    .waited
                    .is_some_and(|(api, v)| api == e.api && v.checked_add(1) == Some(e.value));
                if !paired {
                    found.push(Violation::SignalWithoutWait {
                        resource: e.resource,
                        api: e.api,
                        value: e.value,
                    });
                }
                next.waited = None;
                next.handed_over = Some((e.api, e.value));
            }
        }
        self.timelines.insert(e.resource, next);
        for v in found {
            self.record(v);
        }
    }

    fn on_swapchain(&mut self, e: &SwapchainEvent) {
        let held = self.acquired.entry(e.swapchain).or_insert(false);
        let violation = match (e.op, *held) {
            (SwapchainOp::Acquire, true) => Some(Violation::DoubleAcquire(e.swapchain)),
            (SwapchainOp::Release, false) => Some(Violation::ReleaseWithoutAcquire(e.swapchain)),
            _ => None,
        };
        *held = e.op == SwapchainOp::Acquire;
        if let Some(v) = violation {
            self.record(v);
        }
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        tracing::trace!(
            frame = s.frame_index,
            submitted = s.layers_submitted,
            skipped = s.layers_skipped,
            "audited frame"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrbridge_core::api::{Format, Render};
    use xrbridge_core::composition::Extent;
    use xrbridge_core::config::SessionConfig;
    use xrbridge_core::device::{InteropCaps, SurfaceDesc};
    use xrbridge_core::frame::FrameOrchestrator;
    use xrbridge_core::testing::{
        FakeBootstrap, FakeExporter, FakeImporter, RecordingDevice, RecordingStream,
        ScriptedCompositor,
    };
    use xrbridge_core::time::{XrDuration, XrTime};
    use xrbridge_core::trace::Tracer;
    use xrbridge_core::view::Eye;

    fn handoff(idx: u32, api: ApiId, op: HandoffOp, value: u64) -> HandoffEvent {
        HandoffEvent {
            resource: ResourceId::from_raw(idx, 0),
            api,
            op,
            value,
        }
    }

    #[test]
    fn clean_round_trip_grades_a() {
        let mut audit = ProtocolAudit::<4>::new();
        audit.on_handoff(&handoff(0, ApiId::Render, HandoffOp::Wait, 0));
        audit.on_handoff(&handoff(0, ApiId::Render, HandoffOp::Signal, 1));
        audit.on_handoff(&handoff(0, ApiId::Present, HandoffOp::Wait, 1));
        audit.on_handoff(&handoff(0, ApiId::Present, HandoffOp::Signal, 2));
        audit.on_handoff(&handoff(0, ApiId::Render, HandoffOp::Wait, 2));
        let report = audit.report();
        assert_eq!(report.violations, 0, "{:?}", audit.violations());
        assert_eq!(report.grade, AuditGrade::A, "clean");
        assert_eq!(report.handoffs, 5, "all counted");
    }

    #[test]
    fn waiting_on_own_signal_is_flagged() {
        let mut audit = ProtocolAudit::<4>::new();
        audit.on_handoff(&handoff(0, ApiId::Render, HandoffOp::Wait, 0));
        audit.on_handoff(&handoff(0, ApiId::Render, HandoffOp::Signal, 1));
        audit.on_handoff(&handoff(0, ApiId::Render, HandoffOp::Wait, 1));
        assert_eq!(
            audit.violations(),
            &[Violation::WaitWithoutSignal {
                resource: ResourceId::from_raw(0, 0),
                api: ApiId::Render,
                value: 1,
                expected: 1,
            }],
            "render cannot consume its own signal"
        );
    }

    #[test]
    fn backwards_signal_is_flagged_twice() {
        let mut audit = ProtocolAudit::<4>::new();
        audit.on_handoff(&handoff(1, ApiId::Render, HandoffOp::Wait, 0));
        audit.on_handoff(&handoff(1, ApiId::Render, HandoffOp::Signal, 1));
        audit.on_handoff(&handoff(1, ApiId::Present, HandoffOp::Wait, 1));
        audit.on_handoff(&handoff(1, ApiId::Present, HandoffOp::Signal, 0));
        let v = audit.violations();
        assert_eq!(v.len(), 2, "{v:?}");
        assert!(matches!(v[0], Violation::NonMonotonic { last: 1, value: 0, .. }), "{v:?}");
        assert!(matches!(v[1], Violation::SignalWithoutWait { value: 0, .. }), "{v:?}");
        assert_eq!(audit.report().grade, AuditGrade::D, "half the handoffs broken");
    }

    #[test]
    fn swapchain_balance() {
        let mut audit = ProtocolAudit::<4>::new();
        let sc = SwapchainHandle(5);
        let ev = |op| SwapchainEvent {
            swapchain: sc,
            op,
            image_index: 0,
        };
        audit.on_swapchain(&ev(SwapchainOp::Acquire));
        audit.on_swapchain(&ev(SwapchainOp::Acquire));
        audit.on_swapchain(&ev(SwapchainOp::Release));
        audit.on_swapchain(&ev(SwapchainOp::Release));
        assert_eq!(
            audit.violations(),
            &[Violation::DoubleAcquire(sc), Violation::ReleaseWithoutAcquire(sc)],
            "one of each"
        );
    }

    #[test]
    fn frame_gaps_and_hidden_frames() {
        let mut audit = ProtocolAudit::<4>::new();
        let wait = |frame_index, should_render| FrameWaitEvent {
            frame_index,
            predicted_display_time: XrTime(0),
            predicted_period: XrDuration(11_111_111),
            should_render,
        };
        audit.on_frame_wait(&wait(1, true));
        audit.on_frame_wait(&wait(2, false));
        audit.on_frame_wait(&wait(4, true));
        let report = audit.report();
        assert_eq!(report.frames, 3, "three frames");
        assert_eq!(report.hidden_frames, 1, "one hidden");
        assert_eq!(
            audit.violations(),
            &[Violation::FrameGap {
                expected: 3,
                actual: 4
            }],
            "frame 3 missing"
        );
    }

    #[test]
    fn sparkline_tracks_handoffs_per_frame() {
        let mut audit = ProtocolAudit::<3>::new();
        let wait = FrameWaitEvent {
            frame_index: 1,
            predicted_display_time: XrTime(0),
            predicted_period: XrDuration(0),
            should_render: true,
        };
        audit.on_frame_wait(&wait);
        audit.on_handoff(&handoff(0, ApiId::Render, HandoffOp::Wait, 0));
        audit.on_handoff(&handoff(0, ApiId::Render, HandoffOp::Signal, 1));
        assert_eq!(audit.frame_handoffs(), [0, 0, 2], "newest last");
        assert_eq!(audit.sparkline_ascii(2), "  @", "full bar for the current frame");
    }

    #[test]
    fn orchestrated_session_is_clean() {
        let mut audit = ProtocolAudit::<8>::new();
        let mut o = FrameOrchestrator::new(
            ScriptedCompositor::new(Extent::new(64, 64)).with_should_render(&[true, false, true]),
            RecordingDevice::default(),
            &FakeBootstrap::new(InteropCaps::ALL),
            SessionConfig::default(),
        )
        .unwrap();

        let mut render = RecordingStream::<Render>::default();
        let mut import = |o: &mut FrameOrchestrator<_, _>, format| {
            o.import_resource(
                &SurfaceDesc {
                    extent: Extent::new(64, 64),
                    render_format: format,
                    present_format: format,
                },
                &mut FakeExporter::default(),
                &mut FakeImporter::new(InteropCaps::ALL),
                &mut render,
            )
            .unwrap()
        };
        let color = [import(&mut o, Format::Rgba8Srgb), import(&mut o, Format::Rgba8Srgb)];
        let hud = import(&mut o, Format::Rgba8Srgb);

        let mut render = RecordingStream::<Render>::default();
        for _ in 0..3 {
            let mut tracer = Tracer::new(&mut audit);
            o.start_frame(&mut tracer).unwrap();
            for (eye, id) in Eye::BOTH.into_iter().zip(color) {
                let token = o.resources_mut().take_parked(id).unwrap();
                let access = o
                    .resources_mut()
                    .wait_before_write(&mut render, token, &mut tracer)
                    .unwrap();
                let token = o
                    .resources_mut()
                    .signal_after_write(&mut render, access, &mut tracer)
                    .unwrap();
                o.stereo_mut()
                    .unwrap()
                    .add_texture(eye, token, &mut tracer)
                    .unwrap();
            }
            let token = o.resources_mut().take_parked(hud).unwrap();
            let access = o
                .resources_mut()
                .wait_before_write(&mut render, token, &mut tracer)
                .unwrap();
            let token = o
                .resources_mut()
                .signal_after_write(&mut render, access, &mut tracer)
                .unwrap();
            o.overlay_mut().unwrap().add_texture(token, &mut tracer).unwrap();
            o.end_frame(&mut tracer).unwrap();
        }

        let report = audit.report();
        assert_eq!(report.violations, 0, "{:?}", audit.violations());
        assert_eq!(report.frames, 3, "three frames");
        assert_eq!(report.hidden_frames, 1, "one hidden");
        // Three images, four handoff records each, per frame.
        assert_eq!(report.handoffs, 36, "handoffs");
    }
}
