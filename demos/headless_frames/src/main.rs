// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Headless frame loop that exercises the handoff protocol end to end.
//!
//! Runs a session against the in-memory doubles from
//! [`xrbridge_core::testing`]: a scripted compositor that hides a few frames,
//! a recording present device, and fake export/import. Every frame the
//! render side clears each shared image and hands it to the layers. Events
//! go to a [`PrettyPrintSink`], a [`RecorderSink`], and a [`ProtocolAudit`];
//! the recording is exported as a Chrome trace at the end.
//!
//! ```text
//! headless_frames [config.json] [trace.json]
//! ```
//!
//! Logging follows `RUST_LOG` (default `info`).

use std::fs::File;
use std::io::{BufReader, BufWriter};

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use xrbridge_core::api::{Format, Present, Render};
use xrbridge_core::composition::Extent;
use xrbridge_core::config::SessionConfig;
use xrbridge_core::device::{ClearValue, InteropCaps, SurfaceDesc};
use xrbridge_core::error::fatal;
use xrbridge_core::frame::FrameStats;
use xrbridge_core::handle::ResourceId;
use xrbridge_core::resource::{Handoff, ResourceStore};
use xrbridge_core::testing::{
    FakeBootstrap, FakeExporter, FakeImporter, RecordingDevice, RecordingStream,
    ScriptedCompositor,
};
use xrbridge_core::trace::{
    FrameSummary, FrameWaitEvent, HandoffEvent, LayerTransitionEvent, SubmitEvent,
    SwapchainEvent, TraceSink, Tracer,
};
use xrbridge_core::view::{Eye, PerEye};
use xrbridge_core::FrameOrchestrator;
use xrbridge_debug::pretty::PrettyPrintSink;
use xrbridge_debug::recorder::RecorderSink;
use xrbridge_sync_harness::ProtocolAudit;

const FRAME_COUNT: u64 = 90;
/// Frames (1-based) the compositor does not display, as when the headset is
/// taken off for a moment.
const HIDDEN_FRAMES: std::ops::RangeInclusive<u64> = 30..=33;
const EYE_EXTENT: Extent = Extent::new(1832, 1920);
const GAME_EXTENT: Extent = Extent::new(1920, 1080);

type Orchestrator = FrameOrchestrator<ScriptedCompositor, RecordingDevice>;

/// Forwards every event to all three sinks.
#[derive(Debug)]
struct Sinks {
    pretty: PrettyPrintSink,
    recorder: RecorderSink,
    audit: ProtocolAudit,
}

impl TraceSink for Sinks {
    fn on_frame_wait(&mut self, e: &FrameWaitEvent) {
        self.pretty.on_frame_wait(e);
        self.recorder.on_frame_wait(e);
        self.audit.on_frame_wait(e);
    }

    fn on_layer_transition(&mut self, e: &LayerTransitionEvent) {
        self.pretty.on_layer_transition(e);
        self.recorder.on_layer_transition(e);
        self.audit.on_layer_transition(e);
    }

    fn on_handoff(&mut self, e: &HandoffEvent) {
        self.pretty.on_handoff(e);
        self.recorder.on_handoff(e);
        self.audit.on_handoff(e);
    }

    fn on_swapchain(&mut self, e: &SwapchainEvent) {
        self.pretty.on_swapchain(e);
        self.recorder.on_swapchain(e);
        self.audit.on_swapchain(e);
    }

    fn on_submit(&mut self, e: &SubmitEvent) {
        self.pretty.on_submit(e);
        self.recorder.on_submit(e);
        self.audit.on_submit(e);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.pretty.on_frame_summary(s);
        self.recorder.on_frame_summary(s);
        self.audit.on_frame_summary(s);
    }
}

/// The game's shared images.
struct Shared {
    color: PerEye<ResourceId>,
    depth: PerEye<ResourceId>,
    overlay: Option<ResourceId>,
}

fn load_config(path: &str) -> anyhow::Result<SessionConfig> {
    let file = File::open(path).with_context(|| format!("opening {path}"))?;
    serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parsing {path}"))
}

fn import_shared(o: &mut Orchestrator) -> xrbridge_core::Result<Shared> {
    let formats = o.config().formats;
    let overlay_enabled = o.config().overlay.enabled;
    let mut exporter = FakeExporter::default();
    let mut importer = FakeImporter::new(InteropCaps::ALL);
    let mut stream = RecordingStream::<Render>::new("ImportShared");
    let mut import = |o: &mut Orchestrator, format: Format| {
        o.import_resource(
            &SurfaceDesc {
                extent: GAME_EXTENT,
                render_format: format,
                present_format: format,
            },
            &mut exporter,
            &mut importer,
            &mut stream,
        )
    };
    let color = PerEye::try_from_fn(|_| import(o, formats.color))?;
    let depth = PerEye::try_from_fn(|_| import(o, formats.depth))?;
    let overlay = if overlay_enabled {
        Some(import(o, formats.color)?)
    } else {
        None
    };
    tracing::info!(images = o.resources().len(), "imported shared images");
    Ok(Shared {
        color,
        depth,
        overlay,
    })
}

/// One render-side write: wait for the present side, clear, signal.
fn render_into(
    store: &mut ResourceStore,
    stream: &mut RecordingStream<Render>,
    id: ResourceId,
    value: ClearValue,
    tracer: &mut Tracer<'_>,
) -> xrbridge_core::Result<Handoff<Present>> {
    let token = store.take_parked(id)?;
    let access = store.wait_before_write(stream, token, tracer)?;
    store.get_mut(id)?.clear(&access, stream, value)?;
    Ok(store.signal_after_write(stream, access, tracer)?)
}

fn render_frame(
    o: &mut Orchestrator,
    shared: &Shared,
    tracer: &mut Tracer<'_>,
) -> xrbridge_core::Result<()> {
    let mut stream = RecordingStream::<Render>::new("RenderFrame");
    let shade = (o.frame_index() % 60) as f32 / 60.0;
    for eye in Eye::BOTH {
        let color = ClearValue::Color([shade, 0.2, 0.4, 1.0]);
        let id = *shared.color.get(eye);
        let token = render_into(o.resources_mut(), &mut stream, id, color, tracer)?;
        if let Some(stereo) = o.stereo_mut() {
            stereo.add_texture(eye, token, tracer)?;
        }
        let depth = ClearValue::Depth(1.0);
        let id = *shared.depth.get(eye);
        let token = render_into(o.resources_mut(), &mut stream, id, depth, tracer)?;
        if let Some(stereo) = o.stereo_mut() {
            stereo.add_depth_texture(eye, token, tracer)?;
        }
    }
    if let Some(id) = shared.overlay {
        let hud = ClearValue::Color([0.0, 0.0, 0.0, 0.5]);
        let token = render_into(o.resources_mut(), &mut stream, id, hud, tracer)?;
        if let Some(overlay) = o.overlay_mut() {
            overlay.add_texture(token, tracer)?;
        }
    }
    tracing::trace!(commands = stream.cmds.len(), "render commands recorded");
    Ok(())
}

fn run(config: SessionConfig, tracer: &mut Tracer<'_>) -> xrbridge_core::Result<FrameStats> {
    let script: Vec<bool> = (1..=FRAME_COUNT)
        .map(|frame| !HIDDEN_FRAMES.contains(&frame))
        .collect();
    let compositor = ScriptedCompositor::new(EYE_EXTENT).with_should_render(&script);
    let mut o = FrameOrchestrator::new(
        compositor,
        RecordingDevice::default(),
        &FakeBootstrap::new(InteropCaps::ALL),
        config,
    )?;
    let shared = import_shared(&mut o)?;

    for _ in 0..FRAME_COUNT {
        o.start_frame(tracer)?;
        render_frame(&mut o, &shared, tracer)?;
        o.end_frame(tracer)?;
    }
    o.shutdown()?;
    tracing::info!(
        present_submissions = o.device().submitted.len(),
        frames_closed = o.compositor().submitted.len(),
        "frame loop finished"
    );
    Ok(o.stats())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => load_config(&path)?,
        None => SessionConfig::default(),
    };
    let trace_path = args.next().unwrap_or_else(|| "xrbridge-trace.json".into());

    let mut sinks = Sinks {
        pretty: PrettyPrintSink::stderr().without_handoffs(),
        recorder: RecorderSink::new(),
        audit: ProtocolAudit::new(),
    };
    let stats = {
        let mut tracer = Tracer::new(&mut sinks);
        match run(config, &mut tracer) {
            Ok(stats) => stats,
            Err(err) => fatal(&err),
        }
    };

    let report = sinks.audit.report();
    tracing::info!(
        frames = stats.frames_started,
        displayed = stats.frames_displayed,
        skipped = stats.frames_skipped,
        layers = stats.layers_submitted,
        "session stats"
    );
    tracing::info!(
        grade = report.grade.as_str(),
        handoffs = report.handoffs,
        violations = report.violations,
        "protocol audit"
    );
    for violation in sinks.audit.violations() {
        tracing::warn!("{violation}");
    }
    println!("handoffs/frame {}", sinks.audit.sparkline_ascii(10));

    let file = File::create(&trace_path).with_context(|| format!("creating {trace_path}"))?;
    let mut writer = BufWriter::new(file);
    xrbridge_debug::chrome::export(sinks.recorder.as_bytes(), &mut writer)
        .context("writing Chrome trace")?;
    println!("Wrote {trace_path} ({FRAME_COUNT} frames, grade {})", report.grade.as_str());
    Ok(())
}
