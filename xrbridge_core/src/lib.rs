// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cross-API shared image handoff and frame orchestration for XR compositors.
//!
//! `xrbridge_core` lets an application render with one graphics API while an
//! XR compositor consumes a different one. Images are created on the present
//! side, imported on the render side, and passed back and forth under a
//! single monotonic timeline counter per image.
//!
//! # Architecture
//!
//! ```text
//!   ResourceStore::import()
//!       │  (present creates, render imports, counter = 0)
//!       ▼
//!   Handoff<Render> ──► wait N ── draw ── signal N+1 ──► Handoff<Present>
//!                                                            │
//!                 ┌──────────────────────────────────────────┘
//!                 ▼
//!   Layer::add_texture() ──► FrameOrchestrator::end_frame()
//!                                 │  wait N+1 ── sample ── signal N+2
//!                                 ▼
//!   CompositionLayer ──► Compositor::end_frame()
//!                                 │
//!                 ┌───────────────┘
//!                 ▼
//!   Handoff<Render> parked in the store for the next frame
//! ```
//!
//! **[`api`]**: the sealed [`GraphicsApi`](api::GraphicsApi) markers and the
//! per-API access states.
//!
//! **[`resource`]**: shared images, move-only handoff tokens, and the
//! generational [`ResourceStore`](resource::ResourceStore) that enforces the
//! counter protocol.
//!
//! **[`swapchain`]**: acquire, wait and release around compositor image rings.
//!
//! **[`layer`]**: the stereo projection and overlay quad layers and their
//! shared status machine.
//!
//! **[`frame`]**: [`FrameOrchestrator`](frame::FrameOrchestrator), which
//! drives one compositor frame from `wait_frame` to `end_frame`.
//!
//! **[`device`]** and **[`compositor`]**: the traits graphics and XR backends
//! implement.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! frame-loop instrumentation, with a zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `testing` (disabled by default): Exposes the in-memory doubles in
//!   `testing` to downstream crates.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod api;
pub mod composition;
pub mod compositor;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod handle;
pub mod layer;
pub mod resource;
pub mod swapchain;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod time;
pub mod trace;
pub mod view;

pub use error::{Error, ErrorClass, Result};
pub use frame::FrameOrchestrator;
pub use resource::{Handoff, ResourceStore, WriteAccess};
