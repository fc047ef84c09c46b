// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;

use crate::error::LayerError;
use crate::trace::{LayerTransitionEvent, Tracer};

/// Where a layer is in its per-frame cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerStatus {
    /// Idle between frames.
    NotRendering,
    /// Swapchain images acquired, waiting for textures.
    Preparing,
    /// At least one texture bound.
    Binding,
    /// Bindings frozen, swapchain images are render targets.
    Rendering,
}

impl fmt::Display for LayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotRendering => "not rendering",
            Self::Preparing => "preparing",
            Self::Binding => "binding",
            Self::Rendering => "rendering",
        })
    }
}

/// The two layer variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Stereo projection layer.
    Stereo,
    /// Flat quad overlay.
    Overlay,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stereo => "stereo",
            Self::Overlay => "overlay",
        })
    }
}

/// Operations checked by the [`StatusMachine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerOp {
    /// Begin a frame.
    PrepareRendering,
    /// Bind a texture.
    AddTexture,
    /// Freeze bindings.
    StartRendering,
    /// Record the present draw. Does not change status.
    Render,
    /// Release swapchain images and end the frame.
    FinishRendering,
}

impl fmt::Display for LayerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PrepareRendering => "prepare rendering",
            Self::AddTexture => "add a texture",
            Self::StartRendering => "start rendering",
            Self::Render => "render",
            Self::FinishRendering => "finish rendering",
        })
    }
}

/// Status bookkeeping shared by both layer variants.
///
/// All status rules live in [`StatusMachine::target`]. Layers
/// [`check`](Self::check) an operation before doing any work and
/// [`advance`](Self::advance) once the work succeeded.
#[derive(Clone, Copy, Debug)]
pub struct StatusMachine {
    kind: LayerKind,
    status: LayerStatus,
    frame_index: u64,
}

impl StatusMachine {
    /// A machine in [`LayerStatus::NotRendering`].
    #[must_use]
    pub const fn new(kind: LayerKind) -> Self {
        Self {
            kind,
            status: LayerStatus::NotRendering,
            frame_index: 0,
        }
    }

    /// Which layer this machine belongs to.
    #[must_use]
    pub const fn kind(&self) -> LayerKind {
        self.kind
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> LayerStatus {
        self.status
    }

    /// The status `op` leads to from `status`, or `None` if it is not
    /// allowed there.
    ///
    /// The overlay has a single slot, so it only binds while preparing.
    #[must_use]
    pub const fn target(kind: LayerKind, op: LayerOp, status: LayerStatus) -> Option<LayerStatus> {
        match (op, status) {
            (LayerOp::PrepareRendering, LayerStatus::NotRendering) => Some(LayerStatus::Preparing),
            (LayerOp::AddTexture, LayerStatus::Preparing) => Some(LayerStatus::Binding),
            (LayerOp::AddTexture, LayerStatus::Binding) if matches!(kind, LayerKind::Stereo) => {
                Some(LayerStatus::Binding)
            }
            (LayerOp::StartRendering, LayerStatus::Binding) => Some(LayerStatus::Rendering),
            (LayerOp::Render, LayerStatus::Rendering) => Some(LayerStatus::Rendering),
            (LayerOp::FinishRendering, LayerStatus::Rendering) => Some(LayerStatus::NotRendering),
            _ => None,
        }
    }

    /// Checks `op` against the current status without changing it.
    pub fn check(&self, op: LayerOp) -> Result<LayerStatus, LayerError> {
        Self::target(self.kind, op, self.status).ok_or_else(|| {
            tracing::error!(
                layer = %self.kind,
                %op,
                status = %self.status,
                "layer operation out of order"
            );
            LayerError::InvalidTransition {
                layer: self.kind,
                op,
                status: self.status,
            }
        })
    }

    /// Applies `op`, emitting a transition event when the status changes.
    pub fn advance(&mut self, op: LayerOp, tracer: &mut Tracer<'_>) -> Result<(), LayerError> {
        let to = self.check(op)?;
        if to != self.status {
            tracing::trace!(layer = %self.kind, from = %self.status, %to, "layer status");
            tracer.layer_transition(&LayerTransitionEvent {
                frame_index: self.frame_index,
                layer: self.kind,
                from: self.status,
                to,
            });
            self.status = to;
        }
        Ok(())
    }

    /// Sets the frame index stamped on transition events.
    pub fn set_frame(&mut self, frame_index: u64) {
        self.frame_index = frame_index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LayerStatus; 4] = [
        LayerStatus::NotRendering,
        LayerStatus::Preparing,
        LayerStatus::Binding,
        LayerStatus::Rendering,
    ];

    #[test]
    fn add_texture_only_while_preparing_or_binding() {
        for status in ALL {
            let ok =
                StatusMachine::target(LayerKind::Stereo, LayerOp::AddTexture, status).is_some();
            assert_eq!(
                ok,
                matches!(status, LayerStatus::Preparing | LayerStatus::Binding),
                "stereo add_texture while {status}"
            );
        }
    }

    #[test]
    fn overlay_binds_once() {
        assert_eq!(
            StatusMachine::target(LayerKind::Overlay, LayerOp::AddTexture, LayerStatus::Preparing),
            Some(LayerStatus::Binding),
            "first bind"
        );
        assert_eq!(
            StatusMachine::target(LayerKind::Overlay, LayerOp::AddTexture, LayerStatus::Binding),
            None,
            "second bind rejected"
        );
    }

    #[test]
    fn start_rendering_only_from_binding() {
        for status in ALL {
            let ok = StatusMachine::target(LayerKind::Overlay, LayerOp::StartRendering, status)
                .is_some();
            assert_eq!(ok, status == LayerStatus::Binding, "start while {status}");
        }
    }

    #[test]
    fn rejected_op_leaves_status_alone() {
        let mut m = StatusMachine::new(LayerKind::Stereo);
        let mut tracer = Tracer::none();
        m.advance(LayerOp::PrepareRendering, &mut tracer).unwrap();
        let err = m.advance(LayerOp::PrepareRendering, &mut tracer).unwrap_err();
        assert!(
            matches!(
                err,
                LayerError::InvalidTransition {
                    op: LayerOp::PrepareRendering,
                    status: LayerStatus::Preparing,
                    ..
                }
            ),
            "double prepare: {err}"
        );
        assert_eq!(m.status(), LayerStatus::Preparing, "status unchanged");
    }
}
