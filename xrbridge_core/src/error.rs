// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.
//!
//! Nothing in this crate retries. Every [`Error`] is fatal to the session;
//! the library returns it and the frame loop decides how to die (usually via
//! [`fatal`]). The [`ErrorClass`] tells a caller which part of the system
//! failed.

use core::fmt;

use thiserror::Error;

use crate::api::{ApiId, Format};
use crate::handle::{ResourceId, SwapchainHandle};
use crate::layer::{LayerKind, LayerOp, LayerStatus};
use crate::view::Eye;

/// Misuse of the cross-API handoff protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The token names a resource that no longer exists.
    #[error("resource {0} does not exist or was destroyed")]
    UnknownResource(ResourceId),
    /// The token value does not match the resource counter.
    #[error("{api} side of resource {id} expected counter {expected}, found {actual}")]
    OutOfOrder {
        /// Resource being waited on.
        id: ResourceId,
        /// API that tried to wait.
        api: ApiId,
        /// Value carried by the token.
        expected: u64,
        /// Current counter value.
        actual: u64,
    },
    /// The 64-bit counter would wrap.
    #[error("synchronization counter of resource {0} is exhausted")]
    CounterExhausted(ResourceId),
    /// A clear was issued with a value of the wrong kind for the format.
    #[error("resource {id} has format {format:?} and cannot take a {value} clear")]
    ClearKindMismatch {
        /// Resource being cleared.
        id: ResourceId,
        /// Its format on the clearing side.
        format: Format,
        /// `"color"` or `"depth"`.
        value: &'static str,
    },
    /// No parked token exists for the resource.
    #[error("no handoff is parked for resource {0}; it is still owned elsewhere")]
    NotParked(ResourceId),
}

/// A layer operation was called in the wrong status.
#[derive(Debug, Error)]
pub enum LayerError {
    /// The status machine rejected the operation.
    #[error("{layer} layer cannot {op} while {status}")]
    InvalidTransition {
        /// Which layer.
        layer: LayerKind,
        /// What was attempted.
        op: LayerOp,
        /// Status at the time of the call.
        status: LayerStatus,
    },
    /// Only one eye of a stereo slot was bound.
    #[error("{slot} textures must be bound for both eyes or neither; only {bound} is bound")]
    HalfBound {
        /// `"color"` or `"depth"`.
        slot: &'static str,
        /// The eye that was bound.
        bound: Eye,
    },
    /// The same eye was rendered twice in one frame.
    #[error("{0} eye was already rendered this frame")]
    EyeAlreadyRendered(Eye),
    /// An eye was never rendered before finishing.
    #[error("{0} eye was not rendered before finishing the frame")]
    EyeNotRendered(Eye),
    /// The overlay was never rendered before finishing.
    #[error("{0} layer was not rendered before finishing the frame")]
    NotRendered(LayerKind),
    /// A layer reached rendering without a color texture.
    #[error("{0} layer has no color texture bound")]
    MissingTexture(LayerKind),
    /// A slot already holds a handoff for this frame.
    #[error("{slot} slot for the {eye} eye is already bound this frame")]
    SlotOccupied {
        /// `"color"` or `"depth"`.
        slot: &'static str,
        /// The eye whose slot was bound twice.
        eye: Eye,
    },
}

/// A swapchain operation was called out of order.
#[derive(Debug, Error)]
pub enum SwapchainError {
    /// `prepare_rendering` while an image is still acquired.
    #[error("swapchain {0:?} still has an acquired image; finish the previous frame first")]
    AlreadyAcquired(SwapchainHandle),
    /// `start_rendering` without an acquired image.
    #[error("swapchain {0:?} has no acquired image")]
    NotAcquired(SwapchainHandle),
    /// An accessor or `finish_rendering` outside the rendering window.
    #[error("swapchain {0:?} is not rendering")]
    NotRendering(SwapchainHandle),
}

/// A device capability the interop path depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Importing a present-API image as render-API memory.
    ExternalMemory,
    /// Importing a present-API fence as a render-API semaphore.
    ExternalSemaphore,
    /// Timeline semaphores on the render API.
    TimelineSemaphore,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ExternalMemory => "external memory import",
            Self::ExternalSemaphore => "external semaphore import",
            Self::TimelineSemaphore => "timeline semaphores",
        })
    }
}

/// The device lacks something the interop path requires.
#[derive(Debug, Error)]
#[error("device does not support {missing}")]
pub struct CapabilityError {
    /// The first missing capability found.
    pub missing: Capability,
}

/// A call into the XR compositor failed.
#[derive(Debug, Error)]
#[error("compositor call {call} failed: {message}")]
pub struct CompositorError {
    /// Name of the failing call.
    pub call: &'static str,
    /// Backend-provided description.
    pub message: String,
}

impl CompositorError {
    /// Creates an error for the named call.
    #[must_use]
    pub fn new(call: &'static str, message: impl fmt::Display) -> Self {
        Self {
            call,
            message: message.to_string(),
        }
    }
}

/// A native graphics call failed.
#[derive(Debug, Error)]
#[error("device call {call} failed: {message}")]
pub struct DeviceError {
    /// Name of the failing call.
    pub call: &'static str,
    /// Backend-provided description.
    pub message: String,
}

impl DeviceError {
    /// Creates an error for the named call.
    #[must_use]
    pub fn new(call: &'static str, message: impl fmt::Display) -> Self {
        Self {
            call,
            message: message.to_string(),
        }
    }
}

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The caller broke a sequencing rule.
    Precondition,
    /// The device cannot do interop at all.
    Capability,
    /// The XR runtime reported a failure.
    Compositor,
    /// A native graphics call failed.
    Device,
}

/// Any failure in the core.
#[derive(Debug, Error)]
pub enum Error {
    /// See [`ProtocolError`].
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// See [`LayerError`].
    #[error(transparent)]
    Layer(#[from] LayerError),
    /// See [`SwapchainError`].
    #[error(transparent)]
    Swapchain(#[from] SwapchainError),
    /// See [`CapabilityError`].
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    /// See [`CompositorError`].
    #[error(transparent)]
    Compositor(#[from] CompositorError),
    /// See [`DeviceError`].
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl Error {
    /// Returns the coarse class of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Protocol(_) | Self::Layer(_) | Self::Swapchain(_) => ErrorClass::Precondition,
            Self::Capability(_) => ErrorClass::Capability,
            Self::Compositor(_) => ErrorClass::Compositor,
            Self::Device(_) => ErrorClass::Device,
        }
    }
}

/// Shorthand for results in this crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Logs `err` and aborts the process.
///
/// Frame loops call this on any error from the orchestrator. There is no
/// partial recovery: a half-finished frame leaves swapchain images acquired
/// and counters in flight.
pub fn fatal(err: &Error) -> ! {
    tracing::error!(class = ?err.class(), "fatal: {err}");
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_follow_variant() {
        let e = Error::from(LayerError::MissingTexture(LayerKind::Overlay));
        assert_eq!(e.class(), ErrorClass::Precondition, "layer misuse");
        let e = Error::from(CapabilityError {
            missing: Capability::ExternalMemory,
        });
        assert_eq!(e.class(), ErrorClass::Capability, "capability");
        let e = Error::from(CompositorError::new("xrEndFrame", "ERROR_SESSION_LOST"));
        assert_eq!(e.class(), ErrorClass::Compositor, "compositor");
    }

    #[test]
    fn messages_name_the_failure() {
        let e = Error::from(CapabilityError {
            missing: Capability::ExternalSemaphore,
        });
        assert_eq!(
            e.to_string(),
            "device does not support external semaphore import",
            "capability message"
        );
        let e = Error::from(LayerError::InvalidTransition {
            layer: LayerKind::Stereo,
            op: LayerOp::StartRendering,
            status: LayerStatus::Preparing,
        });
        assert_eq!(
            e.to_string(),
            "stereo layer cannot start rendering while preparing",
            "transition message"
        );
    }
}
