// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opaque native handles and resource identity.
//!
//! The core never dereferences a native object. Backends store their raw
//! pointers or API handles as `u64` and convert back at the boundary.

use core::fmt;

/// A native image object (`VkImage`, `ID3D12Resource*`, ...).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeImage(pub u64);

impl NativeImage {
    /// The null image.
    pub const NULL: Self = Self(0);

    /// Returns the raw handle value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns `true` for the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for NativeImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeImage({:#x})", self.0)
    }
}

/// A native timeline synchronization object (timeline `VkSemaphore`,
/// `ID3D12Fence*`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncHandle(pub u64);

impl SyncHandle {
    /// Returns the raw handle value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncHandle({:#x})", self.0)
    }
}

/// An OS-level shareable handle (an NT `HANDLE` on Windows).
///
/// Used once, at import time, to open an object created by one API in the
/// other.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OsHandle(pub u64);

impl OsHandle {
    /// Returns the raw handle value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for OsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OsHandle({:#x})", self.0)
    }
}

/// A compositor swapchain (`XrSwapchain`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapchainHandle(pub u64);

impl fmt::Debug for SwapchainHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwapchainHandle({:#x})", self.0)
    }
}

/// A handle to a shared resource in a
/// [`ResourceStore`](crate::resource::ResourceStore).
///
/// Contains both a slot index and a generation counter so that stale handles
/// can be detected after a resource is destroyed and the slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

impl ResourceId {
    /// Builds an id from raw parts. Only useful for decoding recordings.
    #[inline]
    #[must_use]
    pub const fn from_raw(idx: u32, generation: u32) -> Self {
        Self { idx, generation }
    }

    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({}@gen{})", self.idx, self.generation)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@gen{}", self.idx, self.generation)
    }
}
