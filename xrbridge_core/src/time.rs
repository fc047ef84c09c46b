// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositor time.
//!
//! [`XrTime`] is a point on the XR runtime's clock in nanoseconds, the same
//! unit as `XrTime`. [`XrDuration`] is a signed span on that clock.
//! Predicted display times come from the compositor and are handed back
//! unchanged when the frame ends.

use core::fmt;
use core::ops::{Add, Sub};

/// A point on the compositor clock, in nanoseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct XrTime(pub i64);

impl XrTime {
    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub const fn nanos(self) -> i64 {
        self.0
    }

    /// Returns this time in microseconds, for trace output.
    #[inline]
    #[must_use]
    pub fn as_micros_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// Returns the span between `self` and an earlier time, or zero if
    /// `earlier` is after `self`.
    #[inline]
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> XrDuration {
        let d = self.0.saturating_sub(earlier.0);
        XrDuration(if d < 0 { 0 } else { d })
    }

    /// Checked addition of a duration.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, duration: XrDuration) -> Option<Self> {
        match self.0.checked_add(duration.0) {
            Some(t) => Some(Self(t)),
            None => None,
        }
    }
}

impl Add<XrDuration> for XrTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: XrDuration) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for XrTime {
    type Output = XrDuration;

    #[inline]
    fn sub(self, rhs: Self) -> XrDuration {
        XrDuration(self.0 - rhs.0)
    }
}

impl fmt::Debug for XrTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "XrTime({})", self.0)
    }
}

/// A span on the compositor clock, in nanoseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct XrDuration(pub i64);

impl XrDuration {
    /// Wait forever.
    pub const INFINITE: Self = Self(i64::MAX);

    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub const fn nanos(self) -> i64 {
        self.0
    }

    /// Creates a duration from unsigned nanoseconds, saturating at
    /// [`INFINITE`](Self::INFINITE).
    #[inline]
    #[must_use]
    pub const fn from_nanos_u64(nanos: u64) -> Self {
        if nanos > i64::MAX as u64 {
            Self::INFINITE
        } else {
            Self(nanos as i64)
        }
    }
}

impl fmt::Debug for XrDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INFINITE {
            f.write_str("XrDuration(INFINITE)")
        } else {
            write!(f, "XrDuration({})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_since_clamps_to_zero() {
        let a = XrTime(100);
        let b = XrTime(250);
        assert_eq!(b.saturating_duration_since(a), XrDuration(150), "forward");
        assert_eq!(a.saturating_duration_since(b), XrDuration(0), "backward clamps");
    }

    #[test]
    fn from_nanos_saturates() {
        assert_eq!(XrDuration::from_nanos_u64(u64::MAX), XrDuration::INFINITE, "saturates");
        assert_eq!(XrDuration::from_nanos_u64(5), XrDuration(5), "small values pass");
    }

    #[test]
    fn add_and_sub() {
        let t = XrTime(1_000) + XrDuration(16_666_667);
        assert_eq!(t, XrTime(16_667_667), "add");
        assert_eq!(t - XrTime(1_000), XrDuration(16_666_667), "sub");
        assert_eq!(XrTime(i64::MAX).checked_add(XrDuration(1)), None, "overflow");
    }
}
