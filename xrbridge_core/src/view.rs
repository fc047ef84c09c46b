// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Eyes, poses, and the head-tracking collaborator.
//!
//! Eye identity is always an explicit [`Eye`] argument. Per-eye data that must
//! exist for both eyes is a [`PerEye`]; per-eye bindings that are either
//! complete or absent are a [`StereoPair`].

use core::fmt;

use glam::{Quat, Vec3};

use crate::error::CompositorError;
use crate::time::XrTime;

/// One of the two eyes of a stereo view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Eye {
    /// Left eye; view index 0.
    Left,
    /// Right eye; view index 1.
    Right,
}

impl Eye {
    /// Both eyes in view-index order.
    pub const BOTH: [Self; 2] = [Self::Left, Self::Right];

    /// Returns the compositor view index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

/// A value present for both eyes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerEye<T> {
    /// Left-eye value.
    pub left: T,
    /// Right-eye value.
    pub right: T,
}

impl<T> PerEye<T> {
    /// Builds a pair by calling `f` for each eye, left first.
    pub fn from_fn(mut f: impl FnMut(Eye) -> T) -> Self {
        Self {
            left: f(Eye::Left),
            right: f(Eye::Right),
        }
    }

    /// Like [`from_fn`](Self::from_fn), stopping at the first error.
    pub fn try_from_fn<E>(mut f: impl FnMut(Eye) -> Result<T, E>) -> Result<Self, E> {
        let left = f(Eye::Left)?;
        let right = f(Eye::Right)?;
        Ok(Self { left, right })
    }

    /// Returns the value for `eye`.
    #[inline]
    pub const fn get(&self, eye: Eye) -> &T {
        match eye {
            Eye::Left => &self.left,
            Eye::Right => &self.right,
        }
    }

    /// Returns the value for `eye` mutably.
    #[inline]
    pub fn get_mut(&mut self, eye: Eye) -> &mut T {
        match eye {
            Eye::Left => &mut self.left,
            Eye::Right => &mut self.right,
        }
    }

    /// Applies `f` to both values.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> PerEye<U> {
        PerEye {
            left: f(self.left),
            right: f(self.right),
        }
    }
}

/// A stereo binding that is either fully empty or fully populated.
///
/// Built from two optional per-eye slots with [`StereoPair::from_slots`],
/// which refuses the half-bound case.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum StereoPair<T> {
    /// Neither eye is bound.
    #[default]
    Empty,
    /// Both eyes are bound.
    Full(PerEye<T>),
}

impl<T> StereoPair<T> {
    /// Combines two slots, or returns the lone bound eye if only one is set.
    ///
    /// The slots are only taken on success.
    pub fn from_slots(left: &mut Option<T>, right: &mut Option<T>) -> Result<Self, Eye> {
        match (left.take(), right.take()) {
            (None, None) => Ok(Self::Empty),
            (Some(l), Some(r)) => Ok(Self::Full(PerEye { left: l, right: r })),
            (Some(l), None) => {
                *left = Some(l);
                Err(Eye::Left)
            }
            (None, Some(r)) => {
                *right = Some(r);
                Err(Eye::Right)
            }
        }
    }

    /// Returns `true` when both eyes are bound.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    /// Splits into per-eye options, each `Some` exactly when the pair is full.
    pub fn into_options(self) -> PerEye<Option<T>> {
        match self {
            Self::Empty => PerEye {
                left: None,
                right: None,
            },
            Self::Full(both) => both.map(Some),
        }
    }
}

/// A rigid transform in tracking space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    /// Position in meters.
    pub position: Vec3,
    /// Orientation.
    pub orientation: Quat,
}

impl Pose {
    /// The identity pose at the origin.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Field of view as four half-angles in radians.
///
/// Left and down are negative for a symmetric frustum.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Fov {
    /// Angle of the left edge.
    pub angle_left: f32,
    /// Angle of the right edge.
    pub angle_right: f32,
    /// Angle of the top edge.
    pub angle_up: f32,
    /// Angle of the bottom edge.
    pub angle_down: f32,
}

impl Fov {
    /// A symmetric field of view with the given half-angles.
    #[must_use]
    pub const fn symmetric(half_horizontal: f32, half_vertical: f32) -> Self {
        Self {
            angle_left: -half_horizontal,
            angle_right: half_horizontal,
            angle_up: half_vertical,
            angle_down: -half_vertical,
        }
    }
}

/// The predicted pose and field of view for one eye.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct View {
    /// Eye pose in stage space.
    pub pose: Pose,
    /// Eye field of view.
    pub fov: Fov,
}

/// Head-tracking collaborator.
///
/// Called once per eye per frame with the frame's predicted display time.
/// The camera transform that moves the in-game camera is not part of this
/// crate; it reads the same views through
/// [`FrameOrchestrator::views`](crate::frame::FrameOrchestrator::views).
pub trait ViewProvider {
    /// Locates `eye` at `display_time` in stage space.
    fn locate_eye(&mut self, eye: Eye, display_time: XrTime) -> Result<View, CompositorError>;

    /// Locates the head at `display_time` in stage space.
    fn locate_head(&mut self, display_time: XrTime) -> Result<Pose, CompositorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_from_empty_slots() {
        let (mut l, mut r) = (None::<u8>, None::<u8>);
        assert_eq!(StereoPair::from_slots(&mut l, &mut r), Ok(StereoPair::Empty), "empty");
    }

    #[test]
    fn pair_rejects_half_bound_and_keeps_slot() {
        let (mut l, mut r) = (None, Some(7_u8));
        assert_eq!(StereoPair::from_slots(&mut l, &mut r), Err(Eye::Right), "right only");
        assert_eq!(r, Some(7), "rejected slot is left untouched");
    }

    #[test]
    fn pair_takes_full_slots() {
        let (mut l, mut r) = (Some(1_u8), Some(2_u8));
        let pair = StereoPair::from_slots(&mut l, &mut r);
        assert_eq!(
            pair,
            Ok(StereoPair::Full(PerEye { left: 1, right: 2 })),
            "full pair"
        );
        assert!(l.is_none() && r.is_none(), "slots are drained");
    }

    #[test]
    fn per_eye_indexing() {
        let mut p = PerEye { left: 0, right: 0 };
        *p.get_mut(Eye::Right) = 5;
        assert_eq!(*p.get(Eye::Right), 5, "right written");
        assert_eq!(Eye::Right.index(), 1, "right is view 1");
    }
}
