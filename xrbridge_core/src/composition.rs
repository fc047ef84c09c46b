// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Composition layer descriptions handed to the compositor.
//!
//! These are plain values. Backends translate them into native layer structs
//! at `end_frame`, resolving [`SwapchainHandle`]s to their own objects.

use glam::Vec2;

use crate::handle::SwapchainHandle;
use crate::view::{Fov, PerEye, Pose};

/// A size in texels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent {
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl Extent {
    /// Creates an extent.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width divided by height. Zero for an empty extent.
    #[must_use]
    pub fn aspect_ratio(self) -> f32 {
        if self.is_empty() {
            0.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// An integer rectangle within a swapchain image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Size.
    pub extent: Extent,
}

impl Rect {
    /// A rectangle covering `extent` from the origin.
    #[must_use]
    pub const fn full(extent: Extent) -> Self {
        Self { x: 0, y: 0, extent }
    }
}

/// A region of one swapchain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubImage {
    /// Swapchain the region belongs to.
    pub swapchain: SwapchainHandle,
    /// Region in texels.
    pub rect: Rect,
    /// Array layer.
    pub array_index: u32,
}

/// Depth information attached to a projection view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthInfo {
    /// Depth swapchain region.
    pub sub_image: SubImage,
    /// Minimum depth value.
    pub min_depth: f32,
    /// Maximum depth value.
    pub max_depth: f32,
    /// Near plane distance in meters.
    pub near_z: f32,
    /// Far plane distance in meters.
    pub far_z: f32,
}

/// One eye of a projection layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionView {
    /// Eye pose the image was rendered from.
    pub pose: Pose,
    /// Eye field of view.
    pub fov: Fov,
    /// Color region.
    pub sub_image: SubImage,
    /// Depth region, when depth is submitted.
    pub depth: Option<DepthInfo>,
}

/// A stereo projection layer in stage space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionLayer {
    /// Per-eye views, left first.
    pub views: PerEye<ProjectionView>,
}

/// Which eyes see a quad.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EyeVisibility {
    /// Both eyes.
    Both,
    /// Left eye only.
    Left,
    /// Right eye only.
    Right,
}

/// A flat quad in stage space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadLayer {
    /// Quad center and orientation.
    pub pose: Pose,
    /// Quad size in meters.
    pub size: Vec2,
    /// Color region.
    pub sub_image: SubImage,
    /// Blend with the texture's alpha channel.
    pub blend_source_alpha: bool,
    /// Which eyes see the quad.
    pub eye_visibility: EyeVisibility,
}

/// A layer submitted at the end of a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CompositionLayer {
    /// The stereo 3D view.
    Projection(ProjectionLayer),
    /// The flat 2D overlay.
    Quad(QuadLayer),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_of_empty_is_zero() {
        assert_eq!(Extent::new(0, 10).aspect_ratio(), 0.0, "empty extent");
        assert_eq!(Extent::new(200, 100).aspect_ratio(), 2.0, "wide");
    }

    #[test]
    fn full_rect_starts_at_origin() {
        let r = Rect::full(Extent::new(1832, 1920));
        assert_eq!((r.x, r.y), (0, 0), "origin");
        assert_eq!(r.extent, Extent::new(1832, 1920), "extent kept");
    }
}
