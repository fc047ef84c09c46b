// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The two graphics APIs that share images.
//!
//! Every [`SharedResource`](crate::resource::SharedResource) lives in two API
//! contexts at once. The *render* API is where the application draws the
//! scene and the HUD; the *present* API is the one the XR compositor consumes.
//! The two sides track their own access state independently because the state
//! spaces differ (image layouts versus resource states).
//!
//! [`GraphicsApi`] is sealed and implemented only by the uninhabited markers
//! [`Render`] and [`Present`]. Each marker names its partner through
//! [`GraphicsApi::Other`], which is what lets a
//! [`Handoff`](crate::resource::Handoff) produced on one side be consumed only
//! on the other.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::resource::{ApiSide, SharedResource};

mod sealed {
    pub trait Sealed {}
}

/// Identifies one of the two graphics API contexts at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApiId {
    /// The API the application renders with (Vulkan in the reference
    /// backends).
    Render,
    /// The API the XR compositor consumes (Direct3D 12 in the reference
    /// backends).
    Present,
}

impl ApiId {
    /// Returns the opposite API.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Render => Self::Present,
            Self::Present => Self::Render,
        }
    }

    /// Short lowercase name for log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::Present => "present",
        }
    }
}

impl fmt::Display for ApiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-level marker for one side of a shared image.
pub trait GraphicsApi: sealed::Sealed + fmt::Debug + 'static {
    /// The partner API that consumes what this API signals.
    type Other: GraphicsApi<Other = Self>;

    /// Per-API access state tracked on the shared image.
    type State: AccessState;

    /// Runtime identity of this API.
    const ID: ApiId;

    /// Returns this API's view of a shared resource.
    #[doc(hidden)]
    fn side(resource: &SharedResource) -> &ApiSide<Self::State>;

    /// Returns this API's mutable view of a shared resource.
    #[doc(hidden)]
    fn side_mut(resource: &mut SharedResource) -> &mut ApiSide<Self::State>;
}

/// Marker for the render API.
#[derive(Debug)]
pub enum Render {}

/// Marker for the present API.
#[derive(Debug)]
pub enum Present {}

impl sealed::Sealed for Render {}
impl sealed::Sealed for Present {}

impl GraphicsApi for Render {
    type Other = Present;
    type State = ImageLayout;
    const ID: ApiId = ApiId::Render;

    fn side(resource: &SharedResource) -> &ApiSide<ImageLayout> {
        &resource.render
    }

    fn side_mut(resource: &mut SharedResource) -> &mut ApiSide<ImageLayout> {
        &mut resource.render
    }
}

impl GraphicsApi for Present {
    type Other = Render;
    type State = ResourceState;
    const ID: ApiId = ApiId::Present;

    fn side(resource: &SharedResource) -> &ApiSide<ResourceState> {
        &resource.present
    }

    fn side_mut(resource: &mut SharedResource) -> &mut ApiSide<ResourceState> {
        &mut resource.present
    }
}

// ---------------------------------------------------------------------------
// Access states
// ---------------------------------------------------------------------------

/// Behaviour shared by the per-API access state enums.
pub trait AccessState: Copy + Eq + fmt::Debug {
    /// State required to read the image as a copy source.
    const COPY_SOURCE: Self;
    /// State required to write the image as a copy destination.
    const COPY_DEST: Self;
    /// State the image is left in right after import.
    const INITIAL: Self;

    /// Returns the state a clear of `kind` must transition to, or `None` if
    /// the current state already permits the clear.
    fn clear_target(self, kind: FormatKind) -> Option<Self>;
}

/// Render-side image layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// Contents undefined; the only layout before first use.
    Undefined,
    /// Any access; the interop baseline.
    General,
    /// Copy source.
    TransferSrc,
    /// Copy destination or clear target.
    TransferDst,
    /// Sampled by shaders.
    ShaderRead,
    /// Bound as a color attachment.
    ColorAttachment,
    /// Bound as a depth attachment.
    DepthAttachment,
}

impl AccessState for ImageLayout {
    const COPY_SOURCE: Self = Self::TransferSrc;
    const COPY_DEST: Self = Self::TransferDst;
    const INITIAL: Self = Self::General;

    fn clear_target(self, _kind: FormatKind) -> Option<Self> {
        match self {
            Self::General | Self::TransferDst => None,
            _ => Some(Self::General),
        }
    }
}

/// Present-side resource state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Shared baseline state.
    Common,
    /// Copy destination.
    CopyDest,
    /// Copy source.
    CopySource,
    /// Sampled by pixel shaders.
    PixelShaderResource,
    /// Bound as a render target.
    RenderTarget,
    /// Bound as a writable depth buffer.
    DepthWrite,
}

impl AccessState for ResourceState {
    const COPY_SOURCE: Self = Self::CopySource;
    const COPY_DEST: Self = Self::CopyDest;
    const INITIAL: Self = Self::Common;

    fn clear_target(self, kind: FormatKind) -> Option<Self> {
        let wanted = match kind {
            FormatKind::Color => Self::RenderTarget,
            FormatKind::Depth => Self::DepthWrite,
        };
        (self != wanted).then_some(wanted)
    }
}

// ---------------------------------------------------------------------------
// Formats
// ---------------------------------------------------------------------------

/// Pixel formats used by shared images and swapchains.
///
/// Backends map these onto their native format enums.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    /// 8-bit RGBA, linear.
    Rgba8Unorm,
    /// 8-bit RGBA, sRGB encoded.
    Rgba8Srgb,
    /// 8-bit BGRA, sRGB encoded.
    Bgra8Srgb,
    /// 32-bit float depth.
    D32Float,
    /// 32-bit float single channel; how depth images are sampled.
    R32Float,
}

/// Whether a format holds color or depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatKind {
    /// Color data.
    Color,
    /// Depth data.
    Depth,
}

impl Format {
    /// Returns whether this format is color or depth.
    #[must_use]
    pub const fn kind(self) -> FormatKind {
        match self {
            Self::D32Float => FormatKind::Depth,
            Self::Rgba8Unorm | Self::Rgba8Srgb | Self::Bgra8Srgb | Self::R32Float => {
                FormatKind::Color
            }
        }
    }

    /// Returns the format a shader samples this image through.
    ///
    /// Depth images are read as single-channel floats.
    #[must_use]
    pub const fn sampled_view(self) -> Self {
        match self {
            Self::D32Float => Self::R32Float,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_other_is_involutive() {
        assert_eq!(ApiId::Render.other(), ApiId::Present, "render pairs with present");
        assert_eq!(ApiId::Render.other().other(), ApiId::Render, "other of other");
    }

    #[test]
    fn render_clear_keeps_writable_layouts() {
        assert_eq!(ImageLayout::General.clear_target(FormatKind::Color), None, "general");
        assert_eq!(ImageLayout::TransferDst.clear_target(FormatKind::Depth), None, "dst");
        assert_eq!(
            ImageLayout::ShaderRead.clear_target(FormatKind::Color),
            Some(ImageLayout::General),
            "shader read must move to general"
        );
    }

    #[test]
    fn present_clear_depends_on_kind() {
        assert_eq!(
            ResourceState::Common.clear_target(FormatKind::Depth),
            Some(ResourceState::DepthWrite),
            "depth clears need depth write"
        );
        assert_eq!(
            ResourceState::RenderTarget.clear_target(FormatKind::Color),
            None,
            "already a render target"
        );
    }

    #[test]
    fn depth_samples_as_r32() {
        assert_eq!(Format::D32Float.sampled_view(), Format::R32Float, "depth view");
        assert_eq!(Format::Rgba8Srgb.sampled_view(), Format::Rgba8Srgb, "color view");
        assert_eq!(Format::D32Float.kind(), FormatKind::Depth, "depth kind");
    }
}
