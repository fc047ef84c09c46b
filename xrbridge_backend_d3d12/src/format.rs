// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Format and state mapping between xrbridge and D3D12.

use windows::Win32::Graphics::Direct3D12::{
    D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL, D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET,
    D3D12_RESOURCE_FLAG_ALLOW_SIMULTANEOUS_ACCESS, D3D12_RESOURCE_FLAGS,
    D3D12_RESOURCE_STATE_COMMON, D3D12_RESOURCE_STATE_COPY_DEST,
    D3D12_RESOURCE_STATE_COPY_SOURCE, D3D12_RESOURCE_STATE_DEPTH_WRITE,
    D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE, D3D12_RESOURCE_STATE_RENDER_TARGET,
    D3D12_RESOURCE_STATES,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_UNORM_SRGB, DXGI_FORMAT_D32_FLOAT,
    DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_FORMAT_R8G8B8A8_UNORM_SRGB, DXGI_FORMAT_R32_FLOAT,
    DXGI_FORMAT_R32_TYPELESS,
};
use xrbridge_core::api::{Format, FormatKind, ResourceState};

/// The DXGI format views of `format` are created with.
#[must_use]
pub const fn dxgi_format(format: Format) -> DXGI_FORMAT {
    match format {
        Format::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        Format::Rgba8Srgb => DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
        Format::Bgra8Srgb => DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
        Format::D32Float => DXGI_FORMAT_D32_FLOAT,
        Format::R32Float => DXGI_FORMAT_R32_FLOAT,
    }
}

/// The DXGI format a shared texture is allocated with.
///
/// Depth textures are typeless so they can be bound both as a depth target
/// and as a single-channel shader resource.
#[must_use]
pub const fn storage_format(format: Format) -> DXGI_FORMAT {
    match format.kind() {
        FormatKind::Depth => DXGI_FORMAT_R32_TYPELESS,
        FormatKind::Color => dxgi_format(format),
    }
}

/// Resource flags for a shared texture of `format`.
#[must_use]
pub const fn shared_resource_flags(format: Format) -> D3D12_RESOURCE_FLAGS {
    match format.kind() {
        FormatKind::Depth => D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL,
        FormatKind::Color => D3D12_RESOURCE_FLAGS(
            D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET.0
                | D3D12_RESOURCE_FLAG_ALLOW_SIMULTANEOUS_ACCESS.0,
        ),
    }
}

/// The native resource state for `state`.
#[must_use]
pub const fn resource_state(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Common => D3D12_RESOURCE_STATE_COMMON,
        ResourceState::CopyDest => D3D12_RESOURCE_STATE_COPY_DEST,
        ResourceState::CopySource => D3D12_RESOURCE_STATE_COPY_SOURCE,
        ResourceState::PixelShaderResource => D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
        ResourceState::DepthWrite => D3D12_RESOURCE_STATE_DEPTH_WRITE,
    }
}

/// The DXGI format value OpenXR swapchains take.
#[must_use]
pub fn swapchain_format(format: Format) -> u32 {
    dxgi_format(format).0.unsigned_abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_is_stored_typeless_and_viewed_typed() {
        assert_eq!(
            storage_format(Format::D32Float),
            DXGI_FORMAT_R32_TYPELESS,
            "typeless storage"
        );
        assert_eq!(dxgi_format(Format::D32Float), DXGI_FORMAT_D32_FLOAT, "dsv format");
        assert_eq!(
            dxgi_format(Format::D32Float.sampled_view()),
            DXGI_FORMAT_R32_FLOAT,
            "srv format"
        );
    }

    #[test]
    fn color_storage_matches_view() {
        for format in [Format::Rgba8Unorm, Format::Rgba8Srgb, Format::Bgra8Srgb] {
            assert_eq!(storage_format(format), dxgi_format(format), "{format:?}");
        }
    }

    #[test]
    fn shared_color_allows_simultaneous_access() {
        let flags = shared_resource_flags(Format::Rgba8Srgb);
        assert_ne!(
            flags.0 & D3D12_RESOURCE_FLAG_ALLOW_SIMULTANEOUS_ACCESS.0,
            0,
            "simultaneous access"
        );
        assert_eq!(
            shared_resource_flags(Format::D32Float),
            D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL,
            "depth-stencil only"
        );
    }

    #[test]
    fn swapchain_format_is_the_dxgi_value() {
        assert_eq!(swapchain_format(Format::Rgba8Srgb), 29, "R8G8B8A8_UNORM_SRGB");
        assert_eq!(swapchain_format(Format::D32Float), 40, "D32_FLOAT");
    }
}
