// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Format, layout, and aspect mapping between xrbridge and Vulkan.

use ash::vk;
use xrbridge_core::api::{Format, FormatKind, ImageLayout};

/// The Vulkan format for `format`.
#[must_use]
pub const fn vk_format(format: Format) -> vk::Format {
    match format {
        Format::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        Format::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        Format::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        Format::D32Float => vk::Format::D32_SFLOAT,
        Format::R32Float => vk::Format::R32_SFLOAT,
    }
}

/// The native layout for `layout`.
#[must_use]
pub const fn vk_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::ShaderRead => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthAttachment => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
    }
}

/// The image aspect views and barriers of `format` address.
#[must_use]
pub const fn aspect(format: Format) -> vk::ImageAspectFlags {
    match format.kind() {
        FormatKind::Depth => vk::ImageAspectFlags::DEPTH,
        FormatKind::Color => vk::ImageAspectFlags::COLOR,
    }
}

/// Usage flags of an imported shared image.
///
/// Shared images are attachments for the game's renderer and may also be
/// copied, cleared, and sampled.
#[must_use]
pub fn shared_usage(format: Format) -> vk::ImageUsageFlags {
    let attachment = match format.kind() {
        FormatKind::Depth => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        FormatKind::Color => vk::ImageUsageFlags::COLOR_ATTACHMENT,
    };
    attachment
        | vk::ImageUsageFlags::TRANSFER_SRC
        | vk::ImageUsageFlags::TRANSFER_DST
        | vk::ImageUsageFlags::SAMPLED
}

/// The whole single-mip, single-layer subresource of an image.
#[must_use]
pub fn full_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Finds a memory type allowed by `type_bits` that has all of `wanted`.
#[must_use]
pub fn pick_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    wanted: vk::MemoryPropertyFlags,
) -> Option<u32> {
    props
        .memory_types_as_slice()
        .iter()
        .zip(0_u32..)
        .find(|(ty, i)| type_bits & (1 << i) != 0 && ty.property_flags.contains(wanted))
        .map(|(_, i)| i)
}
