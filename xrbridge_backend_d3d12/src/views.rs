// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! View descriptions and descriptor heap helpers.

use core::ptr;

use windows::Win32::Graphics::Direct3D12::{
    D3D12_CPU_DESCRIPTOR_HANDLE, D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
    D3D12_DEPTH_STENCIL_VIEW_DESC, D3D12_DEPTH_STENCIL_VIEW_DESC_0, D3D12_DESCRIPTOR_HEAP_DESC,
    D3D12_DESCRIPTOR_HEAP_FLAG_NONE, D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE,
    D3D12_DESCRIPTOR_HEAP_TYPE, D3D12_DSV_DIMENSION_TEXTURE2D, D3D12_DSV_FLAG_NONE,
    D3D12_GPU_DESCRIPTOR_HANDLE, D3D12_RENDER_TARGET_VIEW_DESC, D3D12_RENDER_TARGET_VIEW_DESC_0,
    D3D12_RTV_DIMENSION_TEXTURE2D, D3D12_SHADER_RESOURCE_VIEW_DESC,
    D3D12_SHADER_RESOURCE_VIEW_DESC_0, D3D12_SRV_DIMENSION_TEXTURE2D, D3D12_TEX2D_DSV,
    D3D12_TEX2D_RTV, D3D12_TEX2D_SRV, ID3D12DescriptorHeap, ID3D12Device, ID3D12Resource,
};
use xrbridge_core::api::Format;
use xrbridge_core::error::DeviceError;

use crate::com::failed;
use crate::format::dxgi_format;

pub(crate) fn rtv_desc(format: Format) -> D3D12_RENDER_TARGET_VIEW_DESC {
    D3D12_RENDER_TARGET_VIEW_DESC {
        Format: dxgi_format(format),
        ViewDimension: D3D12_RTV_DIMENSION_TEXTURE2D,
        Anonymous: D3D12_RENDER_TARGET_VIEW_DESC_0 {
            Texture2D: D3D12_TEX2D_RTV {
                MipSlice: 0,
                PlaneSlice: 0,
            },
        },
    }
}

pub(crate) fn dsv_desc(format: Format) -> D3D12_DEPTH_STENCIL_VIEW_DESC {
    D3D12_DEPTH_STENCIL_VIEW_DESC {
        Format: dxgi_format(format),
        ViewDimension: D3D12_DSV_DIMENSION_TEXTURE2D,
        Flags: D3D12_DSV_FLAG_NONE,
        Anonymous: D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
            Texture2D: D3D12_TEX2D_DSV { MipSlice: 0 },
        },
    }
}

pub(crate) fn srv_desc(format: Format) -> D3D12_SHADER_RESOURCE_VIEW_DESC {
    D3D12_SHADER_RESOURCE_VIEW_DESC {
        Format: dxgi_format(format.sampled_view()),
        ViewDimension: D3D12_SRV_DIMENSION_TEXTURE2D,
        Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
        Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
            Texture2D: D3D12_TEX2D_SRV {
                MostDetailedMip: 0,
                MipLevels: 1,
                PlaneSlice: 0,
                ResourceMinLODClamp: 0.0,
            },
        },
    }
}

/// A fixed-size descriptor heap addressed by slot.
#[derive(Debug)]
pub(crate) struct DescriptorHeap {
    pub(crate) heap: ID3D12DescriptorHeap,
    cpu_start: D3D12_CPU_DESCRIPTOR_HANDLE,
    gpu_start: Option<D3D12_GPU_DESCRIPTOR_HANDLE>,
    increment: u32,
    len: u32,
}

impl DescriptorHeap {
    pub(crate) fn new(
        device: &ID3D12Device,
        kind: D3D12_DESCRIPTOR_HEAP_TYPE,
        len: u32,
        shader_visible: bool,
    ) -> Result<Self, DeviceError> {
        let desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: kind,
            NumDescriptors: len,
            Flags: if shader_visible {
                D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE
            } else {
                D3D12_DESCRIPTOR_HEAP_FLAG_NONE
            },
            NodeMask: 0,
        };
        // SAFETY: desc is a valid heap description.
        let heap: ID3D12DescriptorHeap =
            unsafe { device.CreateDescriptorHeap(&desc) }.map_err(failed("CreateDescriptorHeap"))?;
        // SAFETY: heap is a live descriptor heap.
        let (cpu_start, gpu_start, increment) = unsafe {
            (
                heap.GetCPUDescriptorHandleForHeapStart(),
                shader_visible.then(|| heap.GetGPUDescriptorHandleForHeapStart()),
                device.GetDescriptorHandleIncrementSize(kind),
            )
        };
        Ok(Self {
            heap,
            cpu_start,
            gpu_start,
            increment,
            len,
        })
    }

    pub(crate) fn cpu(&self, slot: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        debug_assert!(slot < self.len, "descriptor slot {slot} out of range");
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: self.cpu_start.ptr + (slot * self.increment) as usize,
        }
    }

    pub(crate) fn gpu(&self, slot: u32) -> Option<D3D12_GPU_DESCRIPTOR_HANDLE> {
        self.gpu_start.map(|start| D3D12_GPU_DESCRIPTOR_HANDLE {
            ptr: start.ptr + u64::from(slot * self.increment),
        })
    }
}

/// Writes a render target view of `resource` into `slot`.
pub(crate) fn write_rtv(
    device: &ID3D12Device,
    resource: &ID3D12Resource,
    format: Format,
    slot: D3D12_CPU_DESCRIPTOR_HANDLE,
) {
    let desc = rtv_desc(format);
    // SAFETY: resource is live and slot lies inside a CPU-visible RTV heap.
    unsafe { device.CreateRenderTargetView(resource, Some(ptr::from_ref(&desc)), slot) };
}

/// Writes a depth-stencil view of `resource` into `slot`.
pub(crate) fn write_dsv(
    device: &ID3D12Device,
    resource: &ID3D12Resource,
    format: Format,
    slot: D3D12_CPU_DESCRIPTOR_HANDLE,
) {
    let desc = dsv_desc(format);
    // SAFETY: resource is live and slot lies inside a CPU-visible DSV heap.
    unsafe { device.CreateDepthStencilView(resource, Some(ptr::from_ref(&desc)), slot) };
}

/// Writes a shader resource view into `slot`, or a null view that reads
/// zero when `resource` is `None`.
pub(crate) fn write_srv(
    device: &ID3D12Device,
    resource: Option<&ID3D12Resource>,
    format: Format,
    slot: D3D12_CPU_DESCRIPTOR_HANDLE,
) {
    let desc = srv_desc(format);
    // SAFETY: resource, if any, is live and slot lies inside a CBV/SRV/UAV
    // heap. A null resource with a full description is a valid null view.
    unsafe { device.CreateShaderResourceView(resource, Some(ptr::from_ref(&desc)), slot) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::Graphics::Dxgi::Common::{
        DXGI_FORMAT_D32_FLOAT, DXGI_FORMAT_R8G8B8A8_UNORM_SRGB, DXGI_FORMAT_R32_FLOAT,
    };

    #[test]
    fn depth_views_split_by_binding() {
        assert_eq!(
            srv_desc(Format::D32Float).Format,
            DXGI_FORMAT_R32_FLOAT,
            "sampled as a single float"
        );
        assert_eq!(
            dsv_desc(Format::D32Float).Format,
            DXGI_FORMAT_D32_FLOAT,
            "bound as depth"
        );
    }

    #[test]
    fn color_views_keep_srgb() {
        assert_eq!(
            rtv_desc(Format::Rgba8Srgb).Format,
            DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
            "rtv"
        );
        assert_eq!(
            srv_desc(Format::Rgba8Srgb).Format,
            DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
            "srv"
        );
    }
}
