// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixed present pipelines.
//!
//! Both pipelines draw one fullscreen triangle. The overlay pipeline copies
//! color. The stereo pipeline also writes the sampled depth to `SV_Depth`,
//! so the compositor sees the game's depth buffer in the eye's depth
//! swapchain.

use core::mem::transmute_copy;
use core::slice;

use windows::Win32::Foundation::RECT;
use windows::Win32::Graphics::Direct3D::Fxc::{
    D3DCOMPILE_ENABLE_STRICTNESS, D3DCOMPILE_OPTIMIZATION_LEVEL3, D3DCompile,
};
use windows::Win32::Graphics::Direct3D::{
    D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST, D3D_ROOT_SIGNATURE_VERSION_1, ID3DBlob,
};
use windows::Win32::Graphics::Direct3D12::{
    D3D12_BLEND_DESC, D3D12_BLEND_ONE, D3D12_BLEND_OP_ADD, D3D12_BLEND_ZERO,
    D3D12_COLOR_WRITE_ENABLE_ALL, D3D12_COMPARISON_FUNC_ALWAYS, D3D12_CULL_MODE_NONE,
    D3D12_DEPTH_STENCIL_DESC, D3D12_DEPTH_WRITE_MASK_ALL, D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
    D3D12_DESCRIPTOR_HEAP_TYPE_DSV, D3D12_DESCRIPTOR_HEAP_TYPE_RTV, D3D12_DESCRIPTOR_RANGE,
    D3D12_DESCRIPTOR_RANGE_TYPE_SRV, D3D12_FILL_MODE_SOLID, D3D12_FILTER_MIN_MAG_MIP_LINEAR,
    D3D12_FLOAT32_MAX, D3D12_GRAPHICS_PIPELINE_STATE_DESC, D3D12_LOGIC_OP_NOOP,
    D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE, D3D12_RASTERIZER_DESC,
    D3D12_RENDER_TARGET_BLEND_DESC, D3D12_ROOT_DESCRIPTOR_TABLE, D3D12_ROOT_PARAMETER,
    D3D12_ROOT_PARAMETER_0, D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
    D3D12_ROOT_SIGNATURE_DESC, D3D12_ROOT_SIGNATURE_FLAG_NONE, D3D12_SHADER_BYTECODE,
    D3D12_SHADER_VISIBILITY_PIXEL, D3D12_STATIC_SAMPLER_DESC, D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
    D3D12_VIEWPORT, D3D12SerializeRootSignature, ID3D12Device, ID3D12PipelineState,
    ID3D12RootSignature,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_UNKNOWN, DXGI_SAMPLE_DESC};
use windows::core::{PCSTR, s};
use xrbridge_core::api::{Format, Present};
use xrbridge_core::composition::Extent;
use xrbridge_core::device::{CommandStream, DrawJob, PipelineKind, PresentPipeline};
use xrbridge_core::error::DeviceError;

use crate::com::{self, failed};
use crate::format::dxgi_format;
use crate::views::{DescriptorHeap, write_dsv, write_rtv, write_srv};

const SHADER_SOURCE: &str = r"
struct VsOut {
    float4 pos : SV_Position;
    float2 uv : TEXCOORD0;
};

VsOut vs_main(uint id : SV_VertexID) {
    VsOut o;
    o.uv = float2((id << 1) & 2, id & 2);
    o.pos = float4(o.uv * float2(2.0, -2.0) + float2(-1.0, 1.0), 0.0, 1.0);
    return o;
}

Texture2D color_tex : register(t0);
Texture2D<float> depth_tex : register(t1);
SamplerState samp : register(s0);

float4 ps_overlay(VsOut i) : SV_Target {
    return color_tex.Sample(samp, i.uv);
}

struct StereoOut {
    float4 color : SV_Target;
    float depth : SV_Depth;
};

StereoOut ps_stereo(VsOut i) {
    StereoOut o;
    o.color = color_tex.Sample(samp, i.uv);
    o.depth = depth_tex.Sample(samp, i.uv);
    return o;
}
";

#[expect(
    clippy::cast_possible_truncation,
    reason = "color write masks use the low four bits"
)]
const WRITE_ALL: u8 = D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8;

/// Shader-visible SRV pairs per pipeline. A pair is rewritten every draw,
/// so this bounds how many draws of one pipeline may be in flight.
const SRV_PAIRS: u32 = 16;

fn compile(entry: PCSTR, target: PCSTR) -> Result<ID3DBlob, DeviceError> {
    let mut blob: Option<ID3DBlob> = None;
    let mut errors: Option<ID3DBlob> = None;
    // SAFETY: the source pointer and length describe SHADER_SOURCE, and both
    // out-pointers are valid.
    let result = unsafe {
        D3DCompile(
            SHADER_SOURCE.as_ptr().cast(),
            SHADER_SOURCE.len(),
            None,
            None,
            None,
            entry,
            target,
            D3DCOMPILE_ENABLE_STRICTNESS | D3DCOMPILE_OPTIMIZATION_LEVEL3,
            0,
            &mut blob,
            Some(&mut errors),
        )
    };
    if let Err(err) = result {
        let log = errors.map_or_else(String::new, |e| {
            // SAFETY: the error blob holds GetBufferSize() bytes of text.
            let bytes = unsafe {
                slice::from_raw_parts(e.GetBufferPointer().cast::<u8>(), e.GetBufferSize())
            };
            String::from_utf8_lossy(bytes).into_owned()
        });
        return Err(DeviceError::new("D3DCompile", format_args!("{err}: {log}")));
    }
    blob.ok_or_else(|| DeviceError::new("D3DCompile", "no bytecode"))
}

fn bytecode(blob: &ID3DBlob) -> D3D12_SHADER_BYTECODE {
    // SAFETY: the blob outlives every pipeline creation that reads this.
    unsafe {
        D3D12_SHADER_BYTECODE {
            pShaderBytecode: blob.GetBufferPointer(),
            BytecodeLength: blob.GetBufferSize(),
        }
    }
}

fn root_signature(device: &ID3D12Device) -> Result<ID3D12RootSignature, DeviceError> {
    let ranges = [D3D12_DESCRIPTOR_RANGE {
        RangeType: D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
        NumDescriptors: 2,
        BaseShaderRegister: 0,
        RegisterSpace: 0,
        OffsetInDescriptorsFromTableStart: 0,
    }];
    let params = [D3D12_ROOT_PARAMETER {
        ParameterType: D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
        Anonymous: D3D12_ROOT_PARAMETER_0 {
            DescriptorTable: D3D12_ROOT_DESCRIPTOR_TABLE {
                NumDescriptorRanges: 1,
                pDescriptorRanges: ranges.as_ptr(),
            },
        },
        ShaderVisibility: D3D12_SHADER_VISIBILITY_PIXEL,
    }];
    let samplers = [D3D12_STATIC_SAMPLER_DESC {
        Filter: D3D12_FILTER_MIN_MAG_MIP_LINEAR,
        AddressU: D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
        AddressV: D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
        AddressW: D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
        MaxLOD: D3D12_FLOAT32_MAX,
        ShaderRegister: 0,
        ShaderVisibility: D3D12_SHADER_VISIBILITY_PIXEL,
        ..Default::default()
    }];
    let desc = D3D12_ROOT_SIGNATURE_DESC {
        NumParameters: 1,
        pParameters: params.as_ptr(),
        NumStaticSamplers: 1,
        pStaticSamplers: samplers.as_ptr(),
        Flags: D3D12_ROOT_SIGNATURE_FLAG_NONE,
    };
    let mut blob: Option<ID3DBlob> = None;
    // SAFETY: desc and the arrays it points into live until the call returns.
    unsafe { D3D12SerializeRootSignature(&desc, D3D_ROOT_SIGNATURE_VERSION_1, &mut blob, None) }
        .map_err(failed("D3D12SerializeRootSignature"))?;
    let blob = blob.ok_or_else(|| DeviceError::new("D3D12SerializeRootSignature", "no blob"))?;
    // SAFETY: the blob holds GetBufferSize() bytes of serialized signature.
    unsafe {
        let bytes =
            slice::from_raw_parts(blob.GetBufferPointer().cast::<u8>(), blob.GetBufferSize());
        device.CreateRootSignature(0, bytes)
    }
    .map_err(failed("CreateRootSignature"))
}

/// A fixed pipeline that samples shared images into swapchain images.
///
/// Pipeline state objects are built on first use for each target format
/// and cached.
#[derive(Debug)]
pub struct D3d12Pipeline {
    kind: PipelineKind,
    extent: Extent,
    device: ID3D12Device,
    root: ID3D12RootSignature,
    vs: ID3DBlob,
    ps: ID3DBlob,
    states: Vec<(Format, ID3D12PipelineState)>,
    srvs: DescriptorHeap,
    rtv: DescriptorHeap,
    dsv: DescriptorHeap,
    next_pair: u32,
}

impl D3d12Pipeline {
    pub(crate) fn new(
        device: &ID3D12Device,
        kind: PipelineKind,
        extent: Extent,
    ) -> Result<Self, DeviceError> {
        let ps_entry = match kind {
            PipelineKind::Stereo => s!("ps_stereo"),
            PipelineKind::Overlay => s!("ps_overlay"),
        };
        Ok(Self {
            kind,
            extent,
            device: device.clone(),
            root: root_signature(device)?,
            vs: compile(s!("vs_main"), s!("vs_5_0"))?,
            ps: compile(ps_entry, s!("ps_5_0"))?,
            states: Vec::new(),
            srvs: DescriptorHeap::new(
                device,
                D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
                SRV_PAIRS * 2,
                true,
            )?,
            rtv: DescriptorHeap::new(device, D3D12_DESCRIPTOR_HEAP_TYPE_RTV, 1, false)?,
            dsv: DescriptorHeap::new(device, D3D12_DESCRIPTOR_HEAP_TYPE_DSV, 1, false)?,
            next_pair: 0,
        })
    }

    fn state_for(&mut self, target: Format) -> Result<ID3D12PipelineState, DeviceError> {
        if let Some((_, pso)) = self.states.iter().find(|(f, _)| *f == target) {
            return Ok(pso.clone());
        }
        let stereo = self.kind == PipelineKind::Stereo;
        let write_all = D3D12_RENDER_TARGET_BLEND_DESC {
            BlendEnable: false.into(),
            LogicOpEnable: false.into(),
            SrcBlend: D3D12_BLEND_ONE,
            DestBlend: D3D12_BLEND_ZERO,
            BlendOp: D3D12_BLEND_OP_ADD,
            SrcBlendAlpha: D3D12_BLEND_ONE,
            DestBlendAlpha: D3D12_BLEND_ZERO,
            BlendOpAlpha: D3D12_BLEND_OP_ADD,
            LogicOp: D3D12_LOGIC_OP_NOOP,
            RenderTargetWriteMask: WRITE_ALL,
        };
        let mut desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
            // SAFETY: borrowed pointer; `self.root` outlives the call below
            // and the ManuallyDrop field never releases it.
            pRootSignature: unsafe { transmute_copy(&self.root) },
            VS: bytecode(&self.vs),
            PS: bytecode(&self.ps),
            BlendState: D3D12_BLEND_DESC {
                AlphaToCoverageEnable: false.into(),
                IndependentBlendEnable: false.into(),
                RenderTarget: [write_all; 8],
            },
            SampleMask: u32::MAX,
            RasterizerState: D3D12_RASTERIZER_DESC {
                FillMode: D3D12_FILL_MODE_SOLID,
                CullMode: D3D12_CULL_MODE_NONE,
                DepthClipEnable: true.into(),
                ..Default::default()
            },
            DepthStencilState: D3D12_DEPTH_STENCIL_DESC {
                DepthEnable: stereo.into(),
                DepthWriteMask: D3D12_DEPTH_WRITE_MASK_ALL,
                DepthFunc: D3D12_COMPARISON_FUNC_ALWAYS,
                ..Default::default()
            },
            PrimitiveTopologyType: D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
            NumRenderTargets: 1,
            DSVFormat: if stereo {
                dxgi_format(Format::D32Float)
            } else {
                DXGI_FORMAT_UNKNOWN
            },
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            ..Default::default()
        };
        desc.RTVFormats[0] = dxgi_format(target);
        // SAFETY: desc references the root signature and shader blobs owned
        // by self.
        let pso: ID3D12PipelineState = unsafe { self.device.CreateGraphicsPipelineState(&desc) }
            .map_err(failed("CreateGraphicsPipelineState"))?;
        tracing::debug!(kind = ?self.kind, ?target, "built present pipeline state");
        self.states.push((target, pso.clone()));
        Ok(pso)
    }
}

impl PresentPipeline for D3d12Pipeline {
    fn draw(
        &mut self,
        stream: &mut dyn CommandStream<Present>,
        job: &DrawJob,
    ) -> Result<(), DeviceError> {
        let list = com::command_list(stream.raw_commands())?;
        let pso = self.state_for(job.target.format)?;

        let pair = self.next_pair;
        self.next_pair = (self.next_pair + 1) % SRV_PAIRS;
        let color = job.color.map(|c| com::resource(c.image)).transpose()?;
        let depth = job.depth.map(|d| com::resource(d.image)).transpose()?;
        let color_format = job.color.map_or(job.target.format, |c| c.view_format);
        write_srv(
            &self.device,
            color.as_ref(),
            color_format,
            self.srvs.cpu(pair * 2),
        );
        write_srv(
            &self.device,
            depth.as_ref(),
            Format::R32Float,
            self.srvs.cpu(pair * 2 + 1),
        );

        let target = com::resource(job.target.image)?;
        write_rtv(&self.device, &target, job.target.format, self.rtv.cpu(0));
        let depth_target = job.depth_target.map(|d| com::resource(d.image)).transpose()?;
        if let (Some(resource), Some(desc)) = (&depth_target, job.depth_target) {
            write_dsv(&self.device, resource, desc.format, self.dsv.cpu(0));
        }

        let extent = if job.extent.is_empty() {
            self.extent
        } else {
            job.extent
        };
        let viewport = D3D12_VIEWPORT {
            TopLeftX: 0.0,
            TopLeftY: 0.0,
            Width: extent.width as f32,
            Height: extent.height as f32,
            MinDepth: 0.0,
            MaxDepth: 1.0,
        };
        let scissor = RECT {
            left: 0,
            top: 0,
            right: i32::try_from(extent.width).unwrap_or(i32::MAX),
            bottom: i32::try_from(extent.height).unwrap_or(i32::MAX),
        };
        let table = self
            .srvs
            .gpu(pair * 2)
            .ok_or_else(|| DeviceError::new("draw", "SRV heap is not shader-visible"))?;
        let rtv = self.rtv.cpu(0);
        let dsv = depth_target.is_some().then(|| self.dsv.cpu(0));

        // SAFETY: every object bound here is owned by self or by the job's
        // resources, which the device keeps alive past execution.
        unsafe {
            list.SetPipelineState(&pso);
            list.SetGraphicsRootSignature(&self.root);
            list.SetDescriptorHeaps(&[Some(self.srvs.heap.clone())]);
            list.SetGraphicsRootDescriptorTable(0, table);
            list.OMSetRenderTargets(1, Some(&rtv), false, dsv.as_ref().map(core::ptr::from_ref));
            list.RSSetViewports(&[viewport]);
            list.RSSetScissorRects(&[scissor]);
            list.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            list.DrawInstanced(3, 1, 0, 0);
        }
        Ok(())
    }
}
