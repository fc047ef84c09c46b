// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime load and session creation.

use core::mem::{size_of, size_of_val, transmute_copy};

use anyhow::{Context, anyhow, bail};
use openxr as xr;
use windows::Win32::Foundation::LUID;
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL;
use windows_core::Interface;
use xrbridge_backend_d3d12::D3d12Device;

use crate::VIEW_TYPE;
use crate::compositor::OpenXrCompositor;

/// A running OpenXR session and the device it presents with.
///
/// Fields drop in declaration order, so the session is destroyed before the
/// device it was created on.
#[derive(Debug)]
pub struct XrSession {
    /// The compositor side.
    pub compositor: OpenXrCompositor,
    /// The present device the runtime was given.
    pub device: D3d12Device,
}

fn luid_of(luid: &xr::sys::platform::LUID) -> anyhow::Result<LUID> {
    if size_of_val(luid) != size_of::<LUID>() {
        bail!("runtime LUID is {} bytes", size_of_val(luid));
    }
    // SAFETY: both are the 8-byte Win32 LUID, checked above.
    Ok(unsafe { transmute_copy(luid) })
}

fn feature_level_of(
    level: &xr::sys::platform::D3D_FEATURE_LEVEL,
) -> anyhow::Result<D3D_FEATURE_LEVEL> {
    if size_of_val(level) != size_of::<D3D_FEATURE_LEVEL>() {
        bail!("runtime feature level is {} bytes", size_of_val(level));
    }
    // SAFETY: both are the 4-byte D3D_FEATURE_LEVEL enum, checked above.
    Ok(unsafe { transmute_copy(level) })
}

/// Loads the OpenXR runtime and opens a D3D12 session on the adapter it
/// asks for.
///
/// The session is not running yet; the compositor begins it when the
/// runtime reports it ready.
pub fn start_session(application_name: &str) -> anyhow::Result<XrSession> {
    // SAFETY: loading the system OpenXR loader runs its initializers.
    let entry = unsafe { xr::Entry::load() }
        .map_err(|err| anyhow!("couldn't find the OpenXR loader: {err:?}"))?;
    let available = entry
        .enumerate_extensions()
        .map_err(|err| anyhow!("xrEnumerateInstanceExtensionProperties: {err}"))?;
    if !available.khr_d3d12_enable {
        bail!("the OpenXR runtime does not support XR_KHR_D3D12_enable");
    }
    let mut extensions = xr::ExtensionSet::default();
    extensions.khr_d3d12_enable = true;

    let instance = entry
        .create_instance(
            &xr::ApplicationInfo {
                application_name,
                application_version: 0,
                engine_name: "xrbridge",
                engine_version: 0,
                api_version: xr::Version::new(1, 0, 0),
            },
            &extensions,
            &[],
        )
        .map_err(|err| anyhow!("xrCreateInstance: {err}"))?;
    if let Ok(props) = instance.properties() {
        tracing::info!(
            runtime = %props.runtime_name,
            version = %props.runtime_version,
            "loaded OpenXR runtime"
        );
    }

    let system = instance
        .system(xr::FormFactor::HEAD_MOUNTED_DISPLAY)
        .map_err(|err| anyhow!("xrGetSystem: {err}"))?;
    let blend_mode = instance
        .enumerate_environment_blend_modes(system, VIEW_TYPE)
        .map_err(|err| anyhow!("xrEnumerateEnvironmentBlendModes: {err}"))?
        .first()
        .copied()
        .unwrap_or(xr::EnvironmentBlendMode::OPAQUE);

    let requirements = instance
        .graphics_requirements::<xr::D3D12>(system)
        .map_err(|err| anyhow!("xrGetD3D12GraphicsRequirementsKHR: {err}"))?;
    let luid = luid_of(&requirements.adapter_luid)?;
    let feature_level = feature_level_of(&requirements.min_feature_level)?;
    tracing::debug!(
        luid_low = luid.LowPart,
        luid_high = luid.HighPart,
        feature_level = format_args!("{:#x}", feature_level.0),
        "runtime graphics requirements"
    );
    let device = D3d12Device::new(luid, feature_level).context("present device")?;

    // SAFETY: the device and queue outlive the session; XrSession drops the
    // compositor first.
    let (session, frame_waiter, frame_stream) = unsafe {
        instance.create_session::<xr::D3D12>(
            system,
            &xr::d3d::SessionCreateInfoD3D12 {
                device: device.device().as_raw() as *mut _,
                queue: device.queue().as_raw() as *mut _,
            },
        )
    }
    .map_err(|err| anyhow!("xrCreateSession: {err}"))?;

    let stage = session
        .create_reference_space(xr::ReferenceSpaceType::STAGE, xr::Posef::IDENTITY)
        .map_err(|err| anyhow!("xrCreateReferenceSpace(STAGE): {err}"))?;
    let view = session
        .create_reference_space(xr::ReferenceSpaceType::VIEW, xr::Posef::IDENTITY)
        .map_err(|err| anyhow!("xrCreateReferenceSpace(VIEW): {err}"))?;

    let compositor = OpenXrCompositor::new(
        instance,
        system,
        session,
        frame_waiter,
        frame_stream,
        stage,
        view,
        blend_mode,
    );
    Ok(XrSession { compositor, device })
}
