// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Session configuration.
//!
//! [`SessionConfig`] is plain data with serde support. Every field has a
//! default, so a partial config file only overrides what it names. Loading
//! the file is up to the application.

use serde::{Deserialize, Serialize};

use crate::api::Format;
use crate::time::XrDuration;

/// Placement of the 2D overlay quad.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Submit the overlay layer at all.
    pub enabled: bool,
    /// Distance in front of the head, in meters.
    pub distance_m: f32,
    /// Length of the shorter quad side, in meters.
    pub size_m: f32,
    /// Blend with the texture's alpha channel.
    pub blend_source_alpha: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            distance_m: 2.0,
            size_m: 1.0,
            blend_source_alpha: true,
        }
    }
}

/// Depth submission for the stereo layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    /// Attach depth info to projection views.
    pub submit: bool,
    /// Minimum depth value.
    pub min_depth: f32,
    /// Maximum depth value.
    pub max_depth: f32,
    /// Near plane in meters.
    pub near_z: f32,
    /// Far plane in meters.
    pub far_z: f32,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            submit: true,
            min_depth: 0.0,
            max_depth: 1.0,
            near_z: 0.1,
            far_z: 1000.0,
        }
    }
}

/// Swapchain formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Color swapchains.
    pub color: Format,
    /// Depth swapchains.
    pub depth: Format,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            color: Format::Rgba8Srgb,
            depth: Format::D32Float,
        }
    }
}

/// Everything the orchestrator needs to know up front.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Overlay placement.
    pub overlay: OverlayConfig,
    /// Depth submission.
    pub depth: DepthConfig,
    /// Swapchain formats.
    pub formats: FormatConfig,
    /// Swapchain image wait timeout in nanoseconds; `None` waits forever.
    pub swapchain_wait_timeout_ns: Option<u64>,
    /// Log a handoff summary every this many signals; 0 disables it.
    pub handoff_log_interval: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            overlay: OverlayConfig::default(),
            depth: DepthConfig::default(),
            formats: FormatConfig::default(),
            swapchain_wait_timeout_ns: None,
            handoff_log_interval: 500,
        }
    }
}

impl SessionConfig {
    /// The swapchain image wait timeout.
    #[must_use]
    pub const fn swapchain_wait_timeout(&self) -> XrDuration {
        match self.swapchain_wait_timeout_ns {
            Some(ns) => XrDuration::from_nanos_u64(ns),
            None => XrDuration::INFINITE,
        }
    }
}
