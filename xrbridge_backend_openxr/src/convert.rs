// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conversion between xrbridge values and OpenXR structs.

use glam::{Quat, Vec3};
use openxr as xr;
use xrbridge_core::composition::{EyeVisibility, Rect, SubImage};
use xrbridge_core::handle::SwapchainHandle;
use xrbridge_core::time::{XrDuration, XrTime};
use xrbridge_core::view::{Fov, Pose, View};

/// Converts an OpenXR pose.
#[must_use]
pub fn pose_from_xr(pose: xr::Posef) -> Pose {
    let (p, q) = (pose.position, pose.orientation);
    Pose {
        position: Vec3::new(p.x, p.y, p.z),
        orientation: Quat::from_xyzw(q.x, q.y, q.z, q.w),
    }
}

/// Converts to an OpenXR pose.
#[must_use]
pub fn pose_to_xr(pose: Pose) -> xr::Posef {
    let (p, q) = (pose.position, pose.orientation);
    xr::Posef {
        orientation: xr::Quaternionf {
            x: q.x,
            y: q.y,
            z: q.z,
            w: q.w,
        },
        position: xr::Vector3f {
            x: p.x,
            y: p.y,
            z: p.z,
        },
    }
}

/// Converts an OpenXR field of view.
#[must_use]
pub fn fov_from_xr(fov: xr::Fovf) -> Fov {
    Fov {
        angle_left: fov.angle_left,
        angle_right: fov.angle_right,
        angle_up: fov.angle_up,
        angle_down: fov.angle_down,
    }
}

/// Converts to an OpenXR field of view.
#[must_use]
pub fn fov_to_xr(fov: Fov) -> xr::Fovf {
    xr::Fovf {
        angle_left: fov.angle_left,
        angle_right: fov.angle_right,
        angle_up: fov.angle_up,
        angle_down: fov.angle_down,
    }
}

/// Converts a located OpenXR view.
#[must_use]
pub fn view_from_xr(view: &xr::View) -> View {
    View {
        pose: pose_from_xr(view.pose),
        fov: fov_from_xr(view.fov),
    }
}

/// Converts a runtime time.
#[must_use]
pub fn time_from_xr(time: xr::Time) -> XrTime {
    XrTime(time.as_nanos())
}

/// Converts to a runtime time.
#[must_use]
pub fn time_to_xr(time: XrTime) -> xr::Time {
    xr::Time::from_nanos(time.nanos())
}

/// Converts a runtime duration.
#[must_use]
pub fn duration_from_xr(duration: xr::Duration) -> XrDuration {
    XrDuration(duration.as_nanos())
}

/// Converts to a runtime duration. [`XrDuration::INFINITE`] maps to
/// `XR_INFINITE_DURATION`.
#[must_use]
pub fn duration_to_xr(duration: XrDuration) -> xr::Duration {
    if duration == XrDuration::INFINITE {
        xr::Duration::INFINITE
    } else {
        xr::Duration::from_nanos(duration.nanos())
    }
}

/// Converts an eye mask.
#[must_use]
pub const fn eye_visibility_to_xr(visibility: EyeVisibility) -> xr::EyeVisibility {
    match visibility {
        EyeVisibility::Both => xr::EyeVisibility::BOTH,
        EyeVisibility::Left => xr::EyeVisibility::LEFT,
        EyeVisibility::Right => xr::EyeVisibility::RIGHT,
    }
}

/// Converts a region.
#[must_use]
pub fn rect_to_xr(rect: Rect) -> xr::Rect2Di {
    xr::Rect2Di {
        offset: xr::Offset2Di {
            x: rect.x,
            y: rect.y,
        },
        extent: xr::Extent2Di {
            width: i32::try_from(rect.extent.width).unwrap_or(i32::MAX),
            height: i32::try_from(rect.extent.height).unwrap_or(i32::MAX),
        },
    }
}

/// The raw `XrSwapchain` a core handle stands for.
#[must_use]
pub fn swapchain_from_handle(handle: SwapchainHandle) -> xr::sys::Swapchain {
    xr::sys::Swapchain::from_raw(handle.0)
}

/// The raw sub-image struct for `sub_image`.
#[must_use]
pub fn sub_image_to_xr(sub_image: &SubImage) -> xr::sys::SwapchainSubImage {
    xr::sys::SwapchainSubImage {
        swapchain: swapchain_from_handle(sub_image.swapchain),
        image_rect: rect_to_xr(sub_image.rect),
        image_array_index: sub_image.array_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrbridge_core::composition::Extent;

    #[test]
    fn identity_pose_matches_runtime_identity() {
        let xr_identity = pose_to_xr(Pose::IDENTITY);
        assert_eq!(xr_identity.orientation.w, 1.0, "w carries the identity");
        assert_eq!(
            (xr_identity.orientation.x, xr_identity.orientation.y, xr_identity.orientation.z),
            (0.0, 0.0, 0.0),
            "no rotation"
        );
        assert_eq!(pose_from_xr(xr::Posef::IDENTITY), Pose::IDENTITY, "inverse");
    }

    #[test]
    fn quaternion_components_keep_their_axes() {
        let xr_pose = xr::Posef {
            orientation: xr::Quaternionf {
                x: 0.1,
                y: 0.2,
                z: 0.3,
                w: 0.9,
            },
            position: xr::Vector3f {
                x: 1.0,
                y: 1.6,
                z: -2.0,
            },
        };
        let pose = pose_from_xr(xr_pose);
        assert_eq!(pose.orientation.w, 0.9, "w is last in glam too");
        assert_eq!(pose.position.y, 1.6, "eye height");
    }

    #[test]
    fn fov_keeps_signs() {
        let fov = fov_from_xr(xr::Fovf {
            angle_left: -0.8,
            angle_right: 0.7,
            angle_up: 0.75,
            angle_down: -0.9,
        });
        assert!(fov.angle_left < 0.0 && fov.angle_down < 0.0, "negative edges");
        assert_eq!(fov_to_xr(fov).angle_right, 0.7, "right edge");
    }

    #[test]
    fn infinite_duration_maps_to_runtime_infinite() {
        assert_eq!(
            duration_to_xr(XrDuration::INFINITE).as_nanos(),
            xr::Duration::INFINITE.as_nanos(),
            "infinite"
        );
        assert_eq!(duration_to_xr(XrDuration(5_000_000)).as_nanos(), 5_000_000, "finite");
    }

    #[test]
    fn sub_image_carries_raw_swapchain() {
        let sub = SubImage {
            swapchain: SwapchainHandle(0x77),
            rect: Rect::full(Extent::new(1920, 1832)),
            array_index: 0,
        };
        let raw = sub_image_to_xr(&sub);
        assert_eq!(raw.swapchain.into_raw(), 0x77, "handle");
        assert_eq!(raw.image_rect.extent.width, 1920, "width");
        assert_eq!(raw.image_rect.offset.x, 0, "origin");
    }

    #[test]
    fn eye_visibility_maps_each_eye() {
        assert_eq!(
            eye_visibility_to_xr(EyeVisibility::Left),
            xr::EyeVisibility::LEFT,
            "left"
        );
        assert_eq!(
            eye_visibility_to_xr(EyeVisibility::Both),
            xr::EyeVisibility::BOTH,
            "both"
        );
    }
}
