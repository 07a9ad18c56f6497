use std::f32::consts::FRAC_PI_4;

use glam::{Mat4, UVec2, Vec3, Vec4};

use crate::gpu;

/// Camera the pipeline renders from; the previous frame's camera is kept by
/// the pipeline itself.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub origin: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,

    /// Vertical field of view, in radians.
    pub fov_y: f32,
    pub viewport_size: UVec2,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn looking_at(origin: Vec3, look_at: Vec3, viewport_size: UVec2) -> Self {
        Self {
            origin,
            look_at,
            up: Vec3::Y,
            fov_y: FRAC_PI_4,
            viewport_size,
            near: 0.1,
            far: 1000.0,
        }
    }

    pub fn projection_view(&self) -> Mat4 {
        let aspect = self.viewport_size.x as f32 / self.viewport_size.y as f32;

        Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far)
            * Mat4::look_at_rh(self.origin, self.look_at, self.up)
    }

    pub(crate) fn serialize(&self, prev: Option<&Self>) -> gpu::Camera {
        let projection_view = self.projection_view();
        let prev = prev.unwrap_or(self);

        gpu::Camera {
            projection_view,
            ndc_to_world: projection_view.inverse(),
            prev_projection_view: prev.projection_view(),
            origin: self.origin.extend(0.0),
            prev_origin: prev.origin.extend(0.0),
            screen: self.viewport_size.as_vec2().extend(0.0).extend(0.0),
            data: Vec4::new(self.fov_y, 0.0, 0.0, 0.0),
        }
    }

    /// Returns whether switching from `self` to `other` requires rebuilding
    /// screen-sized resources.
    pub(crate) fn is_invalidated_by(&self, other: &Self) -> bool {
        self.viewport_size != other.viewport_size
    }

    pub(crate) fn describe(&self) -> String {
        format!(
            "size={}x{}, origin={}, look_at={}",
            self.viewport_size.x, self.viewport_size.y, self.origin, self.look_at,
        )
    }
}
