//! Per-frame view state and the shared b0 constants.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use types::{look_at, Frustum};

use crate::camera::Camera;
use crate::config::LightingConfig;

/// Animation time wraps at this many seconds to keep phases precise.
pub const TIME_PERIOD: f64 = 3600.0;

pub fn wrap_time(seconds: f64) -> f32 {
    seconds.rem_euclid(TIME_PERIOD) as f32
}

/// Everything a renderer needs to cull and shade one frame.
#[derive(Debug, Clone)]
pub struct FrameView {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub light_view_projection: Mat4,
    pub eye: Vec3,
    pub frustum: Frustum,
    /// Wrapped into [0, TIME_PERIOD).
    pub time: f32,
    pub light_direction: Vec3,
    pub light_color: Vec3,
    pub light_intensity: f32,
    pub ambient: f32,
    pub fog_color: Vec3,
    pub fog_density: f32,
}

impl FrameView {
    pub fn new(camera: &Camera, seconds: f64, lighting: &LightingConfig, shadow_extent: f32) -> Self {
        let view = camera.view();
        let projection = camera.projection();
        let view_projection = projection * view;
        let light_direction = Vec3::from(lighting.sun_direction).try_normalize().unwrap_or(Vec3::Y);
        Self {
            view,
            projection,
            view_projection,
            light_view_projection: light_view_projection(camera.target, light_direction, shadow_extent),
            eye: camera.eye_position(),
            frustum: Frustum::from_view_projection(&view_projection),
            time: wrap_time(seconds),
            light_direction,
            light_color: Vec3::from(lighting.sun_color),
            light_intensity: lighting.sun_intensity,
            ambient: lighting.ambient,
            fog_color: Vec3::from(lighting.fog_color),
            fog_density: lighting.fog_density,
        }
    }

    pub fn constants(&self) -> FrameConstants {
        FrameConstants {
            view: self.view.to_cols_array_2d(),
            projection: self.projection.to_cols_array_2d(),
            view_projection: self.view_projection.to_cols_array_2d(),
            light_view_projection: self.light_view_projection.to_cols_array_2d(),
            camera: self.eye.extend(self.time).to_array(),
            light_direction: self.light_direction.extend(self.ambient).to_array(),
            light_color: self.light_color.extend(self.light_intensity).to_array(),
            fog: self.fog_color.extend(self.fog_density).to_array(),
        }
    }
}

/// Orthographic sun projection centred on `focus`.
fn light_view_projection(focus: Vec3, direction: Vec3, extent: f32) -> Mat4 {
    let extent = extent.max(1.0);
    let up = if direction.abs_diff_eq(Vec3::Y, 1e-3) || direction.abs_diff_eq(Vec3::NEG_Y, 1e-3) {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let eye = focus + direction * extent * 2.0;
    let projection = Mat4::orthographic_rh(-extent, extent, -extent, extent, 0.1, extent * 4.0);
    projection * look_at(eye, focus, up)
}

/// Layout of `Frame` in `common.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameConstants {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
    pub light_view_projection: [[f32; 4]; 4],
    pub camera: [f32; 4],
    pub light_direction: [f32; 4],
    pub light_color: [f32; 4],
    pub fog: [f32; 4],
}

const _: () = assert!(std::mem::size_of::<FrameConstants>() == 320);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_wraps_into_period() {
        assert_eq!(wrap_time(12.5), 12.5);
        assert!((wrap_time(TIME_PERIOD + 3.0) - 3.0).abs() < 1e-6);
        assert!(wrap_time(-1.0) > 0.0);
    }

    #[test]
    fn constants_carry_eye_and_time() {
        let cam = Camera::new(100.0);
        let frame = FrameView::new(&cam, 7.0, &LightingConfig::default(), 50.0);
        let c = frame.constants();
        assert_eq!(c.camera[3], 7.0);
        assert!((Vec3::from_slice(&c.camera[..3]) - cam.eye_position()).length() < 1e-5);
        assert!((Vec3::from_slice(&c.light_direction[..3]).length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shadow_volume_contains_focus() {
        let m = light_view_projection(Vec3::new(10.0, 0.0, 10.0), Vec3::Y, 100.0);
        let p = m.project_point3(Vec3::new(10.0, 0.0, 10.0));
        assert!(p.x.abs() < 1e-4 && p.y.abs() < 1e-4);
        assert!((0.0..=1.0).contains(&p.z));
    }
}
