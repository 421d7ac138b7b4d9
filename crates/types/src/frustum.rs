//! View-frustum planes and conservative visibility tests.
//!
//! Planes are extracted from a combined view-projection matrix (Gribb and
//! Hartmann) assuming clip-space depth in `[0, 1]`, which is what
//! [`crate::math::perspective`] produces. Every plane normal points inward.

use crate::aabb::Aabb;
use crate::math::{Mat4, Vec3, Vec4};
use crate::plane::Plane;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum FrustumPlane {
    Left = 0,
    Right = 1,
    Bottom = 2,
    Top = 3,
    Near = 4,
    Far = 5,
}

impl FrustumPlane {
    pub const ALL: [FrustumPlane; 6] = [
        FrustumPlane::Left,
        FrustumPlane::Right,
        FrustumPlane::Bottom,
        FrustumPlane::Top,
        FrustumPlane::Near,
        FrustumPlane::Far,
    ];
}

/// Result of a box-versus-frustum classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    Outside,
    Intersecting,
    Inside,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    pub fn from_view_projection(view_proj: &Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        let raw: [Vec4; 6] = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r2,      // near, depth 0
            r3 - r2, // far, depth 1
        ];
        Self { planes: raw.map(Plane::from_vec4_normalized) }
    }

    pub fn plane(&self, which: FrustumPlane) -> &Plane {
        &self.planes[which as usize]
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes.iter().all(|pl| pl.signed_distance(p) >= 0.0)
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes.iter().all(|pl| pl.signed_distance(center) >= -radius)
    }

    /// Positive-vertex test. May report boxes near frustum corners as
    /// visible; never rejects a box that overlaps the frustum.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        if !aabb.is_valid() {
            return false;
        }
        self.planes.iter().all(|pl| {
            let p = Vec3::select(pl.normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
            pl.signed_distance(p) >= 0.0
        })
    }

    pub fn classify_aabb(&self, aabb: &Aabb) -> Containment {
        if !aabb.is_valid() {
            return Containment::Outside;
        }
        let mut inside = true;
        for pl in &self.planes {
            let positive = Vec3::select(pl.normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
            if pl.signed_distance(positive) < 0.0 {
                return Containment::Outside;
            }
            let negative = Vec3::select(pl.normal.cmpge(Vec3::ZERO), aabb.min, aabb.max);
            if pl.signed_distance(negative) < 0.0 {
                inside = false;
            }
        }
        if inside {
            Containment::Inside
        } else {
            Containment::Intersecting
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{look_at, perspective};
    use proptest::prelude::*;
    use std::f32::consts::FRAC_PI_2;

    fn camera_at_origin() -> (Mat4, Frustum) {
        let proj = perspective(FRAC_PI_2, 16.0 / 9.0, 0.1, 1000.0);
        let view = look_at(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let vp = proj * view;
        (vp, Frustum::from_view_projection(&vp))
    }

    #[test]
    fn points_in_front_and_behind() {
        let (_, f) = camera_at_origin();
        assert!(f.contains_point(Vec3::new(0.0, 0.0, -10.0)));
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, 10.0)));
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, -2000.0)));
    }

    #[test]
    fn boxes_in_view_and_far_off_axis() {
        let (_, f) = camera_at_origin();
        let near_box = Aabb::new(Vec3::new(-0.1, -0.1, -5.0), Vec3::new(0.1, 0.1, -4.0));
        assert!(f.intersects_aabb(&near_box));
        assert_eq!(f.classify_aabb(&near_box), Containment::Inside);
        let far_box = Aabb::new(Vec3::new(1000.0, 1000.0, -1.0), Vec3::new(1001.0, 1001.0, 0.0));
        assert!(!f.intersects_aabb(&far_box));
        assert_eq!(f.classify_aabb(&far_box), Containment::Outside);
    }

    #[test]
    fn planes_point_inward() {
        let (_, f) = camera_at_origin();
        let inside = Vec3::new(0.0, 0.0, -50.0);
        for which in FrustumPlane::ALL {
            assert!(f.plane(which).signed_distance(inside) > 0.0, "{which:?}");
        }
        assert!((f.plane(FrustumPlane::Near).signed_distance(Vec3::ZERO) + 0.1).abs() < 1e-4);
    }

    #[test]
    fn sphere_straddling_near_plane_is_visible() {
        let (_, f) = camera_at_origin();
        assert!(f.intersects_sphere(Vec3::new(0.0, 0.0, 0.5), 1.0));
        assert!(!f.intersects_sphere(Vec3::new(0.0, 0.0, 5.0), 1.0));
    }

    #[test]
    fn empty_box_is_never_visible() {
        let (_, f) = camera_at_origin();
        assert!(!f.intersects_aabb(&Aabb::EMPTY));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn boxes_around_visible_points_are_never_culled(
            nx in -0.99f32..0.99,
            ny in -0.99f32..0.99,
            nz in 0.01f32..0.99,
            half in 0.01f32..20.0,
        ) {
            let (vp, f) = camera_at_origin();
            let world = vp.inverse() * Vec4::new(nx, ny, nz, 1.0);
            let p = world.truncate() / world.w;
            let tol = 1e-3 * p.length().max(1.0);
            prop_assert!(f.planes.iter().all(|pl| pl.signed_distance(p) >= -tol));
            let b = Aabb::from_center_extents(p, Vec3::splat(half.max(tol)));
            prop_assert!(f.intersects_aabb(&b));
        }
    }
}
