//! Four-lane single-precision value types.
//!
//! The vector, matrix and quaternion types are glam's SIMD-backed types
//! (16-byte aligned `Vec4`, `Mat4`, `Quat`). Matrices are column-major and
//! compose left-to-right: `parent * child` applies `child` first.

pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec3A, Vec4};

/// Cosine above which slerp falls back to normalized lerp.
pub const SLERP_LERP_THRESHOLD: f32 = 0.9995;

/// `1 - w²` below which a quaternion's rotation axis is undefined.
pub const AXIS_EPSILON: f32 = 1e-6;

/// Matrix helpers that glam does not provide directly.
pub trait Mat4Ext {
    /// Builds a matrix from 16 scalars listed in row order.
    fn from_rows(values: [f32; 16]) -> Mat4;
    /// Rotation of `angle` radians about `axis` (normalized internally).
    fn rotation(axis: Vec3, angle: f32) -> Mat4;
    fn translation_part(&self) -> Vec3;
    /// Per-axis scale, taken as the length of each basis column.
    fn scale_part(&self) -> Vec3;
}

impl Mat4Ext for Mat4 {
    fn from_rows(values: [f32; 16]) -> Mat4 {
        Mat4::from_cols_array(&values).transpose()
    }

    fn rotation(axis: Vec3, angle: f32) -> Mat4 {
        Mat4::from_axis_angle(axis.normalize_or(Vec3::Y), angle)
    }

    fn translation_part(&self) -> Vec3 {
        self.col(3).truncate()
    }

    fn scale_part(&self) -> Vec3 {
        Vec3::new(
            self.col(0).truncate().length(),
            self.col(1).truncate().length(),
            self.col(2).truncate().length(),
        )
    }
}

pub trait QuatExt {
    /// Shortest-arc spherical interpolation.
    fn slerp_shortest(self, end: Quat, t: f32) -> Quat;
    /// Rotation axis, or +Y when the rotation is (near) identity.
    fn axis_or_canonical(self) -> Vec3;
    fn rotation_angle(self) -> f32;
}

impl QuatExt for Quat {
    fn slerp_shortest(self, end: Quat, t: f32) -> Quat {
        let a = Vec4::from(self);
        let mut b = Vec4::from(end);
        let mut cos = a.dot(b);
        if cos < 0.0 {
            b = -b;
            cos = -cos;
        }

        if cos > SLERP_LERP_THRESHOLD {
            let v = a + (b - a) * t;
            return Quat::from_vec4(v).normalize();
        }

        let theta = cos.clamp(-1.0, 1.0).acos();
        let sin = theta.sin();
        let wa = ((1.0 - t) * theta).sin() / sin;
        let wb = (t * theta).sin() / sin;
        Quat::from_vec4(a * wa + b * wb)
    }

    fn axis_or_canonical(self) -> Vec3 {
        let w = self.w;
        let s2 = 1.0 - w * w;
        if s2 < AXIS_EPSILON {
            return Vec3::Y;
        }
        let inv = 1.0 / s2.sqrt();
        Vec3::new(self.x * inv, self.y * inv, self.z * inv)
    }

    fn rotation_angle(self) -> f32 {
        2.0 * self.w.clamp(-1.0, 1.0).acos()
    }
}

/// Right-handed perspective with clip-space depth in [0, 1]; `w_clip = -z_view`.
pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    Mat4::perspective_rh(fov_y, aspect, near, far)
}

/// View matrix mapping the eye-to-target direction onto -Z.
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(eye, target, up)
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Rounds `size` up to the next multiple of `align` (a power of two).
#[inline]
pub const fn align_up(size: u64, align: u64) -> u64 {
    (size + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f32::consts::PI;

    fn approx_mat(a: Mat4, b: Mat4, eps: f32) -> bool {
        a.to_cols_array()
            .iter()
            .zip(b.to_cols_array().iter())
            .all(|(x, y)| (x - y).abs() <= eps)
    }

    #[test]
    fn from_rows_transposes() {
        let m = Mat4::from_rows([
            1.0, 2.0, 3.0, 4.0, //
            5.0, 6.0, 7.0, 8.0, //
            9.0, 10.0, 11.0, 12.0, //
            13.0, 14.0, 15.0, 16.0,
        ]);
        assert_eq!(m.row(0), Vec4::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(m.col(0), Vec4::new(1.0, 5.0, 9.0, 13.0));
        assert_eq!(m.translation_part(), Vec3::new(4.0, 8.0, 12.0));
    }

    #[test]
    fn identity_leaves_vectors_alone() {
        let v = Vec4::new(1.5, -2.0, 3.25, 1.0);
        assert_eq!(Mat4::IDENTITY * v, v);
    }

    #[test]
    fn trs_applies_scale_then_rotation_then_translation() {
        let t = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
        let r = Mat4::rotation(Vec3::Z, PI / 2.0);
        let s = Mat4::from_scale(Vec3::splat(2.0));
        let p = (t * r * s).transform_point3(Vec3::X);
        assert!((p - Vec3::new(10.0, 2.0, 0.0)).length() < 1e-5, "{p:?}");
    }

    #[test]
    fn perspective_w_is_negated_view_z() {
        let proj = perspective(PI / 2.0, 1.0, 0.1, 100.0);
        let clip = proj * Vec4::new(0.0, 0.0, -5.0, 1.0);
        assert!((clip.w - 5.0).abs() < 1e-6);
        let behind = proj * Vec4::new(0.0, 0.0, 5.0, 1.0);
        assert!(behind.w < 0.0);
    }

    #[test]
    fn look_at_maps_forward_to_negative_z() {
        let view = look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
        let p = view.transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(0.0, 0.0, -10.0)).length() < 1e-5);
    }

    #[test]
    fn slerp_endpoints() {
        let a = Quat::from_axis_angle(Vec3::Y, 0.3);
        let b = Quat::from_axis_angle(Vec3::X, 1.2);
        assert!(a.slerp_shortest(a, 0.37).abs_diff_eq(a, 1e-6));
        assert!(a.slerp_shortest(b, 0.0).abs_diff_eq(a, 1e-6));
        assert!(a.slerp_shortest(b, 1.0).abs_diff_eq(b, 1e-5));
    }

    #[test]
    fn slerp_takes_shortest_arc() {
        let a = Quat::from_axis_angle(Vec3::Z, 0.1);
        let b = -Quat::from_axis_angle(Vec3::Z, 0.5);
        let mid = a.slerp_shortest(b, 0.5);
        let expected = Quat::from_axis_angle(Vec3::Z, 0.3);
        assert!(mid.dot(expected).abs() > 1.0 - 1e-5);
    }

    #[test]
    fn slerp_close_quaternions_uses_lerp_and_stays_unit() {
        let a = Quat::from_axis_angle(Vec3::Y, 0.0);
        let b = Quat::from_axis_angle(Vec3::Y, 0.01);
        assert!(Vec4::from(a).dot(Vec4::from(b)) > SLERP_LERP_THRESHOLD);
        let q = a.slerp_shortest(b, 0.5);
        assert!((q.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn identity_axis_is_canonical() {
        let axis = Quat::IDENTITY.axis_or_canonical();
        assert_eq!(axis, Vec3::Y);
        assert!(axis.is_finite());
    }

    #[test]
    fn axis_extraction_matches_construction() {
        let q = Quat::from_axis_angle(Vec3::new(1.0, 2.0, 2.0).normalize(), 1.1);
        let axis = q.axis_or_canonical();
        assert!((axis - Vec3::new(1.0, 2.0, 2.0).normalize()).length() < 1e-5);
        assert!((q.rotation_angle() - 1.1).abs() < 1e-5);
    }

    #[test]
    fn align_up_rounds_to_constant_buffer_alignment() {
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
    }

    fn arb_vec3() -> impl Strategy<Value = Vec3> {
        (-100.0f32..100.0, -100.0f32..100.0, -100.0f32..100.0).prop_map(|(x, y, z)| Vec3::new(x, y, z))
    }

    fn arb_unit_axis() -> impl Strategy<Value = Vec3> {
        arb_vec3()
            .prop_filter("non-degenerate axis", |v| v.length() > 1e-2)
            .prop_map(|v| v.normalize())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn transpose_is_involutive(values in proptest::array::uniform16(-1000.0f32..1000.0)) {
            let m = Mat4::from_cols_array(&values);
            prop_assert_eq!(m.transpose().transpose(), m);
        }

        #[test]
        fn inverse_times_matrix_is_identity(
            axis in arb_unit_axis(),
            angle in -PI..PI,
            translation in arb_vec3(),
            scale in (0.2f32..5.0, 0.2f32..5.0, 0.2f32..5.0),
        ) {
            let m = Mat4::from_scale_rotation_translation(
                Vec3::new(scale.0, scale.1, scale.2),
                Quat::from_axis_angle(axis, angle),
                translation,
            );
            prop_assert!(approx_mat(m.inverse() * m, Mat4::IDENTITY, 1e-3));
        }

        #[test]
        fn quat_rotation_matches_matrix_rotation(axis in arb_unit_axis(), angle in -PI..PI, v in arb_vec3()) {
            let by_quat = Quat::from_axis_angle(axis, angle) * v;
            let by_mat = (Mat4::rotation(axis, angle) * v.extend(0.0)).truncate();
            prop_assert!((by_quat - by_mat).length() <= 1e-5 * v.length().max(1.0));
        }

        #[test]
        fn normalized_quat_has_unit_length(x in -10.0f32..10.0, y in -10.0f32..10.0, z in -10.0f32..10.0, w in -10.0f32..10.0) {
            let q = Quat::from_xyzw(x, y, z, w);
            prop_assume!(q.length() > 1e-3);
            prop_assert!((q.normalize().length() - 1.0).abs() < 1e-5);
        }

        #[test]
        fn conjugate_times_unit_quat_is_identity(axis in arb_unit_axis(), angle in -PI..PI) {
            let q = Quat::from_axis_angle(axis, angle);
            prop_assert!((q.conjugate() * q).abs_diff_eq(Quat::IDENTITY, 1e-5));
        }
    }
}
