use crate::math::{Vec3, Vec4};

/// `dot(normal, p) + d = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    pub fn new(normal: Vec3, d: f32) -> Self {
        Self { normal, d }
    }

    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normal.normalize_or(Vec3::Y);
        Self { normal: n, d: -n.dot(point) }
    }

    /// Plane through three counter-clockwise points.
    pub fn from_points(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self::from_point_normal(a, (b - a).cross(c - a))
    }

    /// Interprets `xyz` as the (unnormalized) normal and `w` as the offset,
    /// then rescales so the signed distance is in world units.
    pub fn from_vec4_normalized(v: Vec4) -> Self {
        let n = v.truncate();
        let len = n.length();
        if len <= f32::EPSILON {
            return Self { normal: n, d: v.w };
        }
        Self { normal: n / len, d: v.w / len }
    }

    #[inline]
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }

    pub fn project(&self, p: Vec3) -> Vec3 {
        p - self.normal * self.signed_distance(p)
    }

    pub fn as_vec4(&self) -> Vec4 {
        self.normal.extend(self.d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_distance_is_world_units() {
        let p = Plane::from_vec4_normalized(Vec4::new(0.0, 2.0, 0.0, -4.0));
        assert!((p.signed_distance(Vec3::new(5.0, 5.0, 1.0)) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn projection_lands_on_plane() {
        let p = Plane::from_point_normal(Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 1.0, 0.0));
        let q = p.project(Vec3::new(3.0, -2.0, 7.0));
        assert!(p.signed_distance(q).abs() < 1e-5);
    }

    #[test]
    fn three_points_ccw() {
        let p = Plane::from_points(Vec3::ZERO, Vec3::X, Vec3::Y);
        assert!((p.normal - Vec3::Z).length() < 1e-6);
    }
}
