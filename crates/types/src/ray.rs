use crate::math::Vec3;
use crate::plane::Plane;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length.
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction: direction.normalize_or(Vec3::NEG_Z) }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Distance along the ray to the plane, if it is hit in front of the origin.
    pub fn intersect_plane(&self, plane: &Plane) -> Option<f32> {
        let denom = plane.normal.dot(self.direction);
        if denom.abs() < 1e-8 {
            return None;
        }
        let t = -plane.signed_distance(self.origin) / denom;
        (t >= 0.0).then_some(t)
    }

    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        let t = (p - self.origin).dot(self.direction).max(0.0);
        self.at(t)
    }

    pub fn distance_to_point(&self, p: Vec3) -> f32 {
        (self.closest_point(p) - p).length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_hit() {
        let ray = Ray::new(Vec3::new(0.0, 10.0, 0.0), Vec3::new(0.0, -2.0, 0.0));
        let ground = Plane::from_point_normal(Vec3::ZERO, Vec3::Y);
        assert_eq!(ray.intersect_plane(&ground), Some(10.0));
        let up = Ray::new(Vec3::new(0.0, 10.0, 0.0), Vec3::Y);
        assert_eq!(up.intersect_plane(&ground), None);
    }

    #[test]
    fn closest_point_behind_origin_is_origin() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        assert_eq!(ray.closest_point(Vec3::new(-5.0, 1.0, 0.0)), Vec3::ZERO);
        assert!((ray.distance_to_point(Vec3::new(3.0, 4.0, 0.0)) - 4.0).abs() < 1e-6);
    }
}
