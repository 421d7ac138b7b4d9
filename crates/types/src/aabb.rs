use crate::math::{Mat4, Vec3};
use crate::ray::Ray;

/// Axis-aligned bounding box. Starts empty (`min = +inf`, `max = -inf`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self { min: center - half_extents, max: center + half_extents }
    }

    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        let mut b = Self::EMPTY;
        for p in points {
            b.encapsulate(p);
        }
        b
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    pub fn encapsulate(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn encapsulate_box(&mut self, other: &Aabb) {
        if other.is_valid() {
            self.encapsulate(other.min);
            self.encapsulate(other.max);
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Radius of the sphere centred on `center()` that encloses the box.
    pub fn bounding_radius(&self) -> f32 {
        if !self.is_valid() {
            return 0.0;
        }
        self.extents().length()
    }

    pub fn contains(&self, p: Vec3) -> bool {
        self.is_valid()
            && p.x >= self.min.x
            && p.y >= self.min.y
            && p.z >= self.min.z
            && p.x <= self.max.x
            && p.y <= self.max.y
            && p.z <= self.max.z
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.is_valid()
            && other.is_valid()
            && self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        p.clamp(self.min, self.max)
    }

    /// Bounds of the eight transformed corners.
    pub fn transformed(&self, m: &Mat4) -> Aabb {
        if !self.is_valid() {
            return *self;
        }
        let mut out = Aabb::EMPTY;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.encapsulate(m.transform_point3(corner));
        }
        out
    }

    /// Slab test. Returns the entry distance along the ray, or `None`.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        if !self.is_valid() {
            return None;
        }
        let inv = ray.direction.recip();
        let t0 = (self.min - ray.origin) * inv;
        let t1 = (self.max - ray.origin) * inv;
        let t_near = t0.min(t1).max_element();
        let t_far = t0.max(t1).min_element();
        if t_far < 0.0 || t_near > t_far {
            return None;
        }
        Some(t_near.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_contains_and_intersects_nothing() {
        let empty = Aabb::default();
        assert!(!empty.is_valid());
        assert!(!empty.contains(Vec3::ZERO));
        let unit = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert!(!empty.intersects(&unit));
        assert!(!unit.intersects(&empty));
        assert!(!empty.intersects(&empty));
    }

    #[test]
    fn encapsulate_makes_valid() {
        let mut b = Aabb::EMPTY;
        b.encapsulate(Vec3::new(1.0, 2.0, 3.0));
        assert!(b.is_valid());
        assert!(b.contains(Vec3::new(1.0, 2.0, 3.0)));
        b.encapsulate(Vec3::new(-1.0, 0.0, 5.0));
        assert_eq!(b.min, Vec3::new(-1.0, 0.0, 3.0));
        assert_eq!(b.max, Vec3::new(1.0, 2.0, 5.0));
    }

    #[test]
    fn transformed_box_contains_transformed_corners() {
        let b = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let m = Mat4::from_rotation_y(0.8) * Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0));
        let t = b.transformed(&m);
        assert!(t.contains(m.transform_point3(Vec3::new(1.0, 1.0, 1.0))));
        assert!(t.contains(m.transform_point3(Vec3::ZERO)));
    }

    #[test]
    fn ray_hits_and_misses() {
        let b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let hit = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z);
        assert!((b.intersect_ray(&hit).unwrap() - 4.0).abs() < 1e-6);
        let miss = Ray::new(Vec3::new(3.0, 0.0, 5.0), Vec3::NEG_Z);
        assert!(b.intersect_ray(&miss).is_none());
        let inside = Ray::new(Vec3::ZERO, Vec3::X);
        assert_eq!(b.intersect_ray(&inside), Some(0.0));
    }

    #[test]
    fn closest_point_clamps() {
        let b = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(b.closest_point(Vec3::new(2.0, 0.5, -1.0)), Vec3::new(1.0, 0.5, 0.0));
    }
}
