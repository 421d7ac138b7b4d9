use crate::math::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TreeKind {
    Oak,
    Pine,
    Birch,
    Willow,
    Palm,
    Bush,
}

impl TreeKind {
    pub const ALL: [TreeKind; 6] = [
        TreeKind::Oak,
        TreeKind::Pine,
        TreeKind::Birch,
        TreeKind::Willow,
        TreeKind::Palm,
        TreeKind::Bush,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VegetationKind {
    Tree(TreeKind),
    Grass,
}

/// One placed plant as handed over by the vegetation manager.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VegetationInstance {
    pub position: Vec3,
    /// Yaw about +Y, radians.
    pub rotation: f32,
    pub scale: Vec3,
    pub kind: VegetationKind,
}

impl VegetationInstance {
    pub fn tree(kind: TreeKind, position: Vec3, rotation: f32, scale: Vec3) -> Self {
        Self { position, rotation, scale, kind: VegetationKind::Tree(kind) }
    }

    pub fn grass(position: Vec3, rotation: f32, scale: Vec3) -> Self {
        Self { position, rotation, scale, kind: VegetationKind::Grass }
    }

    pub fn tree_kind(&self) -> Option<TreeKind> {
        match self.kind {
            VegetationKind::Tree(k) => Some(k),
            VegetationKind::Grass => None,
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, Quat::from_rotation_y(self.rotation), self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_matrix_places_origin_at_position() {
        let v = VegetationInstance::tree(TreeKind::Pine, Vec3::new(1.0, 2.0, 3.0), 0.5, Vec3::new(1.0, 3.0, 1.0));
        assert_eq!(v.model_matrix().transform_point3(Vec3::ZERO), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(v.tree_kind(), Some(TreeKind::Pine));
        assert_eq!(VegetationInstance::grass(Vec3::ZERO, 0.0, Vec3::ONE).tree_kind(), None);
    }
}
