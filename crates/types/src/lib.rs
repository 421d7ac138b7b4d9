pub mod grid;
pub mod math;
pub mod transform;
pub mod aabb;
pub mod ray;
pub mod plane;
pub mod frustum;
pub mod mesh;
pub mod vegetation;
pub mod fatal;

pub use grid::*;
pub use math::*;
pub use transform::Transform;
pub use aabb::Aabb;
pub use ray::Ray;
pub use plane::Plane;
pub use frustum::{Containment, Frustum, FrustumPlane};
pub use mesh::{grid_indices, MeshData, MeshDataError, Vertex};
pub use vegetation::{TreeKind, VegetationInstance, VegetationKind};
pub use fatal::{fatal, OrFatal};
