//! Creature meshes shared by every individual whose morphology quantizes to
//! the same [`MeshKey`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rhi::{Backend, Device, RhiError};
use sim_core::{Allele, CreatureType, DiploidGenome, GeneType, GenomeConfig};
use types::MeshData;

use crate::gpu_mesh::GpuMesh;

/// Categorical morphology. Genomes that agree on every field share a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshKey {
    pub creature_type: CreatureType,
    /// 0..=3: tiny, small, medium, large.
    pub size: u8,
    /// 0..=2.
    pub speed: u8,
    /// 0..=4.
    pub body_plan: u8,
    /// 0..=4.
    pub head: u8,
    /// 0..=5.
    pub tail: u8,
    /// Efficiency, vision range and motion detection, two bits each.
    pub detail: u8,
}

impl MeshKey {
    pub fn new(genome: &DiploidGenome, creature_type: CreatureType) -> Self {
        let p = genome.phenotype();
        let detail = (quantize(p.normalized(GeneType::Efficiency), 4) << 4)
            | (quantize(p.normalized(GeneType::VisionRange), 4) << 2)
            | quantize(p.normalized(GeneType::MotionDetection), 4);
        Self {
            creature_type,
            size: size_bucket(p.get(GeneType::Size)),
            speed: speed_bucket(p.get(GeneType::Speed)),
            body_plan: quantize(p.normalized(GeneType::BodyElongation), 5),
            head: quantize(p.normalized(GeneType::HeadShape), 5),
            tail: quantize(p.normalized(GeneType::TailLength), 6),
            detail,
        }
    }

    /// Representative body scale of the size bucket.
    pub fn nominal_size(&self) -> f32 {
        SIZE_BUCKET_CENTERS[usize::from(self.size.min(3))]
    }
}

const SIZE_BUCKET_CENTERS: [f32; 4] = [0.6, 1.0, 1.4, 2.0];

pub fn size_bucket(size: f32) -> u8 {
    if size < 0.8 {
        0
    } else if size < 1.2 {
        1
    } else if size < 1.6 {
        2
    } else {
        3
    }
}

pub fn speed_bucket(speed: f32) -> u8 {
    if speed < 0.8 {
        0
    } else if speed < 1.6 {
        1
    } else {
        2
    }
}

/// Maps `t` in [0, 1] onto `0..levels`.
fn quantize(t: f32, levels: u8) -> u8 {
    ((t.clamp(0.0, 1.0) * f32::from(levels)) as u8).min(levels - 1)
}

/// Produces a triangle mesh for a genome. Output is validated by the cache.
pub trait MeshGenerator: Send + Sync {
    fn generate(&self, genome: &DiploidGenome, creature_type: CreatureType) -> MeshData;
}

impl<F> MeshGenerator for F
where
    F: Fn(&DiploidGenome, CreatureType) -> MeshData + Send + Sync,
{
    fn generate(&self, genome: &DiploidGenome, creature_type: CreatureType) -> MeshData {
        self(genome, creature_type)
    }
}

/// Primitive-assembly bodies: an ellipsoid torso with head, tail, legs and
/// type-specific appendages, all built at unit size.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimitiveCreatures;

impl MeshGenerator for PrimitiveCreatures {
    fn generate(&self, genome: &DiploidGenome, creature_type: CreatureType) -> MeshData {
        let key = MeshKey::new(genome, creature_type);
        let elongation = 1.0 + f32::from(key.body_plan) * 0.25;
        let segments = 10 + u32::from(key.detail >> 4) * 2;
        let mut mesh = MeshData::default();

        let torso = MeshData::uv_sphere(0.5, segments, segments / 2 + 2);
        mesh.append_transformed(&torso, &Mat4::from_scale(Vec3::new(0.55, 0.45, 0.5 * elongation)));

        let head_radius = 0.18 + f32::from(key.head) * 0.03;
        let head = MeshData::uv_sphere(head_radius, segments, segments / 2 + 2);
        let head_z = 0.25 * elongation + head_radius * 0.8;
        let head_shape = Vec3::new(1.0, 1.0 - f32::from(key.head) * 0.08, 1.0 + f32::from(key.head) * 0.15);
        mesh.append_transformed(&head, &Mat4::from_scale_rotation_translation(head_shape, Quat::IDENTITY, Vec3::new(0.0, 0.15, head_z)));

        if key.tail > 0 {
            let length = 0.15 * f32::from(key.tail);
            let tail = MeshData::cylinder(0.08, 0.0, length, 6);
            let rotation = Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2 - 0.3);
            mesh.append_transformed(&tail, &Mat4::from_rotation_translation(rotation, Vec3::new(0.0, 0.05, -0.22 * elongation)));
        }

        let leg_length = 0.2 + f32::from(key.speed) * 0.08;
        let legs: &[(f32, f32)] = match creature_type {
            CreatureType::Aquatic => &[],
            CreatureType::Flying => &[(0.12, 0.05), (-0.12, 0.05)],
            _ => &[(0.18, 0.15), (-0.18, 0.15), (0.18, -0.15), (-0.18, -0.15)],
        };
        let leg = MeshData::cylinder(0.05, 0.04, leg_length, 6);
        for &(x, z) in legs {
            mesh.append_transformed(&leg, &Mat4::from_translation(Vec3::new(x, -0.15 - leg_length, z * elongation)));
        }

        match creature_type {
            CreatureType::Flying => {
                let wing = MeshData::cuboid(Vec3::new(0.45, 0.02, 0.15));
                for side in [-1.0f32, 1.0] {
                    mesh.append_transformed(&wing, &Mat4::from_translation(Vec3::new(side * 0.6, 0.1, 0.0)));
                }
            }
            CreatureType::Aquatic | CreatureType::Amphibian => {
                let fin = MeshData::cuboid(Vec3::new(0.02, 0.15, 0.12));
                mesh.append_transformed(&fin, &Mat4::from_translation(Vec3::new(0.0, 0.35, 0.0)));
            }
            _ => {}
        }
        mesh
    }
}

/// Meshes are never evicted.
pub struct MeshCache<B: Backend> {
    generator: Box<dyn MeshGenerator>,
    meshes: HashMap<MeshKey, Arc<GpuMesh<B>>>,
    fallbacks: HashSet<MeshKey>,
}

impl<B: Backend> MeshCache<B> {
    pub fn new(generator: impl MeshGenerator + 'static) -> Self {
        Self { generator: Box::new(generator), meshes: HashMap::new(), fallbacks: HashSet::new() }
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn fallback_count(&self) -> usize {
        self.fallbacks.len()
    }

    /// Whether the generator's output for `key` was rejected and a sphere stands in.
    pub fn is_fallback(&self, key: &MeshKey) -> bool {
        self.fallbacks.contains(key)
    }

    pub fn get(&self, key: &MeshKey) -> Option<&Arc<GpuMesh<B>>> {
        self.meshes.get(key)
    }

    /// Cached mesh for the genome's key, generating and uploading it on first use.
    pub fn get_mesh(
        &mut self,
        device: &Device<B>,
        genome: &DiploidGenome,
        creature_type: CreatureType,
    ) -> Result<Arc<GpuMesh<B>>, RhiError> {
        self.get_keyed(device, genome, creature_type).map(|(_, mesh)| mesh)
    }

    /// [`Self::get_mesh`] that also returns the key the genome quantized to.
    pub fn get_keyed(
        &mut self,
        device: &Device<B>,
        genome: &DiploidGenome,
        creature_type: CreatureType,
    ) -> Result<(MeshKey, Arc<GpuMesh<B>>), RhiError> {
        let key = MeshKey::new(genome, creature_type);
        if let Some(mesh) = self.meshes.get(&key) {
            return Ok((key, Arc::clone(mesh)));
        }

        let generated = self.generator.generate(genome, creature_type);
        let data = match generated.validate() {
            Ok(()) => generated,
            Err(e) => {
                let radius = 0.5 * key.nominal_size();
                tracing::warn!(?key, error = %e, radius, "generated creature mesh rejected; using sphere");
                self.fallbacks.insert(key);
                MeshData::uv_sphere(radius, 12, 8)
            }
        };
        let label = format!("creature_{:?}_{}", key.creature_type, self.meshes.len());
        let mesh = Arc::new(GpuMesh::upload(device, &label, &data)?);
        tracing::debug!(?key, vertices = mesh.vertex_count, indices = mesh.index_count, "creature mesh cached");
        self.meshes.insert(key, Arc::clone(&mesh));
        Ok((key, mesh))
    }

    /// Warms the cache with every creature type at every size bucket.
    pub fn preload(&mut self, device: &Device<B>) -> Result<usize, RhiError> {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        let before = self.meshes.len();
        for creature_type in CreatureType::ALL {
            for size in SIZE_BUCKET_CENTERS {
                let mut genome = DiploidGenome::founder(&GenomeConfig::default(), &mut rng);
                set_trait(&mut genome, GeneType::Size, size);
                self.get_mesh(device, &genome, creature_type)?;
            }
        }
        let added = self.meshes.len() - before;
        tracing::info!(added, total = self.meshes.len(), "creature meshes preloaded");
        Ok(added)
    }
}

/// Makes every copy of `gene_type` homozygous for `value`.
fn set_trait(genome: &mut DiploidGenome, gene_type: GeneType, value: f32) {
    for gene in genome.genes_mut().filter(|g| g.gene_type == gene_type) {
        gene.maternal = Allele::new(value, 0.5);
        gene.paternal = Allele::new(value, 0.5);
        gene.base_expression = 1.0;
        gene.marks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhi::headless::HeadlessBackend;
    use rhi::DeviceDesc;

    fn device() -> Device<HeadlessBackend> {
        Device::new(HeadlessBackend::new(), &DeviceDesc::default())
    }

    fn genome(seed: u64) -> DiploidGenome {
        DiploidGenome::founder(&GenomeConfig::default(), &mut ChaCha8Rng::seed_from_u64(seed))
    }

    #[test]
    fn buckets_follow_thresholds() {
        assert_eq!(size_bucket(0.79), 0);
        assert_eq!(size_bucket(0.8), 1);
        assert_eq!(size_bucket(1.59), 2);
        assert_eq!(size_bucket(3.0), 3);
        assert_eq!(speed_bucket(0.2), 0);
        assert_eq!(speed_bucket(1.0), 1);
        assert_eq!(speed_bucket(2.5), 2);
        assert_eq!(quantize(1.0, 6), 5);
        assert_eq!(quantize(0.0, 5), 0);
    }

    #[test]
    fn key_fields_stay_in_range() {
        for seed in 0..20 {
            let key = MeshKey::new(&genome(seed), CreatureType::Herbivore);
            assert!(key.size <= 3 && key.speed <= 2 && key.body_plan <= 4 && key.head <= 4 && key.tail <= 5);
            assert!(key.detail < 64);
        }
    }

    #[test]
    fn primitive_meshes_validate() {
        let g = genome(1);
        for ty in CreatureType::ALL {
            let mesh = PrimitiveCreatures.generate(&g, ty);
            assert!(mesh.validate().is_ok(), "{ty:?}");
            assert!(mesh.bounds.bounding_radius() > 0.3);
        }
    }

    #[test]
    fn invalid_output_falls_back_to_sphere() {
        let device = device();
        let mut cache = MeshCache::new(|_: &DiploidGenome, _: CreatureType| MeshData::default());
        let mut g = genome(2);
        set_trait(&mut g, GeneType::Size, 2.5);
        let (key, mesh) = cache.get_keyed(&device, &g, CreatureType::Carnivore).unwrap();
        assert!(cache.is_fallback(&key));
        assert_eq!(cache.fallback_count(), 1);
        assert!((mesh.bounds.extents().x - 1.0).abs() < 0.05);
        assert!(mesh.index_count % 3 == 0 && mesh.index_count > 0);
    }

    #[test]
    fn preload_covers_types_and_sizes() {
        let device = device();
        let mut cache = MeshCache::new(PrimitiveCreatures);
        let added = cache.preload(&device).unwrap();
        assert_eq!(added, cache.len());
        let mut sizes: Vec<u8> = Vec::new();
        let mut types: Vec<CreatureType> = Vec::new();
        for ty in CreatureType::ALL {
            for size in SIZE_BUCKET_CENTERS {
                let mut g = genome(9);
                set_trait(&mut g, GeneType::Size, size);
                let key = MeshKey::new(&g, ty);
                sizes.push(key.size);
                types.push(key.creature_type);
            }
        }
        sizes.sort_unstable();
        sizes.dedup();
        types.dedup();
        assert_eq!(sizes, vec![0, 1, 2, 3]);
        assert_eq!(types.len(), 6);
        assert!(cache.len() >= 24);
        assert_eq!(device.backend().stats().validation_errors, 0);
    }
}
