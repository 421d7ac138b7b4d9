//! Puts creatures and plants on the terrain surface.

use std::f32::consts::TAU;

use glam::Vec3;
use rand::Rng;
use renderer::{Biome, Heightmap};
use sim_core::Creature;
use types::{TreeKind, VegetationInstance};

use crate::config::VegetationConfig;

/// Snaps every creature onto the ground, or onto the water surface where the
/// ground is submerged.
pub fn settle(creatures: &mut [Creature], heightmap: &Heightmap) {
    let water = heightmap.config().water_level;
    for creature in creatures {
        let p = creature.position;
        creature.position.y = heightmap.height_at(p.x, p.z).max(water);
    }
}

/// Which tree, if any, grows at a spot of `biome` given a uniform roll in [0, 1).
pub fn tree_for(biome: Biome, roll: f32) -> Option<TreeKind> {
    match biome {
        Biome::Forest => Some(match roll {
            r if r < 0.4 => TreeKind::Oak,
            r if r < 0.7 => TreeKind::Birch,
            r if r < 0.9 => TreeKind::Pine,
            _ => TreeKind::Bush,
        }),
        Biome::Grassland if roll < 0.12 => Some(TreeKind::Bush),
        Biome::Grassland if roll < 0.2 => Some(TreeKind::Oak),
        Biome::Beach if roll < 0.3 => Some(TreeKind::Palm),
        Biome::Beach if roll < 0.4 => Some(TreeKind::Willow),
        Biome::Hills if roll < 0.5 => Some(TreeKind::Pine),
        Biome::Hills if roll < 0.65 => Some(TreeKind::Birch),
        Biome::Mountain if roll < 0.25 => Some(TreeKind::Pine),
        _ => None,
    }
}

pub fn grows_grass(biome: Biome) -> bool {
    matches!(biome, Biome::Grassland | Biome::Forest | Biome::Hills)
}

/// Random trees and grass inside the square `[-half_extent, half_extent]²`,
/// each standing on the terrain. Attempts landing on unsuitable biomes are
/// dropped.
pub fn scatter_vegetation(
    heightmap: &Heightmap,
    half_extent: f32,
    config: &VegetationConfig,
    rng: &mut impl Rng,
) -> Vec<VegetationInstance> {
    let mut plants = Vec::with_capacity(config.tree_attempts / 2 + config.grass_attempts / 2);
    for _ in 0..config.tree_attempts {
        let (position, biome) = spot(heightmap, half_extent, rng);
        let Some(kind) = tree_for(biome, rng.gen()) else { continue };
        let size = rng.gen_range(0.8..1.25);
        let squash = rng.gen_range(0.9..1.1);
        plants.push(VegetationInstance::tree(
            kind,
            position,
            rng.gen_range(0.0..TAU),
            Vec3::new(size * squash, size, size * squash),
        ));
    }
    let trees = plants.len();

    for _ in 0..config.grass_attempts {
        let (position, biome) = spot(heightmap, half_extent, rng);
        if !grows_grass(biome) {
            continue;
        }
        let height = rng.gen_range(0.7..1.3);
        plants.push(VegetationInstance::grass(position, rng.gen_range(0.0..TAU), Vec3::new(1.0, height, 1.0)));
    }

    tracing::info!(trees, grass = plants.len() - trees, "vegetation scattered");
    plants
}

fn spot(heightmap: &Heightmap, half_extent: f32, rng: &mut impl Rng) -> (Vec3, Biome) {
    let x = rng.gen_range(-half_extent..=half_extent);
    let z = rng.gen_range(-half_extent..=half_extent);
    (Vec3::new(x, heightmap.height_at(x, z), z), heightmap.biome_at(x, z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use renderer::config::TerrainConfig;
    use sim_core::{DiploidGenome, GenomeConfig};

    fn heightmap() -> Heightmap {
        Heightmap::new(&TerrainConfig { world_size: 512.0, ..TerrainConfig::default() })
    }

    #[test]
    fn water_and_rock_grow_no_trees() {
        for roll in [0.0, 0.3, 0.6, 0.99] {
            assert_eq!(tree_for(Biome::DeepWater, roll), None);
            assert_eq!(tree_for(Biome::ShallowWater, roll), None);
            assert_eq!(tree_for(Biome::Rock, roll), None);
            assert_eq!(tree_for(Biome::Snow, roll), None);
            assert!(tree_for(Biome::Forest, roll).is_some());
        }
        assert_eq!(tree_for(Biome::Beach, 0.1), Some(TreeKind::Palm));
        assert!(!grows_grass(Biome::Beach));
    }

    #[test]
    fn scatter_is_seeded_and_on_suitable_ground() {
        let map = heightmap();
        let config = VegetationConfig { tree_attempts: 200, grass_attempts: 500 };
        let a = scatter_vegetation(&map, 200.0, &config, &mut ChaCha8Rng::seed_from_u64(3));
        let b = scatter_vegetation(&map, 200.0, &config, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(a, b);
        assert!(a.len() <= 700);
        for plant in &a {
            let p = plant.position;
            assert!(p.x.abs() <= 200.0 && p.z.abs() <= 200.0);
            assert!((p.y - map.height_at(p.x, p.z)).abs() < 1e-4);
            let biome = map.biome_at(p.x, p.z);
            match plant.tree_kind() {
                Some(_) => assert!(tree_for(biome, 0.0).is_some()),
                None => assert!(grows_grass(biome)),
            }
        }
    }

    #[test]
    fn settled_creatures_stand_on_ground_or_water() {
        let map = heightmap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut creatures: Vec<Creature> = (0..20)
            .map(|i| {
                let genome = DiploidGenome::founder(&GenomeConfig::default(), &mut rng);
                Creature::new(genome, Vec3::new(i as f32 * 20.0 - 200.0, 50.0, 30.0), 0)
            })
            .collect();
        settle(&mut creatures, &map);
        for c in &creatures {
            let ground = map.height_at(c.position.x, c.position.z);
            assert_eq!(c.position.y, ground.max(map.config().water_level));
        }
    }
}
