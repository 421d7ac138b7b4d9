//! Hybrid zones: detection where two species overlap in space, per-zone
//! statistics and cross-species mating through a zone.

use std::collections::BTreeMap;

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{HybridZoneConfig, MateConfig};
use crate::creature::Creature;
use crate::genome::DiploidGenome;
use crate::mate::compatibility;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HybridZoneType {
    /// Hybrids are selected against at the center.
    Tension,
    /// Hybrids do better at the center than either parent.
    BoundedHybrid,
    /// Hybrid fitness follows the local environment.
    Mosaic,
    /// Hybrid fitness varies sinusoidally across the zone.
    Parapatric,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridZoneStats {
    /// Hybrids with two non-hybrid parents produced through the zone.
    pub f1_count: u64,
    /// Hybrids with at least one hybrid parent produced through the zone.
    pub backcross_count: u64,
    /// Hybrids currently inside the zone.
    pub hybrid_count: usize,
    pub mean_hybrid_fitness: f32,
    pub width: f32,
    /// Share of zone residents that are hybrids.
    pub introgression: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HybridZone {
    pub species: (u64, u64),
    pub centroid: Vec3,
    pub radius: f32,
    /// Unit XZ direction from the first species' overlap toward the second's.
    pub axis: Vec3,
    pub zone_type: HybridZoneType,
    pub stats: HybridZoneStats,
    pub created_generation: u64,
    active: bool,
    generations_without_hybrids: u64,
}

impl HybridZone {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn involves(&self, a: u64, b: u64) -> bool {
        self.species == ordered(a, b)
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.distance(self.centroid) <= self.radius
    }

    /// Fitness multiplier for a hybrid born at `position`. `environment` is
    /// the local environmental feature in [0, 1], used by mosaic zones.
    pub fn fitness_modifier(&self, position: Vec3, environment: f32) -> f32 {
        let radius = self.radius.max(1e-3);
        let center = 1.0 - (position.distance(self.centroid) / radius).clamp(0.0, 1.0);
        match self.zone_type {
            HybridZoneType::Tension => 1.0 - 0.3 * center,
            HybridZoneType::BoundedHybrid => 1.0 + 0.2 * center,
            HybridZoneType::Mosaic => 1.0 + 0.3 * (environment.clamp(0.0, 1.0) - 0.5),
            HybridZoneType::Parapatric => {
                let s = ((position - self.centroid).dot(self.axis) / radius).clamp(-1.0, 1.0);
                1.0 + 0.15 * (s * std::f32::consts::PI).sin()
            }
        }
    }
}

fn ordered(a: u64, b: u64) -> (u64, u64) {
    (a.min(b), a.max(b))
}

pub struct HybridZoneManager {
    config: HybridZoneConfig,
    zones: Vec<HybridZone>,
}

impl HybridZoneManager {
    pub fn new(config: HybridZoneConfig) -> Self {
        Self { config, zones: Vec::new() }
    }

    pub fn zones(&self) -> &[HybridZone] {
        &self.zones
    }

    pub fn active_zones(&self) -> impl Iterator<Item = &HybridZone> {
        self.zones.iter().filter(|z| z.active)
    }

    pub fn active_count(&self) -> usize {
        self.active_zones().count()
    }

    /// Index of the active zone for a species pair.
    pub fn zone_for(&self, a: u64, b: u64) -> Option<usize> {
        self.zones.iter().position(|z| z.active && z.involves(a, b))
    }

    /// Index of the active zone covering `position` for a species pair.
    pub fn zone_at(&self, a: u64, b: u64, position: Vec3) -> Option<usize> {
        self.zone_for(a, b).filter(|&i| self.zones[i].contains(position))
    }

    /// Updates existing zones, then opens zones for newly overlapping pairs.
    /// Returns how many zones were created.
    pub fn update(&mut self, creatures: &[Creature], generation: u64, rng: &mut impl Rng) -> usize {
        let mut by_species: BTreeMap<u64, Vec<&Creature>> = BTreeMap::new();
        for c in creatures.iter().filter(|c| c.alive && c.species_id() != 0) {
            by_species.entry(c.species_id()).or_default().push(c);
        }

        let config = self.config.clone();
        let mut closed = Vec::new();
        for zone in self.zones.iter_mut().filter(|z| z.active) {
            update_zone(zone, &by_species, &config, generation);
            if !zone.active {
                closed.push(zone.species);
            }
        }

        let ids: Vec<u64> = by_species.keys().copied().collect();
        let mut created = 0;
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                // A zone closed this pass may reopen from the next one on.
                if self.zone_for(a, b).is_some() || closed.contains(&ordered(a, b)) {
                    continue;
                }
                if let Some(zone) = detect_zone(&by_species[&a], &by_species[&b], &config, generation, rng) {
                    tracing::info!(
                        species_a = a,
                        species_b = b,
                        zone_type = ?zone.zone_type,
                        x = zone.centroid.x,
                        z = zone.centroid.z,
                        radius = zone.radius,
                        generation,
                        "hybrid zone formed"
                    );
                    self.zones.push(zone);
                    created += 1;
                }
            }
        }
        created
    }

    /// Cross-species mating through zone `index`: a pre-mating roll, then a
    /// hybrid offspring carrying the zone's fitness modifier plus hybrid vigor,
    /// sterile with the sterility probability.
    pub fn attempt_mating(
        &mut self,
        index: usize,
        a: &Creature,
        b: &Creature,
        mate: &MateConfig,
        environment: f32,
        generation: u64,
        rng: &mut impl Rng,
    ) -> Option<Creature> {
        let zone = self.zones.get_mut(index).filter(|z| z.active)?;
        let compat = compatibility(&a.genome, &b.genome, mate);
        if !rng.gen_bool(compat.mating_success().clamp(0.0, 1.0) as f64) {
            return None;
        }
        let genome = DiploidGenome::fertilize(&a.genome, &b.genome, true, rng);
        let position = (a.position + b.position) * 0.5;
        let mut child = Creature::offspring(a, b, genome, position, generation);
        child.fitness_modifier = zone.fitness_modifier(position, environment) + compat.hybrid_vigor;
        child.sterile = rng.gen_bool(compat.sterility.clamp(0.0, 1.0) as f64);
        if child.hybrid_parentage {
            zone.stats.backcross_count += 1;
        } else {
            zone.stats.f1_count += 1;
        }
        Some(child)
    }
}

fn update_zone(
    zone: &mut HybridZone,
    by_species: &BTreeMap<u64, Vec<&Creature>>,
    config: &HybridZoneConfig,
    generation: u64,
) {
    let (a, b) = zone.species;
    let empty = Vec::new();
    let residents: Vec<&Creature> = by_species
        .get(&a)
        .unwrap_or(&empty)
        .iter()
        .chain(by_species.get(&b).unwrap_or(&empty))
        .copied()
        .filter(|c| zone.contains(c.position))
        .collect();
    let hybrids: Vec<&Creature> = residents.iter().copied().filter(|c| c.is_hybrid()).collect();

    if !hybrids.is_empty() {
        let centroid = hybrids.iter().map(|c| c.position).sum::<Vec3>() / hybrids.len() as f32;
        let alpha = config.centroid_smoothing.clamp(0.0, 1.0);
        zone.centroid = zone.centroid * (1.0 - alpha) + centroid * alpha;
        zone.generations_without_hybrids = 0;
        let fitness: Vec<f32> = hybrids.iter().map(|c| c.fitness_modifier).collect();
        let mean = fitness.iter().sum::<f32>() / fitness.len() as f32;
        let spread = (fitness.iter().map(|f| (f - mean) * (f - mean)).sum::<f32>() / fitness.len() as f32).sqrt();
        zone.stats.mean_hybrid_fitness = mean;
        zone.zone_type = match zone.zone_type {
            HybridZoneType::Tension if mean > 1.05 => HybridZoneType::BoundedHybrid,
            HybridZoneType::BoundedHybrid if mean < 0.95 => HybridZoneType::Tension,
            _ if spread > 0.2 => HybridZoneType::Mosaic,
            other => other,
        };
    } else {
        zone.generations_without_hybrids += 1;
    }

    let reach = zone.radius + config.detection_radius;
    let projections: Vec<f32> = by_species
        .get(&a)
        .unwrap_or(&empty)
        .iter()
        .chain(by_species.get(&b).unwrap_or(&empty))
        .filter(|c| c.position.distance(zone.centroid) <= reach)
        .map(|c| (c.position - zone.centroid).dot(zone.axis))
        .collect();
    zone.stats.width = extent(&projections);
    if zone.stats.width > 4.0 * zone.radius.max(config.detection_radius) && zone.zone_type != HybridZoneType::Mosaic {
        zone.zone_type = HybridZoneType::Parapatric;
    }
    zone.stats.hybrid_count = hybrids.len();
    zone.stats.introgression = if residents.is_empty() { 0.0 } else { hybrids.len() as f32 / residents.len() as f32 };

    let hybrids_gone = hybrids.is_empty() && zone.generations_without_hybrids > config.grace_generations;
    if zone.stats.width < config.min_width || hybrids_gone {
        zone.active = false;
        tracing::info!(
            species_a = a,
            species_b = b,
            width = zone.stats.width,
            generation,
            "hybrid zone closed"
        );
    }
}

fn detect_zone(
    xs: &[&Creature],
    ys: &[&Creature],
    config: &HybridZoneConfig,
    generation: u64,
    rng: &mut impl Rng,
) -> Option<HybridZone> {
    let r2 = config.detection_radius * config.detection_radius;
    let mut in_x = vec![false; xs.len()];
    let mut in_y = vec![false; ys.len()];
    for (i, x) in xs.iter().enumerate() {
        for (j, y) in ys.iter().enumerate() {
            if x.position.distance_squared(y.position) <= r2 {
                in_x[i] = true;
                in_y[j] = true;
            }
        }
    }
    let px: Vec<Vec3> = xs.iter().zip(&in_x).filter(|(_, hit)| **hit).map(|(c, _)| c.position).collect();
    let py: Vec<Vec3> = ys.iter().zip(&in_y).filter(|(_, hit)| **hit).map(|(c, _)| c.position).collect();
    let count = px.len() + py.len();
    if count < config.min_overlap.max(1) || px.is_empty() || py.is_empty() {
        return None;
    }
    let all: Vec<Vec3> = px.iter().chain(&py).copied().collect();
    let centroid = all.iter().copied().sum::<Vec3>() / count as f32;
    let radius = all.iter().map(|p| p.distance(centroid)).fold(0.0f32, f32::max).max(config.detection_radius);
    let cx = px.iter().copied().sum::<Vec3>() / px.len() as f32;
    let cy = py.iter().copied().sum::<Vec3>() / py.len() as f32;
    let axis = Vec3::new(cy.x - cx.x, 0.0, cy.z - cx.z).try_normalize().unwrap_or(Vec3::X);
    let projections: Vec<f32> = all.iter().map(|p| (*p - centroid).dot(axis)).collect();
    let zone_type = if rng.gen_bool(0.5) { HybridZoneType::Tension } else { HybridZoneType::BoundedHybrid };
    let species = ordered(xs[0].species_id(), ys[0].species_id());
    Some(HybridZone {
        species,
        centroid,
        radius,
        axis,
        zone_type,
        stats: HybridZoneStats { width: extent(&projections), ..Default::default() },
        created_generation: generation,
        active: true,
        generations_without_hybrids: 0,
    })
}

fn extent(values: &[f32]) -> f32 {
    let (lo, hi) = values.iter().fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if values.is_empty() {
        0.0
    } else {
        hi - lo
    }
}
