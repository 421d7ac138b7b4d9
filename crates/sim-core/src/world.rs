//! A minimal generational world: spatially isolated demes under divergent
//! truncation selection, driving the genetics engine one generation at a time.

use glam::Vec3;
use rand::Rng;

use crate::config::GeneticsConfig;
use crate::creature::{Creature, CreatureType};
use crate::gene::GeneType;
use crate::genome::{DiploidGenome, Phenotype};
use crate::hybrid::HybridZoneManager;
use crate::mate::MateSelector;
use crate::popgen::{self, Environment, Fixation};
use crate::species::{SpeciationEvent, SpeciesManager};

/// A slab of the world along X with its own selective optimum.
#[derive(Debug, Clone, PartialEq)]
pub struct Deme {
    pub label: String,
    pub min_x: f32,
    pub max_x: f32,
    /// Normalized trait value selection pulls every gene toward.
    pub optimum: f32,
}

impl Deme {
    pub fn new(label: impl Into<String>, min_x: f32, max_x: f32, optimum: f32) -> Self {
        Self { label: label.into(), min_x, max_x, optimum: optimum.clamp(0.0, 1.0) }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min_x && p.x < self.max_x
    }

    fn confine(&self, p: Vec3, depth: f32) -> Vec3 {
        let max_x = self.max_x - 1e-3;
        Vec3::new(p.x.clamp(self.min_x, max_x), p.y, p.z.clamp(-depth, depth))
    }

    /// 1 minus the mean distance of every normalized trait from the optimum.
    pub fn environmental_match(&self, phenotype: &Phenotype) -> f32 {
        let total: f32 = GeneType::all().map(|gt| (phenotype.normalized(gt) - self.optimum).abs()).sum();
        1.0 - total / GeneType::COUNT as f32
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    pub generation: u64,
    pub population: usize,
    pub species: usize,
    pub speciation_events: Vec<SpeciationEvent>,
    pub hybrid_zones: usize,
    pub new_zones: usize,
    pub point_mutations: usize,
    pub mean_heterozygosity: f32,
    pub mean_fitness: f32,
    /// Refreshed on detection generations, carried over otherwise.
    pub fixation: Fixation,
}

pub struct World {
    config: GeneticsConfig,
    demes: Vec<Deme>,
    depth: f32,
    creatures: Vec<Creature>,
    species: SpeciesManager,
    zones: HybridZoneManager,
    environment: Environment,
    generation: u64,
    fixation: Fixation,
}

impl World {
    /// `depth` is the half-extent along Z.
    pub fn new(config: GeneticsConfig, demes: Vec<Deme>, depth: f32) -> Self {
        let species = SpeciesManager::new(config.speciation.clone(), config.mate.clone());
        let zones = HybridZoneManager::new(config.hybrid.clone());
        Self {
            config,
            demes,
            depth: depth.abs(),
            creatures: Vec::new(),
            species,
            zones,
            environment: Environment::default(),
            generation: 0,
            fixation: Fixation::default(),
        }
    }

    /// West and east halves of a square world with opposing optima.
    pub fn two_demes(config: GeneticsConfig, half_extent: f32) -> Self {
        let demes = vec![
            Deme::new("west", -half_extent, 0.0, 0.25),
            Deme::new("east", 0.0, half_extent, 0.75),
        ];
        Self::new(config, demes, half_extent)
    }

    pub fn config(&self) -> &GeneticsConfig {
        &self.config
    }

    pub fn demes(&self) -> &[Deme] {
        &self.demes
    }

    pub fn creatures(&self) -> &[Creature] {
        &self.creatures
    }

    pub fn creatures_mut(&mut self) -> &mut [Creature] {
        &mut self.creatures
    }

    pub fn species(&self) -> &SpeciesManager {
        &self.species
    }

    pub fn zones(&self) -> &HybridZoneManager {
        &self.zones
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = environment;
    }

    pub fn deme_of(&self, p: Vec3) -> Option<usize> {
        self.demes.iter().position(|d| d.contains(p))
    }

    pub fn insert(&mut self, creature: Creature) {
        self.creatures.push(creature);
    }

    /// Spreads `count` founders evenly across the demes and registers the
    /// founding species.
    pub fn populate(&mut self, count: usize, rng: &mut impl Rng) {
        if self.demes.is_empty() {
            return;
        }
        for i in 0..count {
            let deme = &self.demes[i % self.demes.len()];
            let position = Vec3::new(
                rng.gen_range(deme.min_x..deme.max_x),
                0.0,
                rng.gen_range(-self.depth..=self.depth),
            );
            let mut creature = Creature::new(DiploidGenome::founder(&self.config.genome, rng), position, 0);
            creature.velocity = heading(rng) * creature.speed();
            self.creatures.push(creature);
        }
        self.species.update(&mut self.creatures, 0);
        tracing::info!(count, demes = self.demes.len(), "world populated");
    }

    /// Selection score inside `deme`.
    pub fn fitness(&self, creature: &Creature, deme: &Deme) -> f32 {
        deme.environmental_match(&creature.genome.phenotype()) * creature.genetic_fitness()
    }

    /// One non-overlapping generation: truncation selection per deme, mating
    /// among survivors, mutation, population-level passes, then species and
    /// hybrid-zone bookkeeping.
    pub fn step(&mut self, rng: &mut impl Rng) -> GenerationReport {
        self.generation += 1;
        let generation = self.generation;
        let mut next = Vec::with_capacity(self.creatures.len());
        let mut point_mutations = 0;

        for deme in &self.demes {
            let members: Vec<&Creature> = self.creatures.iter().filter(|c| c.alive && deme.contains(c.position)).collect();
            if members.is_empty() {
                continue;
            }
            let target = members.len();
            let mut scored: Vec<(&Creature, f32)> = members.iter().map(|c| (*c, self.fitness(c, deme))).collect();
            scored.sort_by(|a, b| b.1.total_cmp(&a.1));
            let keep = ((target as f32 * self.config.population.survival_fraction).ceil() as usize).clamp(1, target);
            let survivors: Vec<Creature> = scored[..keep].iter().map(|(c, _)| (*c).clone()).collect();
            let breeders: Vec<usize> = (0..survivors.len()).filter(|&i| survivors[i].can_breed()).collect();
            if breeders.len() < 2 {
                tracing::debug!(deme = %deme.label, "deme has too few breeders");
                continue;
            }

            let selector = MateSelector::new(&self.config.mate);
            let mut produced = 0;
            let mut attempts = 0;
            while produced < target && attempts < target * 8 {
                attempts += 1;
                let chooser = &survivors[breeders[rng.gen_range(0..breeders.len())]];
                let mate = match selector.select(chooser, &survivors, rng) {
                    Some(i) => &survivors[i],
                    None => {
                        let other = &survivors[breeders[rng.gen_range(0..breeders.len())]];
                        if other.id() == chooser.id() {
                            continue;
                        }
                        other
                    }
                };
                let child = if chooser.species_id() == mate.species_id() {
                    let genome = DiploidGenome::fertilize(&chooser.genome, &mate.genome, false, rng);
                    Some(Creature::offspring(chooser, mate, genome, chooser.position, generation))
                } else {
                    self.zones.zone_at(chooser.species_id(), mate.species_id(), chooser.position).and_then(|zone| {
                        self.zones.attempt_mating(
                            zone,
                            chooser,
                            mate,
                            &self.config.mate,
                            self.environment.nutrition,
                            generation,
                            rng,
                        )
                    })
                };
                let Some(mut child) = child else { continue };
                let midpoint = (chooser.position + mate.position) * 0.5;
                let jitter = Vec3::new(rng.gen_range(-2.0..=2.0), 0.0, rng.gen_range(-2.0..=2.0));
                child.position = deme.confine(midpoint + jitter, self.depth);
                point_mutations += child.genome.mutate(&self.config.mutation, rng);
                child.creature_type = CreatureType::from_genome(&child.genome);
                child.velocity = heading(rng) * child.speed();
                next.push(child);
                produced += 1;
            }
        }

        // Creatures outside every deme are not subject to selection.
        next.extend(self.creatures.iter().filter(|c| c.alive && self.deme_of(c.position).is_none()).cloned());
        self.creatures = next;

        popgen::apply_environment(&mut self.creatures, self.environment, &self.config.population, rng);
        popgen::apply_drift(&mut self.creatures, &self.config.population, rng);
        popgen::apply_purging(&mut self.creatures, &self.config.population, rng);

        let speciation_events = self.species.update(&mut self.creatures, generation);
        let new_zones = self.zones.update(&self.creatures, generation, rng);
        if generation % self.config.speciation.check_interval.max(1) == 0 {
            self.fixation = popgen::fixation_index(&self.creatures);
        }

        let n = self.creatures.len().max(1) as f32;
        let report = GenerationReport {
            generation,
            population: self.creatures.len(),
            species: self.species.extant_count(),
            speciation_events,
            hybrid_zones: self.zones.active_count(),
            new_zones,
            point_mutations,
            mean_heterozygosity: self.creatures.iter().map(|c| c.genome.heterozygosity()).sum::<f32>() / n,
            mean_fitness: self.creatures.iter().map(Creature::genetic_fitness).sum::<f32>() / n,
            fixation: self.fixation,
        };
        tracing::debug!(
            generation,
            population = report.population,
            species = report.species,
            zones = report.hybrid_zones,
            f_st = report.fixation.f_st,
            "generation"
        );
        report
    }
}

fn heading(rng: &mut impl Rng) -> Vec3 {
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    Vec3::new(angle.cos(), 0.0, angle.sin())
}
