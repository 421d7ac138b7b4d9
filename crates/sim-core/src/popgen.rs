//! Population-level genetics: F_ST, drift, purging and environmental epigenetics.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;

use crate::config::PopulationConfig;
use crate::creature::Creature;
use crate::gene::GeneType;

/// Expected normalized difference between two alleles drawn at random from
/// the pooled effective allele values of `creatures`, averaged over gene types.
pub fn pool_heterozygosity(creatures: &[&Creature]) -> f32 {
    let mut pools: Vec<Vec<f32>> = vec![Vec::new(); GeneType::COUNT];
    for c in creatures {
        for gene in c.genome.genes() {
            let range = gene.range();
            let pool = &mut pools[gene.gene_type.index()];
            pool.push(range.normalize(gene.maternal.effective_value()));
            pool.push(range.normalize(gene.paternal.effective_value()));
        }
    }
    let per_type: Vec<f32> = pools
        .par_iter_mut()
        .filter(|values| values.len() >= 2)
        .map(|values| mean_abs_difference(values))
        .collect();
    if per_type.is_empty() {
        0.0
    } else {
        per_type.iter().sum::<f32>() / per_type.len() as f32
    }
}

/// Mean |a - b| over all ordered pairs, via the sorted-rank identity.
fn mean_abs_difference(values: &mut [f32]) -> f32 {
    values.sort_by(f32::total_cmp);
    let n = values.len() as f64;
    let weighted: f64 = values.iter().enumerate().map(|(i, v)| (2.0 * i as f64 - n + 1.0) * *v as f64).sum();
    (2.0 * weighted / (n * n)) as f32
}

/// Heterozygosity partition of a population across its species.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Fixation {
    pub h_s: f32,
    pub h_t: f32,
    pub f_st: f32,
}

/// F_ST = (H_T - H_S) / H_T, zero when H_T is negligible.
pub fn fixation_index(creatures: &[Creature]) -> Fixation {
    let alive: Vec<&Creature> = creatures.iter().filter(|c| c.alive).collect();
    let mut groups: BTreeMap<u64, Vec<&Creature>> = BTreeMap::new();
    for c in &alive {
        groups.entry(c.species_id()).or_default().push(*c);
    }
    let h_t = pool_heterozygosity(&alive);
    let h_s = if groups.is_empty() {
        0.0
    } else {
        groups.values().map(|g| pool_heterozygosity(g)).sum::<f32>() / groups.len() as f32
    };
    let f_st = if h_t < 1e-6 { 0.0 } else { ((h_t - h_s) / h_t).clamp(0.0, 1.0) };
    Fixation { h_s, h_t, f_st }
}

/// Drift in small species: with probability 1/√N a `drift_fraction` share of
/// members loses 20% fitness. Returns how many individuals were hit.
pub fn apply_drift(creatures: &mut [Creature], config: &PopulationConfig, rng: &mut impl Rng) -> usize {
    let mut groups: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    for (i, c) in creatures.iter().enumerate().filter(|(_, c)| c.alive) {
        groups.entry(c.species_id()).or_default().push(i);
    }
    let mut hit = 0;
    for members in groups.values_mut() {
        let n = members.len();
        if n == 0 || n >= config.drift_threshold {
            continue;
        }
        if !rng.gen_bool((1.0 / (n as f64).sqrt()).min(1.0)) {
            continue;
        }
        let k = ((n as f32 * config.drift_fraction).ceil() as usize).min(n);
        members.shuffle(rng);
        for &i in members.iter().take(k) {
            creatures[i].fitness_modifier *= 0.8;
            hit += 1;
        }
    }
    hit
}

/// Purging selection against genetic load. Returns how many were penalized.
pub fn apply_purging(creatures: &mut [Creature], config: &PopulationConfig, rng: &mut impl Rng) -> usize {
    let mut purged = 0;
    for c in creatures.iter_mut().filter(|c| c.alive) {
        let load = c.genome.genetic_load();
        if load <= config.purge_threshold {
            continue;
        }
        c.fitness_modifier *= (1.0 - (load - config.purge_threshold) * 0.2).max(0.0);
        if load > config.severe_load && rng.gen_bool(0.5) {
            c.fitness_modifier *= 0.5;
        }
        purged += 1;
    }
    purged
}

/// Local conditions for the epigenetic pass, both in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    pub stress: f32,
    pub nutrition: f32,
}

impl Default for Environment {
    fn default() -> Self {
        Self { stress: 0.0, nutrition: 1.0 }
    }
}

/// Decays existing marks, then lays down stress and malnutrition marks.
/// Returns the number of new marks.
pub fn apply_environment(
    creatures: &mut [Creature],
    environment: Environment,
    config: &PopulationConfig,
    rng: &mut impl Rng,
) -> usize {
    let mut marked = 0;
    for c in creatures.iter_mut().filter(|c| c.alive) {
        c.genome.decay_marks(config.mark_decay);
        if environment.stress > config.stress_threshold {
            marked += c.genome.apply_stress(environment.stress, config.mark_generations, rng);
        }
        if environment.nutrition < config.nutrition_threshold {
            marked += c.genome.apply_malnutrition(environment.nutrition, config.mark_generations);
        }
    }
    marked
}
