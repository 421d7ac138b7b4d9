//! Mate choice and reproductive compatibility.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::MateConfig;
use crate::creature::Creature;
use crate::gene::GeneType;
use crate::genome::DiploidGenome;

/// Barriers and hybrid effects between two genomes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Compatibility {
    pub pre_mating: f32,
    pub post_mating: f32,
    pub hybrid_vigor: f32,
    pub sterility: f32,
}

impl Compatibility {
    /// Chance that a mating attempt goes ahead.
    pub fn mating_success(&self) -> f32 {
        1.0 - self.pre_mating
    }

    /// Combined reproductive isolation in [0, 1].
    pub fn isolation(&self) -> f32 {
        1.0 - (1.0 - self.pre_mating) * (1.0 - self.post_mating)
    }
}

/// Mate preferences read off a chooser's genome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preferences {
    pub size: f32,
    pub ornament: f32,
    pub similarity: f32,
    pub choosiness: f32,
}

impl Preferences {
    pub fn of(genome: &DiploidGenome) -> Self {
        Self {
            size: genome.trait_value(GeneType::SizePreference),
            ornament: genome.trait_value(GeneType::OrnamentPreference),
            similarity: genome.trait_value(GeneType::SimilarityPreference),
            choosiness: genome.trait_value(GeneType::Choosiness),
        }
    }
}

pub struct MateSelector<'a> {
    config: &'a MateConfig,
}

impl<'a> MateSelector<'a> {
    pub fn new(config: &'a MateConfig) -> Self {
        Self { config }
    }

    /// Attractiveness of `candidate` to `chooser` in [0, 1].
    pub fn score(&self, chooser: &Creature, candidate: &Creature) -> f32 {
        let prefs = Preferences::of(&chooser.genome);
        let own = chooser.size();
        let desired = own * (1.0 + 0.5 * prefs.size);
        let size = (-(candidate.size() - desired).abs() / desired.max(1e-3)).exp();
        let ornament = 0.5 + 0.5 * prefs.ornament * (2.0 * candidate.ornament_intensity() - 1.0);
        let similarity = 1.0 - chooser.genome.distance(&candidate.genome);
        let similar = if prefs.similarity >= 0.0 {
            0.5 + (similarity - 0.5) * prefs.similarity
        } else {
            0.5 + (0.5 - similarity) * -prefs.similarity
        };
        let c = self.config;
        let weights = (c.size_weight + c.ornament_weight + c.similarity_weight).max(1e-6);
        ((c.size_weight * size + c.ornament_weight * ornament + c.similarity_weight * similar) / weights).clamp(0.0, 1.0)
    }

    /// Score floor below which `chooser` rejects a candidate.
    pub fn rejection_threshold(&self, chooser: &Creature) -> f32 {
        Preferences::of(&chooser.genome).choosiness.clamp(0.0, 1.0) * self.config.max_rejection
    }

    /// Index into `candidates` of the best acceptable mate within the search
    /// radius, scoring at most `max_candidates` of them.
    pub fn select(&self, chooser: &Creature, candidates: &[Creature], rng: &mut impl Rng) -> Option<usize> {
        let radius_sq = self.config.search_radius * self.config.search_radius;
        let mut eligible: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                c.id() != chooser.id() && c.can_breed() && c.position.distance_squared(chooser.position) <= radius_sq
            })
            .map(|(i, _)| i)
            .collect();
        if eligible.len() > self.config.max_candidates {
            eligible.shuffle(rng);
            eligible.truncate(self.config.max_candidates);
        }
        let threshold = self.rejection_threshold(chooser);
        eligible
            .into_iter()
            .map(|i| (i, self.score(chooser, &candidates[i])))
            .filter(|(_, s)| *s >= threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    pub fn compatibility(&self, a: &DiploidGenome, b: &DiploidGenome) -> Compatibility {
        compatibility(a, b, self.config)
    }
}

/// Conspecific pairs have no barriers. Otherwise barriers grow with ornament
/// mismatch and genetic distance.
pub fn compatibility(a: &DiploidGenome, b: &DiploidGenome, config: &MateConfig) -> Compatibility {
    if a.species_id == b.species_id {
        return Compatibility::default();
    }
    let distance = a.distance(b);
    let mismatch =
        (a.trait_value(GeneType::OrnamentIntensity) - b.trait_value(GeneType::OrnamentIntensity)).abs();
    let pre_mating = (config.premating_base + 0.5 * mismatch + distance).clamp(0.0, 1.0);
    let post_mating = (distance / config.postmating_saturation.max(1e-6)).clamp(0.0, 1.0);
    let parents = (a.heterozygosity() + b.heterozygosity()) * 0.5;
    let hybrid_vigor = ((distance - parents) * 0.5).clamp(0.0, 0.3);
    let onset = config.sterility_onset;
    let sterility = ((distance - onset) / (1.0 - onset).max(1e-6) * 2.0).clamp(0.0, 1.0);
    Compatibility { pre_mating, post_mating, hybrid_vigor, sterility }
}
