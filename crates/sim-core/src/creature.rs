use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::gene::GeneType;
use crate::genome::DiploidGenome;

/// Body archetype, derived from aptitude and diet genes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CreatureType {
    Herbivore,
    Carnivore,
    Omnivore,
    Aquatic,
    Flying,
    Amphibian,
}

impl CreatureType {
    pub const ALL: [CreatureType; 6] = [
        CreatureType::Herbivore,
        CreatureType::Carnivore,
        CreatureType::Omnivore,
        CreatureType::Aquatic,
        CreatureType::Flying,
        CreatureType::Amphibian,
    ];

    pub fn from_genome(genome: &DiploidGenome) -> Self {
        let flight = genome.trait_value(GeneType::FlightAptitude);
        let aquatic = genome.trait_value(GeneType::AquaticAptitude);
        let climbing = genome.trait_value(GeneType::ClimbingAptitude);
        let diet = genome.trait_value(GeneType::DietSpecialization);
        if flight > 0.6 {
            CreatureType::Flying
        } else if aquatic > 0.6 && climbing > 0.4 {
            CreatureType::Amphibian
        } else if aquatic > 0.6 {
            CreatureType::Aquatic
        } else if diet < 0.35 {
            CreatureType::Herbivore
        } else if diet > 0.65 {
            CreatureType::Carnivore
        } else {
            CreatureType::Omnivore
        }
    }

    pub fn index(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone)]
pub struct Creature {
    id: u64,
    pub genome: DiploidGenome,
    pub creature_type: CreatureType,
    pub position: Vec3,
    pub velocity: Vec3,
    pub alive: bool,
    pub generation: u64,
    /// Multiplicative fitness adjustment from drift, purging and hybrid zones.
    pub fitness_modifier: f32,
    pub sterile: bool,
    pub parents: Option<(u64, u64)>,
    /// Whether either parent was a hybrid, for backcross classification.
    pub hybrid_parentage: bool,
}

impl Creature {
    fn mint_id() -> u64 {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NEXT.fetch_add(1, Ordering::Relaxed)
    }

    pub fn new(genome: DiploidGenome, position: Vec3, generation: u64) -> Self {
        Self {
            id: Self::mint_id(),
            creature_type: CreatureType::from_genome(&genome),
            genome,
            position,
            velocity: Vec3::ZERO,
            alive: true,
            generation,
            fitness_modifier: 1.0,
            sterile: false,
            parents: None,
            hybrid_parentage: false,
        }
    }

    /// Offspring of `a` and `b` carrying `genome`.
    pub fn offspring(a: &Creature, b: &Creature, genome: DiploidGenome, position: Vec3, generation: u64) -> Self {
        let mut child = Self::new(genome, position, generation);
        child.parents = Some((a.id, b.id));
        child.hybrid_parentage = a.genome.hybrid || b.genome.hybrid;
        child
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn species_id(&self) -> u64 {
        self.genome.species_id
    }

    pub fn is_hybrid(&self) -> bool {
        self.genome.hybrid
    }

    pub fn can_breed(&self) -> bool {
        self.alive && !self.sterile
    }

    pub fn size(&self) -> f32 {
        self.genome.trait_value(GeneType::Size)
    }

    pub fn speed(&self) -> f32 {
        self.genome.trait_value(GeneType::Speed)
    }

    pub fn color(&self) -> Vec3 {
        Vec3::new(
            self.genome.trait_value(GeneType::ColorRed),
            self.genome.trait_value(GeneType::ColorGreen),
            self.genome.trait_value(GeneType::ColorBlue),
        )
    }

    pub fn ornament_intensity(&self) -> f32 {
        self.genome.trait_value(GeneType::OrnamentIntensity)
    }

    /// Base fitness before selection: genetic load and modifiers, floored at 0.05.
    pub fn genetic_fitness(&self) -> f32 {
        ((1.0 - 0.5 * self.genome.genetic_load()) * self.fitness_modifier).max(0.05)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenomeConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn creature(seed: u64) -> Creature {
        let genome = DiploidGenome::founder(&GenomeConfig::default(), &mut ChaCha8Rng::seed_from_u64(seed));
        Creature::new(genome, Vec3::ZERO, 0)
    }

    #[test]
    fn founders_are_omnivores() {
        assert_eq!(creature(1).creature_type, CreatureType::Omnivore);
    }

    #[test]
    fn ids_increase() {
        let (a, b) = (creature(2), creature(3));
        assert!(b.id() > a.id());
    }

    #[test]
    fn offspring_records_parents() {
        let (a, mut b) = (creature(4), creature(5));
        b.genome.hybrid = true;
        let child = Creature::offspring(&a, &b, a.genome.clone(), Vec3::X, 1);
        assert_eq!(child.parents, Some((a.id(), b.id())));
        assert!(child.hybrid_parentage);
    }

    #[test]
    fn founder_fitness_is_one() {
        assert!((creature(6).genetic_fitness() - 1.0).abs() < 1e-6);
    }
}
