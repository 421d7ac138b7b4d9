//! Diploid genetics and speciation engine.
//!
//! Alleles make genes, genes sit on chromosomes, chromosome pairs make a
//! [`DiploidGenome`]. On top of that live mate choice, species detection with a
//! phylogeny, hybrid zones and population-genetic statistics. [`World`] drives
//! all of it one generation at a time.

pub mod allele;
pub mod gene;
pub mod chromosome;
pub mod genome;
pub mod config;
pub mod creature;
pub mod mate;
pub mod phylogeny;
pub mod naming;
pub mod species;
pub mod hybrid;
pub mod popgen;
pub mod world;

pub use allele::{Allele, MutationKind};
pub use chromosome::{Chromosome, Crossover, StructuralMutation};
pub use config::{
    ConfigError, GeneticsConfig, GenomeConfig, HybridZoneConfig, MateConfig, MutationConfig, PopulationConfig,
    SpeciationConfig,
};
pub use creature::{Creature, CreatureType};
pub use gene::{EpigeneticMark, Gene, GeneRange, GeneType, MarkKind};
pub use genome::{ChromosomePair, DiploidGenome, Gamete, Phenotype};
pub use hybrid::{HybridZone, HybridZoneManager, HybridZoneStats, HybridZoneType};
pub use mate::{compatibility, Compatibility, MateSelector, Preferences};
pub use phylogeny::{PhyloNode, PhylogeneticTree};
pub use popgen::{Environment, Fixation};
pub use species::{NicheCentroid, SpeciationEvent, Species, SpeciesManager, SpeciesStats};
pub use world::{Deme, GenerationReport, World};
