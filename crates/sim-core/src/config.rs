//! Genetics configuration, loadable from TOML. Every table and field falls
//! back to its default when missing.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chromosome::StructuralMutation;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("parsing genetics config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid genetics config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenomeConfig {
    pub chromosome_count: usize,
    /// Founder allele jitter as a fraction of each range's width.
    pub founder_variation: f32,
    /// Probability that a chromosome pair crosses over during meiosis.
    pub recombination_rate: f32,
}

impl Default for GenomeConfig {
    fn default() -> Self {
        Self { chromosome_count: 6, founder_variation: 0.03, recombination_rate: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Probability that a chromosome strand picks up a point mutation in one generation.
    pub rate: f32,
    /// Missense jitter as a fraction of the gene range.
    pub strength: f32,
    pub duplication_rate: f32,
    pub deletion_rate: f32,
    pub inversion_rate: f32,
    pub translocation_rate: f32,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            rate: 0.05,
            strength: 0.1,
            duplication_rate: 0.0005,
            deletion_rate: 0.0005,
            inversion_rate: 0.001,
            translocation_rate: 0.0005,
        }
    }
}

impl MutationConfig {
    pub fn structural_rates(&self) -> [(StructuralMutation, f32); 4] {
        [
            (StructuralMutation::Duplication, self.duplication_rate),
            (StructuralMutation::Deletion, self.deletion_rate),
            (StructuralMutation::Inversion, self.inversion_rate),
            (StructuralMutation::Translocation, self.translocation_rate),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciationConfig {
    pub min_species_size: usize,
    /// Single-linkage join distance.
    pub cluster_threshold: f32,
    /// Mean distance a cluster needs from the rest of its species to split off.
    pub species_threshold: f32,
    /// Generations between detection passes.
    pub check_interval: u64,
    /// Members sampled per species when refreshing isolation values.
    pub isolation_sample: usize,
    /// Generations of size history kept for the effective-size estimate.
    pub size_history: usize,
}

impl Default for SpeciationConfig {
    fn default() -> Self {
        Self {
            min_species_size: 10,
            cluster_threshold: 0.1,
            species_threshold: 0.15,
            check_interval: 1,
            isolation_sample: 4,
            size_history: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MateConfig {
    pub search_radius: f32,
    /// Candidates scored per choice; the rest are ignored.
    pub max_candidates: usize,
    pub size_weight: f32,
    pub ornament_weight: f32,
    pub similarity_weight: f32,
    /// Score floor for a chooser with full choosiness.
    pub max_rejection: f32,
    /// Pre-mating barrier between any two distinct species.
    pub premating_base: f32,
    /// Distance at which hybrid sterility starts.
    pub sterility_onset: f32,
    /// Distance at which the post-mating barrier saturates.
    pub postmating_saturation: f32,
}

impl Default for MateConfig {
    fn default() -> Self {
        Self {
            search_radius: 50.0,
            max_candidates: 16,
            size_weight: 0.3,
            ornament_weight: 0.3,
            similarity_weight: 0.4,
            max_rejection: 0.6,
            premating_base: 0.3,
            sterility_onset: 0.2,
            postmating_saturation: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridZoneConfig {
    pub detection_radius: f32,
    /// Creatures that must overlap before a zone forms.
    pub min_overlap: usize,
    pub min_width: f32,
    /// Weight of the current hybrid centroid in the moving average.
    pub centroid_smoothing: f32,
    /// Generations a zone may go without hybrids before closing. Zero closes
    /// it on the first update that finds none.
    pub grace_generations: u64,
}

impl Default for HybridZoneConfig {
    fn default() -> Self {
        Self { detection_radius: 5.0, min_overlap: 5, min_width: 5.0, centroid_smoothing: 0.2, grace_generations: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// Species smaller than this drift.
    pub drift_threshold: usize,
    /// Fraction of a drifting species whose fitness is knocked down.
    pub drift_fraction: f32,
    pub purge_threshold: f32,
    pub severe_load: f32,
    pub stress_threshold: f32,
    pub nutrition_threshold: f32,
    pub mark_decay: f32,
    pub mark_generations: u32,
    /// Fraction of each deme surviving truncation selection.
    pub survival_fraction: f32,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            drift_threshold: 20,
            drift_fraction: 0.2,
            purge_threshold: 0.3,
            severe_load: 0.8,
            stress_threshold: 0.5,
            nutrition_threshold: 0.3,
            mark_decay: 0.8,
            mark_generations: 3,
            survival_fraction: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticsConfig {
    pub genome: GenomeConfig,
    pub mutation: MutationConfig,
    pub speciation: SpeciationConfig,
    pub mate: MateConfig,
    pub hybrid: HybridZoneConfig,
    pub population: PopulationConfig,
}

impl GeneticsConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{name} = {v} is outside [0, 1]")))
            }
        };
        unit("mutation.rate", self.mutation.rate)?;
        unit("genome.recombination_rate", self.genome.recombination_rate)?;
        unit("population.survival_fraction", self.population.survival_fraction)?;
        if self.genome.chromosome_count == 0 {
            return Err(ConfigError::Invalid("genome.chromosome_count must be positive".into()));
        }
        if self.speciation.min_species_size < 2 {
            return Err(ConfigError::Invalid("speciation.min_species_size must be at least 2".into()));
        }
        if self.speciation.check_interval == 0 {
            return Err(ConfigError::Invalid("speciation.check_interval must be positive".into()));
        }
        Ok(())
    }
}
