//! Driver configuration: one TOML file holding the run parameters plus the
//! genetics and render sections.

use std::path::Path;

use anyhow::{ensure, Context};
use renderer::RenderConfig;
use serde::{Deserialize, Serialize};
use sim_core::GeneticsConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Fixed seed for a reproducible run. Drawn from the OS when absent.
    pub seed: Option<u64>,
    pub generations: u64,
    pub population: usize,
    /// Generations advanced per simulated second.
    pub tick_rate: f32,
    /// Simulated seconds per rendered frame.
    pub frame_dt: f32,
    /// Fraction of the terrain the demes occupy, centred on the origin.
    pub habitat_fraction: f32,
    /// Slow camera orbit, radians per simulated second.
    pub orbit_speed: f32,
    pub vegetation: VegetationConfig,
    pub genetics: GeneticsConfig,
    pub render: RenderConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            seed: None,
            generations: 50,
            population: 120,
            tick_rate: 10.0,
            frame_dt: 1.0 / 60.0,
            habitat_fraction: 0.1,
            orbit_speed: 0.05,
            vegetation: VegetationConfig::default(),
            genetics: GeneticsConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VegetationConfig {
    /// Placement attempts; rejected on water and bare rock.
    pub tree_attempts: usize,
    pub grass_attempts: usize,
}

impl Default for VegetationConfig {
    fn default() -> Self {
        Self { tree_attempts: 600, grass_attempts: 6000 }
    }
}

impl HostConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text).context("parsing host config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.tick_rate > 0.0, "tick_rate must be positive");
        ensure!(self.frame_dt > 0.0, "frame_dt must be positive");
        ensure!(
            self.habitat_fraction > 0.0 && self.habitat_fraction <= 1.0,
            "habitat_fraction must lie in (0, 1]"
        );
        ensure!(
            self.render.frames_in_flight >= 2,
            "render.frames_in_flight must be at least 2"
        );
        self.genetics.validate().context("genetics section")?;
        self.render.validate().context("render section")?;
        Ok(())
    }

    /// Half the side length of the square the demes span.
    pub fn habitat_half_extent(&self) -> f32 {
        self.render.terrain.world_size * self.habitat_fraction * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(HostConfig::from_toml_str("").unwrap(), HostConfig::default());
    }

    #[test]
    fn nested_sections_override_single_fields() {
        let text = r#"
            generations = 3
            population = 40

            [render]
            width = 320

            [render.terrain]
            chunks = 2
        "#;
        let config = HostConfig::from_toml_str(text).unwrap();
        assert_eq!(config.generations, 3);
        assert_eq!(config.population, 40);
        assert_eq!(config.render.width, 320);
        assert_eq!(config.render.terrain.chunks, 2);
        assert_eq!(config.render.height, RenderConfig::default().height);
        assert_eq!(config.genetics, GeneticsConfig::default());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(HostConfig::from_toml_str("tick_rate = 0.0").is_err());
        assert!(HostConfig::from_toml_str("habitat_fraction = 1.5").is_err());
        assert!(HostConfig::from_toml_str("[render.creatures]\nlod_distances = [50.0, 10.0]").is_err());
        assert!(HostConfig::from_toml_str("population = \"many\"").is_err());
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "seed = 99\n").unwrap();
        assert_eq!(HostConfig::load(&path).unwrap().seed, Some(99));
        assert!(HostConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
