//! Render configuration, loadable from TOML. Missing fields keep their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub frames_in_flight: usize,
    pub width: u32,
    pub height: u32,
    pub lighting: LightingConfig,
    pub creatures: CreatureConfig,
    pub trees: TreeConfig,
    pub grass: GrassConfig,
    pub terrain: TerrainConfig,
    pub water: WaterConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            width: 1280,
            height: 720,
            lighting: LightingConfig::default(),
            creatures: CreatureConfig::default(),
            trees: TreeConfig::default(),
            grass: GrassConfig::default(),
            terrain: TerrainConfig::default(),
            water: WaterConfig::default(),
        }
    }
}

impl RenderConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, RenderError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| RenderError::ConfigIo { path: path.display().to_string(), source })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        let ascending = |name: &str, values: &[f32]| {
            if values.windows(2).all(|w| w[0] < w[1]) && values.first().is_some_and(|v| *v > 0.0) {
                Ok(())
            } else {
                Err(RenderError::InvalidConfig(format!("{name} must be positive and strictly ascending")))
            }
        };
        ascending("creatures.lod_distances", &self.creatures.lod_distances)?;
        ascending("trees.lod_distances", &self.trees.lod_distances)?;
        ascending("grass.lod_distances", &self.grass.lod_distances)?;
        if self.terrain.chunks == 0 || self.terrain.chunk_resolution == 0 {
            return Err(RenderError::InvalidConfig("terrain.chunks and terrain.chunk_resolution must be positive".into()));
        }
        if self.creatures.max_instances == 0 || self.trees.max_instances == 0 || self.grass.max_instances == 0 {
            return Err(RenderError::InvalidConfig("instance capacities must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    /// Direction towards the sun.
    pub sun_direction: [f32; 3],
    pub sun_color: [f32; 3],
    pub sun_intensity: f32,
    pub ambient: f32,
    pub fog_color: [f32; 3],
    pub fog_density: f32,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            sun_direction: [0.4, 0.8, 0.3],
            sun_color: [1.0, 0.96, 0.88],
            sun_intensity: 1.0,
            ambient: 0.25,
            fog_color: [0.7, 0.78, 0.86],
            fog_density: 0.0008,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreatureConfig {
    pub max_instances: usize,
    /// Upper distance of each LOD level; beyond the last, creatures are culled.
    pub lod_distances: Vec<f32>,
    /// Share of the species tint in the instance color.
    pub tint_mix: f32,
    pub bob_amplitude: f32,
    pub sway_amplitude: f32,
    pub shadows: bool,
    pub shadow_map_size: u32,
    /// Half-extent of the orthographic shadow volume around the camera target.
    pub shadow_extent: f32,
    pub preload: bool,
}

impl Default for CreatureConfig {
    fn default() -> Self {
        Self {
            max_instances: 8192,
            lod_distances: vec![60.0, 180.0, 400.0],
            tint_mix: 0.35,
            bob_amplitude: 0.08,
            sway_amplitude: 0.05,
            shadows: true,
            shadow_map_size: 2048,
            shadow_extent: 200.0,
            preload: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub max_instances: usize,
    /// Upper distances of full, simplified, billboard, impostor and point.
    pub lod_distances: Vec<f32>,
    /// Width of the band before each level's end over which it fades out.
    pub fade_band: f32,
    pub sway: f32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_instances: 16384,
            lod_distances: vec![60.0, 150.0, 350.0, 700.0, 1200.0],
            fade_band: 20.0,
            sway: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrassConfig {
    pub max_instances: usize,
    /// Upper distances of the near, mid and far bands.
    pub lod_distances: Vec<f32>,
    /// Every blade near, one in `mid_keep` mid-range, one in `far_keep` far.
    pub mid_keep: u32,
    pub far_keep: u32,
    pub mid_widen: f32,
    pub far_scale: f32,
    pub wind_direction: [f32; 2],
    pub wind_strength: f32,
    pub sway_frequency: f32,
    pub blade_width: f32,
    pub blade_height: f32,
}

impl Default for GrassConfig {
    fn default() -> Self {
        Self {
            max_instances: 65536,
            lod_distances: vec![40.0, 90.0, 160.0],
            mid_keep: 2,
            far_keep: 10,
            mid_widen: 1.8,
            far_scale: 2.5,
            wind_direction: [1.0, 0.3],
            wind_strength: 0.35,
            sway_frequency: 1.7,
            blade_width: 0.12,
            blade_height: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub world_size: f32,
    /// Chunks per side.
    pub chunks: u32,
    /// Quads per chunk side.
    pub chunk_resolution: u32,
    pub height_scale: f32,
    pub water_level: f32,
    pub shoreline: f32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self { world_size: 2048.0, chunks: 32, chunk_resolution: 16, height_scale: 30.0, water_level: 0.0, shoreline: 1.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterConfig {
    pub enabled: bool,
    pub cells: u32,
    pub deep_color: [f32; 3],
    pub shallow_color: [f32; 3],
    pub sky_top: [f32; 3],
    pub sky_horizon: [f32; 3],
    pub wave_scale: f32,
    pub wave_speed: f32,
    pub wave_height: f32,
    pub fresnel_power: f32,
    pub foam_threshold: f32,
    pub foam_intensity: f32,
    pub specular_power: f32,
    pub specular_intensity: f32,
    pub clarity: f32,
}

impl Default for WaterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cells: 128,
            deep_color: [0.02, 0.12, 0.22],
            shallow_color: [0.1, 0.45, 0.5],
            sky_top: [0.35, 0.55, 0.85],
            sky_horizon: [0.75, 0.85, 0.95],
            wave_scale: 0.08,
            wave_speed: 1.2,
            wave_height: 0.6,
            fresnel_power: 5.0,
            foam_threshold: 0.7,
            foam_intensity: 0.6,
            specular_power: 128.0,
            specular_intensity: 0.8,
            clarity: 0.6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(RenderConfig::from_toml_str("").unwrap(), RenderConfig::default());
    }

    #[test]
    fn partial_tables_keep_defaults() {
        let config = RenderConfig::from_toml_str("[grass]\nwind_strength = 1.5\n").unwrap();
        assert_eq!(config.grass.wind_strength, 1.5);
        assert_eq!(config.grass.mid_keep, 2);
        assert_eq!(config.terrain.chunks, 32);
    }

    #[test]
    fn descending_lods_are_rejected() {
        let err = RenderConfig::from_toml_str("[trees]\nlod_distances = [100.0, 50.0]\n").unwrap_err();
        assert!(matches!(err, RenderError::InvalidConfig(_)));
    }
}
