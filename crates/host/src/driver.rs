//! The headless run loop: generations on a fixed tick, one rendered frame per
//! step of simulated time.

use std::path::Path;

use anyhow::Context;
use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use renderer::{Camera, FrameStats, Renderer, Scene};
use rhi::headless::HeadlessBackend;
use rhi::{Device, DeviceDesc};
use serde::Serialize;
use sim_core::{GenerationReport, World};
use types::VegetationInstance;

use crate::config::HostConfig;
use crate::placement::{scatter_vegetation, settle};
use crate::timing::FrameTiming;

/// What a finished run looked like.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    pub generations: u64,
    pub frames: u64,
    pub population: usize,
    pub species: usize,
    pub speciation_events: usize,
    pub extinctions: u64,
    pub hybrid_zones: usize,
    pub mean_heterozygosity: f32,
    pub f_st: f32,
    pub draw_calls: u64,
    pub last_frame: FrameStats,
    pub phylogeny: String,
}

pub struct Simulation {
    config: HostConfig,
    seed: u64,
    device: Device<HeadlessBackend>,
    renderer: Renderer<HeadlessBackend>,
    world: World,
    vegetation: Vec<VegetationInstance>,
    camera: Camera,
    timing: FrameTiming,
    rng: ChaCha8Rng,
    draw_calls: u64,
    speciation_events: usize,
    last_report: Option<GenerationReport>,
}

impl Simulation {
    pub fn new(config: HostConfig, shader_cache: Option<&Path>) -> anyhow::Result<Self> {
        config.validate()?;
        let frames_in_flight = u32::try_from(config.render.frames_in_flight).context("frames_in_flight")?;
        let device = Device::new(HeadlessBackend::new(), &DeviceDesc { frames_in_flight });
        let renderer = Renderer::new(&device, &config.render, shader_cache).context("creating renderer")?;

        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let half = config.habitat_half_extent();
        let heightmap = renderer.terrain().heightmap();
        let mut world = World::two_demes(config.genetics.clone(), half);
        world.populate(config.population, &mut rng);
        settle(world.creatures_mut(), heightmap);
        let vegetation = scatter_vegetation(heightmap, half, &config.vegetation, &mut rng);

        let mut camera = Camera::new(config.render.terrain.world_size);
        camera.distance = half * 1.5;
        camera.target = Vec3::new(0.0, heightmap.height_at(0.0, 0.0).max(heightmap.config().water_level), 0.0);

        tracing::info!(
            seed,
            seeded = config.seed.is_some(),
            population = config.population,
            generations = config.generations,
            habitat = half * 2.0,
            "simulation ready"
        );

        Ok(Self {
            timing: FrameTiming::new(config.tick_rate),
            config,
            seed,
            device,
            renderer,
            world,
            vegetation,
            camera,
            rng,
            draw_calls: 0,
            speciation_events: 0,
            last_report: None,
        })
    }

    /// The seed this run's generator started from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn renderer(&self) -> &Renderer<HeadlessBackend> {
        &self.renderer
    }

    pub fn device(&self) -> &Device<HeadlessBackend> {
        &self.device
    }

    pub fn vegetation(&self) -> &[VegetationInstance] {
        &self.vegetation
    }

    pub fn timing(&self) -> &FrameTiming {
        &self.timing
    }

    pub fn last_report(&self) -> Option<&GenerationReport> {
        self.last_report.as_ref()
    }

    /// Runs until the configured generation count is reached or the
    /// population dies out.
    pub fn run(&mut self) -> anyhow::Result<RunSummary> {
        while self.world.generation() < self.config.generations {
            self.frame()?;
            if self.world.creatures().is_empty() {
                tracing::warn!(generation = self.world.generation(), "population went extinct");
                break;
            }
        }
        self.device.wait_idle();
        Ok(self.summary())
    }

    /// One frame: any due generations, then a render. Returns the number of
    /// generations run.
    pub fn frame(&mut self) -> anyhow::Result<u32> {
        let dt = self.config.frame_dt;
        let due = self.timing.advance(dt);
        let mut ran = 0;
        for _ in 0..due {
            if self.world.generation() >= self.config.generations {
                break;
            }
            self.step();
            ran += 1;
        }

        self.camera.yaw += self.config.orbit_speed * dt;
        let scene = Scene { creatures: self.world.creatures(), vegetation: &self.vegetation };
        let stats = self
            .renderer
            .render(&self.device, scene, &self.camera, self.timing.elapsed)
            .with_context(|| format!("rendering frame {}", self.timing.frame_count))?;
        self.draw_calls += stats.draw_calls() as u64;
        Ok(ran)
    }

    fn step(&mut self) {
        let report = self.world.step(&mut self.rng);
        settle(self.world.creatures_mut(), self.renderer.terrain().heightmap());

        for event in &report.speciation_events {
            tracing::info!(
                generation = event.generation,
                parent = %self.world.species().name_of(event.parent),
                species = %self.world.species().name_of(event.species),
                members = event.members,
                distance = event.mean_distance,
                "speciation"
            );
        }
        self.speciation_events += report.speciation_events.len();

        let frame = self.renderer.stats();
        tracing::info!(
            generation = report.generation,
            population = report.population,
            species = report.species,
            zones = report.hybrid_zones,
            heterozygosity = report.mean_heterozygosity,
            fitness = report.mean_fitness,
            f_st = report.fixation.f_st,
            visible = frame.creatures.visible,
            draw_calls = frame.draw_calls(),
            "generation complete"
        );
        self.last_report = Some(report);
    }

    pub fn summary(&self) -> RunSummary {
        let species = self.world.species();
        let (heterozygosity, f_st, zones) = match &self.last_report {
            Some(r) => (r.mean_heterozygosity, r.fixation.f_st, r.hybrid_zones),
            None => (0.0, 0.0, 0),
        };
        RunSummary {
            seed: self.seed,
            generations: self.world.generation(),
            frames: self.renderer.frames_rendered(),
            population: self.world.creatures().len(),
            species: species.extant_count(),
            speciation_events: self.speciation_events,
            extinctions: species.extinction_count(),
            hybrid_zones: zones,
            mean_heterozygosity: heterozygosity,
            f_st,
            draw_calls: self.draw_calls,
            last_frame: self.renderer.stats().clone(),
            phylogeny: species.newick(),
        }
    }
}
