use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use host::{HostConfig, Simulation};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Evolve and render a speciating population headlessly", long_about = None)]
struct Args {
    /// TOML file with `[genetics]` and `[render]` sections.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    generations: Option<u64>,

    #[arg(short, long)]
    population: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Default filter directive; `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Directory for compiled shader blobs, reused across runs.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let mut config = match &args.config {
        Some(path) => HostConfig::load(path)?,
        None => HostConfig::default(),
    };
    if let Some(generations) = args.generations {
        config.generations = generations;
    }
    if let Some(population) = args.population {
        config.population = population;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }

    let mut simulation = Simulation::new(config, args.cache_dir.as_deref())?;
    let summary = simulation.run()?;
    let gpu = simulation.device().backend().stats();
    tracing::info!(
        generations = summary.generations,
        frames = summary.frames,
        seed = summary.seed,
        population = summary.population,
        species = summary.species,
        speciations = summary.speciation_events,
        draw_calls = summary.draw_calls,
        validation_errors = gpu.validation_errors,
        "run finished"
    );
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
