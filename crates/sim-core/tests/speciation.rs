use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sim_core::{GeneticsConfig, World};

fn tight_thresholds() -> GeneticsConfig {
    let mut config = GeneticsConfig::default();
    config.mutation.rate = 0.05;
    config.mutation.strength = 0.15;
    config.speciation.check_interval = 10;
    config.speciation.cluster_threshold = 0.06;
    config.speciation.species_threshold = 0.08;
    config.mate.max_candidates = 6;
    config.population.survival_fraction = 0.4;
    config
}

/// Runs 200 creatures split into two isolated demes for 500 generations and
/// returns the number of speciation events seen.
fn run_isolated(config: GeneticsConfig) -> (World, usize) {
    let mut rng = ChaCha8Rng::seed_from_u64(500);
    let mut world = World::two_demes(config, 100.0);
    world.populate(200, &mut rng);

    let mut events = 0;
    for _ in 0..500 {
        let report = world.step(&mut rng);
        events += report.speciation_events.len();
        assert_eq!(report.population, 200);
    }
    (world, events)
}

#[test]
fn isolated_demes_speciate_under_default_config() {
    let (world, events) = run_isolated(GeneticsConfig::default());
    let species = world.species();
    assert!(events >= 1, "speciation events: {events}");
    assert_eq!(species.speciation_count(), events as u64);

    let tree = species.tree();
    let root = tree.root().expect("founding species is the root");
    assert_eq!(tree.descendants(root).len(), events);
    assert!(tree.is_consistent());
    assert!(species.newick().ends_with(';'));
}

#[test]
fn tight_thresholds_split_the_demes() {
    let (world, events) = run_isolated(tight_thresholds());
    let species = world.species();
    assert!(events >= 1);
    assert!(species.extant_count() >= 2, "extant species: {}", species.extant_count());

    let tree = species.tree();
    let root = tree.root().expect("founding species is the root");
    assert_eq!(tree.descendants(root).len(), events);
    assert!(tree.is_consistent());
}

#[test]
fn extinct_species_stay_extinct() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut world = World::two_demes(tight_thresholds(), 100.0);
    world.populate(60, &mut rng);
    let founder = world.creatures()[0].species_id();
    for c in world.creatures_mut() {
        c.alive = false;
    }
    world.step(&mut rng);
    let species = world.species().get(founder).expect("founder tracked");
    assert!(species.is_extinct());
    assert_eq!(species.extinction_generation(), Some(1));
    world.step(&mut rng);
    assert!(world.species().get(founder).expect("founder tracked").is_extinct());
    assert_eq!(world.species().extinction_count(), 1);
}
