use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sim_core::{Creature, DiploidGenome, GeneticsConfig, HybridZoneManager};

const S1: u64 = 7_000_001;
const S2: u64 = 7_000_002;

/// Fifty members per side along X, overlapping in the band [-5, 5].
fn contact_population(config: &GeneticsConfig, rng: &mut ChaCha8Rng) -> Vec<Creature> {
    let step = 105.0 / 49.0;
    let mut creatures = Vec::new();
    for i in 0..50 {
        let z = (i % 5) as f32 - 2.0;
        let x = -100.0 + i as f32 * step;
        for (species, x) in [(S1, x), (S2, -x)] {
            let mut c = Creature::new(DiploidGenome::founder(&config.genome, rng), Vec3::new(x, 0.0, z), 0);
            c.genome.species_id = species;
            creatures.push(c);
        }
    }
    creatures
}

#[test]
fn zone_forms_at_contact() {
    let config = GeneticsConfig::default();
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let creatures = contact_population(&config, &mut rng);
    let mut zones = HybridZoneManager::new(config.hybrid.clone());

    assert_eq!(zones.update(&creatures, 1, &mut rng), 1);
    assert_eq!(zones.active_count(), 1);
    let zone = zones.active_zones().next().expect("one zone");
    assert_eq!(zone.species, (S1, S2));
    assert!(zone.centroid.x >= -5.0 && zone.centroid.x <= 5.0, "centroid {:?}", zone.centroid);
    assert!(zone.contains(Vec3::ZERO));
    assert_eq!(zone.created_generation, 1);
}

#[test]
fn separated_species_form_no_zone() {
    let config = GeneticsConfig::default();
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let creatures: Vec<Creature> = contact_population(&config, &mut rng)
        .into_iter()
        .filter(|c| c.position.x.abs() > 20.0)
        .collect();
    let mut zones = HybridZoneManager::new(config.hybrid.clone());
    assert_eq!(zones.update(&creatures, 1, &mut rng), 0);
    assert_eq!(zones.active_count(), 0);
}

#[test]
fn zone_without_hybrids_closes_after_grace() {
    let config = GeneticsConfig::default();
    let mut rng = ChaCha8Rng::seed_from_u64(4);
    let creatures = contact_population(&config, &mut rng);
    let mut zones = HybridZoneManager::new(config.hybrid.clone());
    zones.update(&creatures, 1, &mut rng);
    for generation in 2..2 + config.hybrid.grace_generations {
        zones.update(&creatures, generation, &mut rng);
    }
    assert_eq!(zones.active_count(), 1);
    zones.update(&creatures, 2 + config.hybrid.grace_generations, &mut rng);
    assert_eq!(zones.active_count(), 0);
    assert_eq!(zones.zones().len(), 1);
}

#[test]
fn zero_grace_closes_once_no_hybrids_remain() {
    let mut config = GeneticsConfig::default();
    config.hybrid.grace_generations = 0;
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let mut creatures = contact_population(&config, &mut rng);
    let mut zones = HybridZoneManager::new(config.hybrid.clone());
    assert_eq!(zones.update(&creatures, 1, &mut rng), 1);

    for c in creatures.iter_mut().filter(|c| c.position.x.abs() <= 5.0) {
        c.genome.hybrid = true;
    }
    zones.update(&creatures, 2, &mut rng);
    assert_eq!(zones.active_count(), 1);

    for c in &mut creatures {
        c.genome.hybrid = false;
    }
    zones.update(&creatures, 3, &mut rng);
    assert_eq!(zones.active_count(), 0);
}

#[test]
fn zone_mating_yields_hybrids() {
    let config = GeneticsConfig::default();
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let creatures = contact_population(&config, &mut rng);
    let mut zones = HybridZoneManager::new(config.hybrid.clone());
    zones.update(&creatures, 1, &mut rng);

    let a = creatures.iter().filter(|c| c.species_id() == S1).max_by(|x, y| x.position.x.total_cmp(&y.position.x));
    let b = creatures.iter().filter(|c| c.species_id() == S2).min_by(|x, y| x.position.x.total_cmp(&y.position.x));
    let (a, b) = (a.expect("S1 member"), b.expect("S2 member"));
    let index = zones.zone_at(a.species_id(), b.species_id(), a.position).expect("contact inside zone");

    let mut hybrids = 0;
    for _ in 0..100 {
        if let Some(child) = zones.attempt_mating(index, a, b, &config.mate, 0.5, 2, &mut rng) {
            assert!(child.is_hybrid());
            hybrids += 1;
        }
    }
    assert!(hybrids > 0);
    assert_eq!(zones.zones()[index].stats.f1_count, hybrids);
}
