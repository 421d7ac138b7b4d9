use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use renderer::{MeshCache, MeshKey, PrimitiveCreatures};
use rhi::headless::HeadlessBackend;
use rhi::{Device, DeviceDesc};
use sim_core::{Allele, CreatureType, DiploidGenome, GeneType, GenomeConfig};

fn nudge(genome: &mut DiploidGenome, gene_type: GeneType, delta: f32) {
    for gene in genome.genes_mut().filter(|g| g.gene_type == gene_type) {
        gene.maternal = Allele::new(gene.maternal.value() + delta, gene.maternal.dominance());
        gene.paternal = Allele::new(gene.paternal.value() + delta, gene.paternal.dominance());
    }
}

#[test]
fn genomes_below_quantization_share_gpu_buffers() {
    let device = Device::new(HeadlessBackend::new(), &DeviceDesc::default());
    let mut cache = MeshCache::new(PrimitiveCreatures);
    let mut rng = ChaCha8Rng::seed_from_u64(4);
    let a = DiploidGenome::founder(&GenomeConfig::default(), &mut rng);
    let mut b = a.clone();
    nudge(&mut b, GeneType::Size, 0.01);
    assert_ne!(a.trait_value(GeneType::Size), b.trait_value(GeneType::Size));
    assert_eq!(MeshKey::new(&a, CreatureType::Herbivore), MeshKey::new(&b, CreatureType::Herbivore));

    let first = cache.get_mesh(&device, &a, CreatureType::Herbivore).unwrap();
    let second = cache.get_mesh(&device, &b, CreatureType::Herbivore).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.vertex_buffer, &second.vertex_buffer));
    assert_eq!(cache.len(), 1);
}

#[test]
fn crossing_a_bucket_builds_a_new_mesh() {
    let device = Device::new(HeadlessBackend::new(), &DeviceDesc::default());
    let mut cache = MeshCache::new(PrimitiveCreatures);
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let a = DiploidGenome::founder(&GenomeConfig::default(), &mut rng);
    let mut b = a.clone();
    nudge(&mut b, GeneType::Size, 1.2);

    let first = cache.get_mesh(&device, &a, CreatureType::Carnivore).unwrap();
    let second = cache.get_mesh(&device, &b, CreatureType::Carnivore).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    let other_type = cache.get_mesh(&device, &a, CreatureType::Flying).unwrap();
    assert!(!Arc::ptr_eq(&first, &other_type));
    assert_eq!(cache.len(), 3);

    device.wait_idle();
    let stats = device.backend().stats();
    assert_eq!(stats.copies, 6, "one vertex and one index upload per mesh");
    assert_eq!(stats.validation_errors, 0);
}
