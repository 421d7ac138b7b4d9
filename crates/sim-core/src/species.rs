//! Species bookkeeping: membership, cluster-based speciation, extinction,
//! cached statistics and the phylogeny.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{MateConfig, SpeciationConfig};
use crate::creature::Creature;
use crate::gene::GeneType;
use crate::genome::DiploidGenome;
use crate::mate::compatibility;
use crate::naming;
use crate::phylogeny::PhylogeneticTree;

/// Mean diet, habitat and activity-time genes of a species, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NicheCentroid {
    pub diet: f32,
    pub habitat: f32,
    pub activity: f32,
}

impl Default for NicheCentroid {
    fn default() -> Self {
        Self { diet: 0.5, habitat: 0.5, activity: 0.5 }
    }
}

impl NicheCentroid {
    pub fn of<'a>(genomes: impl Iterator<Item = &'a DiploidGenome>) -> Self {
        let mut sum = [0.0f32; 3];
        let mut n = 0u32;
        for g in genomes {
            let p = g.phenotype();
            sum[0] += p.normalized(GeneType::DietSpecialization);
            sum[1] += p.normalized(GeneType::HabitatPreference);
            sum[2] += p.normalized(GeneType::ActivityTime);
            n += 1;
        }
        if n == 0 {
            return Self::default();
        }
        let n = n as f32;
        Self { diet: sum[0] / n, habitat: sum[1] / n, activity: sum[2] / n }
    }

    pub fn distance(&self, other: &NicheCentroid) -> f32 {
        let d = [self.diet - other.diet, self.habitat - other.habitat, self.activity - other.activity];
        d.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeciesStats {
    pub size: usize,
    pub heterozygosity: f32,
    pub mean_fitness: f32,
    pub genetic_load: f32,
    /// Harmonic mean of recent sizes.
    pub effective_size: f32,
    pub min_size: usize,
    pub generations_since_bottleneck: u64,
}

#[derive(Debug, Clone)]
pub struct Species {
    id: u64,
    pub name: String,
    pub founding_lineage: u64,
    pub founding_generation: u64,
    parent: Option<u64>,
    extinct: bool,
    extinction_generation: Option<u64>,
    pub members: Vec<u64>,
    pub stats: SpeciesStats,
    /// Allele id → frequency among the species' allele copies.
    pub allele_frequencies: HashMap<u64, f32>,
    pub niche: NicheCentroid,
    /// Reproductive isolation against other species, by species id.
    pub isolation: HashMap<u64, f32>,
    size_history: VecDeque<usize>,
}

static NEXT_SPECIES_ID: AtomicU64 = AtomicU64::new(1);

impl Species {
    fn mint_id() -> u64 {
        NEXT_SPECIES_ID.fetch_add(1, Ordering::Relaxed)
    }

    /// Keeps minted ids clear of an externally assigned one.
    fn reserve_id(id: u64) {
        NEXT_SPECIES_ID.fetch_max(id.saturating_add(1), Ordering::Relaxed);
    }

    fn new(id: u64, founding_lineage: u64, generation: u64, parent: Option<u64>, niche: NicheCentroid) -> Self {
        Self {
            id,
            name: naming::binomial(id, &niche),
            founding_lineage,
            founding_generation: generation,
            parent,
            extinct: false,
            extinction_generation: None,
            members: Vec::new(),
            stats: SpeciesStats::default(),
            allele_frequencies: HashMap::new(),
            niche,
            isolation: HashMap::new(),
            size_history: VecDeque::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn parent(&self) -> Option<u64> {
        self.parent
    }

    pub fn is_extinct(&self) -> bool {
        self.extinct
    }

    pub fn extinction_generation(&self) -> Option<u64> {
        self.extinction_generation
    }

    fn record_size(&mut self, size: usize, history: usize) {
        let mean_before = if self.size_history.is_empty() {
            size as f32
        } else {
            self.size_history.iter().sum::<usize>() as f32 / self.size_history.len() as f32
        };
        self.size_history.push_back(size);
        while self.size_history.len() > history.max(1) {
            self.size_history.pop_front();
        }
        let inv: f32 = self.size_history.iter().map(|s| 1.0 / (*s).max(1) as f32).sum();
        self.stats.effective_size = self.size_history.len() as f32 / inv;
        self.stats.min_size = if self.stats.min_size == 0 { size } else { self.stats.min_size.min(size) };
        if (size as f32) < 0.5 * mean_before {
            self.stats.generations_since_bottleneck = 0;
        } else {
            self.stats.generations_since_bottleneck += 1;
        }
    }
}

/// Species split off in one detection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciationEvent {
    pub parent: u64,
    pub species: u64,
    pub generation: u64,
    pub members: usize,
    pub mean_distance: f32,
}

/// Symmetric pairwise distances over a member list.
pub struct DistanceMatrix {
    n: usize,
    data: Vec<f32>,
}

impl DistanceMatrix {
    pub fn compute(genomes: &[&DiploidGenome]) -> Self {
        let n = genomes.len();
        let rows: Vec<Vec<f32>> =
            (0..n).into_par_iter().map(|i| (i + 1..n).map(|j| genomes[i].distance(genomes[j])).collect()).collect();
        let mut data = vec![0.0; n * n];
        for (i, row) in rows.into_iter().enumerate() {
            for (k, d) in row.into_iter().enumerate() {
                let j = i + 1 + k;
                data[i * n + j] = d;
                data[j * n + i] = d;
            }
        }
        Self { n, data }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.n + j]
    }

    /// Single-linkage clusters at `threshold`, largest first.
    pub fn single_linkage(&self, threshold: f32) -> Vec<Vec<usize>> {
        let mut parent: Vec<usize> = (0..self.n).collect();
        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }
        for i in 0..self.n {
            for j in i + 1..self.n {
                if self.get(i, j) < threshold {
                    let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
            }
        }
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..self.n {
            let root = find(&mut parent, i);
            groups.entry(root).or_default().push(i);
        }
        let mut clusters: Vec<Vec<usize>> = groups.into_values().collect();
        clusters.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));
        clusters
    }

    /// Mean distance between `cluster` members and every index outside it.
    pub fn mean_distance_to_rest(&self, cluster: &[usize]) -> f32 {
        let mut inside = vec![false; self.n];
        for &i in cluster {
            inside[i] = true;
        }
        let (mut sum, mut count) = (0.0f32, 0u32);
        for &i in cluster {
            for j in (0..self.n).filter(|j| !inside[*j]) {
                sum += self.get(i, j);
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }
}

pub struct SpeciesManager {
    config: SpeciationConfig,
    mate: MateConfig,
    species: BTreeMap<u64, Species>,
    tree: PhylogeneticTree,
    speciation_count: u64,
    extinction_count: u64,
}

impl SpeciesManager {
    pub fn new(config: SpeciationConfig, mate: MateConfig) -> Self {
        Self {
            config,
            mate,
            species: BTreeMap::new(),
            tree: PhylogeneticTree::new(),
            speciation_count: 0,
            extinction_count: 0,
        }
    }

    pub fn config(&self) -> &SpeciationConfig {
        &self.config
    }

    pub fn tree(&self) -> &PhylogeneticTree {
        &self.tree
    }

    pub fn get(&self, id: u64) -> Option<&Species> {
        self.species.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Species> {
        self.species.values()
    }

    pub fn extant(&self) -> impl Iterator<Item = &Species> {
        self.species.values().filter(|s| !s.extinct)
    }

    pub fn extant_count(&self) -> usize {
        self.extant().count()
    }

    pub fn speciation_count(&self) -> u64 {
        self.speciation_count
    }

    pub fn extinction_count(&self) -> u64 {
        self.extinction_count
    }

    pub fn name_of(&self, id: u64) -> String {
        self.species.get(&id).map(|s| s.name.clone()).unwrap_or_else(|| format!("species-{id}"))
    }

    pub fn newick(&self) -> String {
        self.tree.to_newick(|id| self.name_of(id))
    }

    /// Tracks a species whose id was assigned elsewhere.
    pub fn register(&mut self, id: u64, founding_lineage: u64, generation: u64) -> &Species {
        Species::reserve_id(id);
        if !self.species.contains_key(&id) {
            self.tree.add_species(id, generation);
            tracing::debug!(species = id, generation, "species registered");
        }
        self.species.entry(id).or_insert_with(|| Species::new(id, founding_lineage, generation, None, NicheCentroid::default()))
    }

    /// One generation of bookkeeping. Returns the speciation events detected.
    pub fn update(&mut self, creatures: &mut [Creature], generation: u64) -> Vec<SpeciationEvent> {
        self.assign_founders(creatures, generation);
        for c in creatures.iter().filter(|c| c.alive) {
            if !self.species.contains_key(&c.species_id()) {
                self.register(c.species_id(), c.genome.lineage_id(), generation);
            }
        }

        let detailed = generation % self.config.check_interval.max(1) == 0;
        let mut events = Vec::new();
        if detailed {
            let ids: Vec<u64> = self.extant().map(Species::id).collect();
            for id in ids {
                events.extend(self.detect(id, creatures, generation));
            }
        }

        self.refresh_members(creatures);
        self.mark_extinctions(generation);
        self.update_stats(creatures, detailed);
        if detailed {
            self.update_isolation(creatures);
        }
        events
    }

    fn assign_founders(&mut self, creatures: &mut [Creature], generation: u64) {
        let Some(first) = creatures.iter().find(|c| c.alive && c.species_id() == 0) else { return };
        let id = Species::mint_id();
        let niche = NicheCentroid::of(creatures.iter().filter(|c| c.alive && c.species_id() == 0).map(|c| &c.genome));
        let species = Species::new(id, first.genome.lineage_id(), generation, None, niche);
        tracing::info!(species = id, name = %species.name, generation, "founding species");
        self.species.insert(id, species);
        self.tree.add_species(id, generation);
        for c in creatures.iter_mut().filter(|c| c.alive && c.species_id() == 0) {
            c.genome.species_id = id;
        }
    }

    fn detect(&mut self, species_id: u64, creatures: &mut [Creature], generation: u64) -> Vec<SpeciationEvent> {
        let members: Vec<usize> = creatures
            .iter()
            .enumerate()
            .filter(|(_, c)| c.alive && c.species_id() == species_id)
            .map(|(i, _)| i)
            .collect();
        if members.len() < 2 * self.config.min_species_size {
            return Vec::new();
        }
        let genomes: Vec<&DiploidGenome> = members.iter().map(|&i| &creatures[i].genome).collect();
        let matrix = DistanceMatrix::compute(&genomes);
        let clusters = matrix.single_linkage(self.config.cluster_threshold);

        let mut events = Vec::new();
        for cluster in clusters.iter().skip(1).filter(|c| c.len() >= self.config.min_species_size) {
            let mean_distance = matrix.mean_distance_to_rest(cluster);
            if mean_distance <= self.config.species_threshold {
                continue;
            }
            let founder = &creatures[members[cluster[0]]];
            let niche = NicheCentroid::of(cluster.iter().map(|&k| &creatures[members[k]].genome));
            let id = Species::mint_id();
            let species = Species::new(id, founder.genome.lineage_id(), generation, Some(species_id), niche);
            for &k in cluster {
                creatures[members[k]].genome.species_id = id;
            }
            if self.tree.speciate(species_id, id, generation).is_none() {
                self.tree.add_species(id, generation);
            }
            tracing::info!(
                parent = species_id,
                species = id,
                name = %species.name,
                members = cluster.len(),
                mean_distance,
                generation,
                "speciation"
            );
            self.species.insert(id, species);
            self.speciation_count += 1;
            events.push(SpeciationEvent { parent: species_id, species: id, generation, members: cluster.len(), mean_distance });
        }
        events
    }

    fn refresh_members(&mut self, creatures: &[Creature]) {
        for s in self.species.values_mut() {
            s.members.clear();
        }
        for c in creatures.iter().filter(|c| c.alive) {
            if let Some(s) = self.species.get_mut(&c.species_id()) {
                s.members.push(c.id());
            }
        }
    }

    fn mark_extinctions(&mut self, generation: u64) {
        for s in self.species.values_mut().filter(|s| !s.extinct && s.members.is_empty()) {
            s.extinct = true;
            s.extinction_generation = Some(generation);
            self.tree.mark_extinct(s.id);
            self.extinction_count += 1;
            tracing::info!(species = s.id, name = %s.name, generation, "extinction");
        }
    }

    fn update_stats(&mut self, creatures: &[Creature], detailed: bool) {
        let history = self.config.size_history;
        let mut by_species: HashMap<u64, Vec<&Creature>> = HashMap::new();
        for c in creatures.iter().filter(|c| c.alive) {
            by_species.entry(c.species_id()).or_default().push(c);
        }
        for s in self.species.values_mut().filter(|s| !s.extinct) {
            let members = by_species.get(&s.id).map(Vec::as_slice).unwrap_or(&[]);
            let n = members.len().max(1) as f32;
            s.stats.size = members.len();
            s.stats.heterozygosity = members.iter().map(|c| c.genome.heterozygosity()).sum::<f32>() / n;
            s.stats.mean_fitness = members.iter().map(|c| c.genetic_fitness()).sum::<f32>() / n;
            s.stats.genetic_load = members.iter().map(|c| c.genome.genetic_load()).sum::<f32>() / n;
            s.record_size(members.len(), history);
            if detailed {
                s.niche = NicheCentroid::of(members.iter().map(|c| &c.genome));
                s.allele_frequencies = allele_frequencies(members);
            }
        }
    }

    fn update_isolation(&mut self, creatures: &[Creature]) {
        let sample = self.config.isolation_sample.max(1);
        let mut reps: BTreeMap<u64, Vec<&DiploidGenome>> = BTreeMap::new();
        for c in creatures.iter().filter(|c| c.alive) {
            let v = reps.entry(c.species_id()).or_default();
            if v.len() < sample {
                v.push(&c.genome);
            }
        }
        let ids: Vec<u64> = reps.keys().copied().collect();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                let (ra, rb) = (&reps[&a], &reps[&b]);
                let mut total = 0.0;
                for ga in ra {
                    for gb in rb {
                        total += compatibility(ga, gb, &self.mate).isolation();
                    }
                }
                let value = total / (ra.len() * rb.len()).max(1) as f32;
                if let Some(s) = self.species.get_mut(&a) {
                    s.isolation.insert(b, value);
                }
                if let Some(s) = self.species.get_mut(&b) {
                    s.isolation.insert(a, value);
                }
            }
        }
        for s in self.species.values_mut() {
            if s.extinct {
                s.isolation.clear();
            } else {
                s.isolation.retain(|other, _| reps.contains_key(other));
            }
        }
    }
}

fn allele_frequencies(members: &[&Creature]) -> HashMap<u64, f32> {
    let mut counts: HashMap<u64, u32> = HashMap::new();
    let mut total = 0u32;
    for c in members {
        for gene in c.genome.genes() {
            for allele in [&gene.maternal, &gene.paternal] {
                *counts.entry(allele.id()).or_insert(0) += 1;
                total += 1;
            }
        }
    }
    let total = total.max(1) as f32;
    counts.into_iter().map(|(id, n)| (id, n as f32 / total)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allele::Allele;
    use crate::config::GeneticsConfig;
    use glam::Vec3;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn population(n: usize, seed: u64) -> Vec<Creature> {
        let config = GeneticsConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n).map(|_| Creature::new(DiploidGenome::founder(&config.genome, &mut rng), Vec3::ZERO, 0)).collect()
    }

    fn push_to_extreme(c: &mut Creature) {
        for gene in c.genome.genes_mut() {
            let r = gene.range();
            gene.maternal = Allele::new(r.max, 0.5);
            gene.paternal = Allele::new(r.max, 0.5);
        }
    }

    fn manager() -> SpeciesManager {
        let c = GeneticsConfig::default();
        SpeciesManager::new(c.speciation, c.mate)
    }

    #[test]
    fn founders_share_one_root_species() {
        let mut creatures = population(30, 1);
        let mut m = manager();
        let events = m.update(&mut creatures, 0);
        assert!(events.is_empty());
        assert_eq!(m.extant_count(), 1);
        let id = creatures[0].species_id();
        assert!(creatures.iter().all(|c| c.species_id() == id));
        assert_eq!(m.tree().node_of(id), m.tree().root());
        assert_eq!(m.get(id).unwrap().stats.size, 30);
    }

    #[test]
    fn divergent_cluster_splits_off() {
        let mut creatures = population(40, 2);
        let mut m = manager();
        m.update(&mut creatures, 0);
        let parent = creatures[0].species_id();
        for c in creatures.iter_mut().skip(25) {
            push_to_extreme(c);
        }
        let events = m.update(&mut creatures, 7);
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.parent, parent);
        assert_eq!(e.members, 15);
        assert!(creatures[25..].iter().all(|c| c.species_id() == e.species));
        assert!(creatures[..25].iter().all(|c| c.species_id() == parent));
        assert_eq!(m.speciation_count(), 1);
        let root = m.tree().root().unwrap();
        let daughter = m.tree().node_of(e.species).unwrap();
        assert_eq!(m.tree().descendants(root), vec![daughter]);
        assert_eq!(m.tree().node_of(parent), Some(root));
        assert!(m.tree().node(root).unwrap().is_extant());
        assert_eq!(m.tree().node(daughter).unwrap().branch_length, 7);
        assert!(m.tree().is_consistent());
        let iso = m.get(parent).unwrap().isolation[&e.species];
        assert!(iso > 0.0);
    }

    #[test]
    fn small_species_are_not_split() {
        let mut creatures = population(15, 3);
        let mut m = manager();
        m.update(&mut creatures, 0);
        for c in creatures.iter_mut().skip(5) {
            push_to_extreme(c);
        }
        assert!(m.update(&mut creatures, 1).is_empty());
    }

    #[test]
    fn empty_species_go_extinct_for_good() {
        let mut creatures = population(5, 4);
        let mut m = manager();
        m.update(&mut creatures, 0);
        let id = creatures[0].species_id();
        for c in &mut creatures {
            c.alive = false;
        }
        m.update(&mut creatures, 3);
        let s = m.get(id).unwrap();
        assert!(s.is_extinct());
        assert_eq!(s.extinction_generation(), Some(3));
        for c in &mut creatures {
            c.alive = true;
        }
        m.update(&mut creatures, 4);
        assert!(m.get(id).unwrap().is_extinct());
        assert_eq!(m.extinction_count(), 1);
    }

    #[test]
    fn registered_ids_are_never_reminted() {
        let mut m = manager();
        m.register(1_000_000, 1, 0);
        let mut creatures = population(3, 5);
        m.update(&mut creatures, 0);
        assert!(creatures[0].species_id() > 1_000_000);
    }

    #[test]
    fn effective_size_is_harmonic_mean() {
        let mut s = Species::new(1, 1, 0, None, NicheCentroid::default());
        s.record_size(10, 20);
        s.record_size(40, 20);
        assert!((s.stats.effective_size - 16.0).abs() < 1e-4);
        assert_eq!(s.stats.min_size, 10);
        s.record_size(5, 20);
        assert_eq!(s.stats.generations_since_bottleneck, 0);
    }

    #[test]
    fn clusters_are_largest_first() {
        let g = population(4, 6);
        let mut far = g[3].clone();
        push_to_extreme(&mut far);
        let genomes: Vec<&DiploidGenome> = vec![&g[0].genome, &far.genome, &g[1].genome, &g[2].genome];
        let m = DistanceMatrix::compute(&genomes);
        assert!((m.get(0, 1) - m.get(1, 0)).abs() < 1e-6);
        let clusters = m.single_linkage(0.1);
        assert_eq!(clusters, vec![vec![0, 2, 3], vec![1]]);
        assert!(m.mean_distance_to_rest(&clusters[1]) > 0.15);
    }
}
