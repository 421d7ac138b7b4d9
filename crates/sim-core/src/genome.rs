//! Diploid genomes: founding, meiosis, fertilization, mutation, expression
//! and the per-genome population-genetic measures.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

use crate::allele::Allele;
use crate::chromosome::{Chromosome, StructuralMutation};
use crate::config::{GenomeConfig, MutationConfig};
use crate::gene::{EpigeneticMark, Gene, GeneType, MarkKind, NEURAL_SLOTS};

/// Two parent-derived strands at one chromosome locus.
#[derive(Debug, Clone, PartialEq)]
pub struct ChromosomePair {
    pub maternal: Chromosome,
    pub paternal: Chromosome,
}

impl ChromosomePair {
    pub fn new(maternal: Chromosome, paternal: Chromosome) -> Self {
        Self { maternal, paternal }
    }

    pub fn strands(&self) -> [&Chromosome; 2] {
        [&self.maternal, &self.paternal]
    }

    pub fn is_structurally_heterozygous(&self) -> bool {
        self.maternal.layout() != self.paternal.layout()
    }
}

/// One strand per chromosome pair, produced by meiosis.
pub type Gamete = Vec<Chromosome>;

/// Expressed trait values indexed by [`GeneType::index`].
#[derive(Debug, Clone, PartialEq)]
pub struct Phenotype {
    values: [f32; GeneType::COUNT],
}

impl Phenotype {
    pub fn get(&self, gene_type: GeneType) -> f32 {
        self.values[gene_type.index()]
    }

    /// Value mapped into [0, 1] over the gene type's range.
    pub fn normalized(&self, gene_type: GeneType) -> f32 {
        gene_type.range().normalize(self.get(gene_type))
    }

    pub fn iter(&self) -> impl Iterator<Item = (GeneType, f32)> + '_ {
        GeneType::all().map(|gt| (gt, self.get(gt)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiploidGenome {
    pub species_id: u64,
    lineage_id: u64,
    pub hybrid: bool,
    pub pairs: Vec<ChromosomePair>,
}

impl DiploidGenome {
    fn mint_lineage() -> u64 {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NEXT.fetch_add(1, Ordering::Relaxed)
    }

    pub fn from_pairs(pairs: Vec<ChromosomePair>) -> Self {
        Self { species_id: 0, lineage_id: Self::mint_lineage(), hybrid: false, pairs }
    }

    /// The canonical gene-type layout: every type once, dealt round-robin
    /// across `chromosome_count` chromosomes.
    pub fn layout(config: &GenomeConfig) -> Vec<Vec<GeneType>> {
        let count = config.chromosome_count.max(1);
        let mut layout = vec![Vec::new(); count];
        for (i, gt) in GeneType::all().enumerate() {
            layout[i % count].push(gt);
        }
        layout
    }

    /// Founder genome: every allele sits at its type's ancestral value,
    /// jittered by `founder_variation` of the range width.
    pub fn founder(config: &GenomeConfig, rng: &mut impl Rng) -> Self {
        let pairs = Self::layout(config)
            .iter()
            .map(|types| {
                let maternal = founder_strand(types, config, rng);
                let paternal = founder_strand(types, config, rng);
                ChromosomePair::new(maternal, paternal)
            })
            .collect();
        Self::from_pairs(pairs)
    }

    pub fn lineage_id(&self) -> u64 {
        self.lineage_id
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn gene_count(&self) -> usize {
        self.strands().map(Chromosome::len).sum()
    }

    pub fn strands(&self) -> impl Iterator<Item = &Chromosome> {
        self.pairs.iter().flat_map(|p| p.strands())
    }

    pub fn genes(&self) -> impl Iterator<Item = &Gene> {
        self.strands().flat_map(|c| c.genes.iter())
    }

    pub fn genes_mut(&mut self) -> impl Iterator<Item = &mut Gene> {
        self.pairs
            .iter_mut()
            .flat_map(|p| [&mut p.maternal, &mut p.paternal])
            .flat_map(|c| c.genes.iter_mut())
    }

    /// Meiosis: one recombinant strand per pair.
    pub fn gamete(&self, rng: &mut impl Rng) -> Gamete {
        self.pairs.iter().map(|p| p.maternal.gamete_strand(&p.paternal, rng)).collect()
    }

    /// Zips one gamete from each parent into an offspring genome. The pair
    /// count is the shorter gamete's; heritable marks pass on independently.
    pub fn fertilize(
        parent1: &DiploidGenome,
        parent2: &DiploidGenome,
        force_hybrid: bool,
        rng: &mut impl Rng,
    ) -> DiploidGenome {
        let g1 = parent1.gamete(rng);
        let g2 = parent2.gamete(rng);
        let mut child = Self::from_gametes(g1, g2);
        for gene in child.genes_mut() {
            gene.inherit_marks(rng);
        }
        child.species_id = parent1.species_id;
        child.hybrid = force_hybrid || parent1.species_id != parent2.species_id;
        child
    }

    pub fn from_gametes(maternal: Gamete, paternal: Gamete) -> DiploidGenome {
        let pairs = maternal.into_iter().zip(paternal).map(|(m, p)| ChromosomePair::new(m, p)).collect();
        Self::from_pairs(pairs)
    }

    /// Point mutations (per strand, at `rate`) then structural mutations.
    /// Returns the number of point mutations applied.
    pub fn mutate(&mut self, config: &MutationConfig, rng: &mut impl Rng) -> usize {
        let mut applied = 0;
        for pair in &mut self.pairs {
            for strand in [&mut pair.maternal, &mut pair.paternal] {
                if !strand.is_empty() && rng.gen_bool(config.rate.clamp(0.0, 1.0) as f64) {
                    let i = rng.gen_range(0..strand.len());
                    strand.genes[i].mutate_allele(config.strength, rng);
                    applied += 1;
                }
                for (kind, rate) in config.structural_rates() {
                    if rate > 0.0 && rng.gen_bool(rate.clamp(0.0, 1.0) as f64) && strand.apply_structural(kind, rng) {
                        tracing::trace!(?kind, chromosome = strand.id(), "structural mutation");
                    }
                }
            }
        }
        applied
    }

    /// Mean phenotype per gene type over every copy in the genome. Types with
    /// no remaining copies express their ancestral value.
    pub fn phenotype(&self) -> Phenotype {
        let mut sums = [0.0f32; GeneType::COUNT];
        let mut counts = [0u32; GeneType::COUNT];
        for gene in self.genes() {
            let i = gene.gene_type.index();
            sums[i] += gene.phenotype();
            counts[i] += 1;
        }
        let mut values = [0.0f32; GeneType::COUNT];
        for gt in GeneType::all() {
            let i = gt.index();
            values[i] = if counts[i] > 0 { sums[i] / counts[i] as f32 } else { gt.range().default };
        }
        Phenotype { values }
    }

    pub fn trait_value(&self, gene_type: GeneType) -> f32 {
        let (sum, n) = self
            .genes()
            .filter(|g| g.gene_type == gene_type)
            .fold((0.0, 0u32), |(s, n), g| (s + g.phenotype(), n + 1));
        if n == 0 {
            gene_type.range().default
        } else {
            sum / n as f32
        }
    }

    /// Neural weights by slot; the last gene found for a slot wins.
    pub fn neural_weights(&self) -> Vec<f32> {
        let mut weights = vec![0.0; NEURAL_SLOTS as usize];
        for gene in self.genes() {
            if let GeneType::NeuralWeight(slot) = gene.gene_type {
                if let Some(w) = weights.get_mut(slot as usize) {
                    *w = gene.phenotype();
                }
            }
        }
        weights
    }

    pub fn heterozygosity(&self) -> f32 {
        mean(self.genes().map(Gene::heterozygosity))
    }

    pub fn genetic_load(&self) -> f32 {
        self.genes().map(Gene::load).sum()
    }

    /// Fraction of homozygous loci.
    pub fn inbreeding_coefficient(&self) -> f32 {
        mean(self.genes().map(|g| if g.is_homozygous() { 1.0 } else { 0.0 }))
    }

    pub fn deleterious_count(&self) -> usize {
        self.genes()
            .map(|g| usize::from(g.maternal.is_deleterious()) + usize::from(g.paternal.is_deleterious()))
            .sum()
    }

    /// Genetic distance in [0, 1]: mean normalized allele difference over
    /// positions whose gene types match, plus the proportional gene-count gap.
    pub fn distance(&self, other: &DiploidGenome) -> f32 {
        let mut total = 0.0f32;
        let mut compared = 0u32;
        for (a, b) in self.pairs.iter().zip(&other.pairs) {
            for (sa, sb) in [(&a.maternal, &b.maternal), (&a.paternal, &b.paternal)] {
                for (ga, gb) in sa.genes.iter().zip(&sb.genes) {
                    if ga.gene_type != gb.gene_type {
                        continue;
                    }
                    let (a_lo, a_hi) = ga.allele_signature();
                    let (b_lo, b_hi) = gb.allele_signature();
                    total += ((a_lo - b_lo).abs() + (a_hi - b_hi).abs()) * 0.5;
                    compared += 1;
                }
            }
        }
        let allelic = if compared > 0 { total / compared as f32 } else { 0.0 };
        let (na, nb) = (self.gene_count(), other.gene_count());
        let structural = if na.max(nb) > 0 { na.abs_diff(nb) as f32 / na.max(nb) as f32 } else { 0.0 };
        (allelic + structural).clamp(0.0, 1.0)
    }

    /// Heritable methylation on random genes, at intensity proportional to stress.
    pub fn apply_stress(&mut self, stress: f32, generations: u32, rng: &mut impl Rng) -> usize {
        let stress = stress.clamp(0.0, 1.0);
        let mut marked = 0;
        for gene in self.genes_mut() {
            if rng.gen_bool((stress * 0.1) as f64) {
                gene.add_mark(EpigeneticMark::new(MarkKind::Methylation, stress, generations, true));
                marked += 1;
            }
        }
        marked
    }

    /// Methylation on size, metabolic and maturation genes when food is scarce.
    pub fn apply_malnutrition(&mut self, nutrition: f32, generations: u32) -> usize {
        let deficit = (1.0 - nutrition.clamp(0.0, 1.0)).clamp(0.0, 1.0);
        let mut marked = 0;
        for gene in self.genes_mut().filter(|g| g.gene_type.is_nutritional()) {
            gene.add_mark(EpigeneticMark::new(MarkKind::Methylation, deficit, generations, false));
            marked += 1;
        }
        marked
    }

    pub fn decay_marks(&mut self, factor: f32) {
        for gene in self.genes_mut() {
            gene.decay_marks(factor);
        }
    }

    pub fn mark_count(&self) -> usize {
        self.genes().map(|g| g.marks.len()).sum()
    }
}

fn founder_strand(types: &[GeneType], config: &GenomeConfig, rng: &mut impl Rng) -> Chromosome {
    let genes = types
        .iter()
        .enumerate()
        .map(|(locus, gt)| {
            let maternal = founder_allele(*gt, config.founder_variation, rng);
            let paternal = founder_allele(*gt, config.founder_variation, rng);
            Gene::new(locus as u32, *gt, maternal, paternal)
        })
        .collect();
    Chromosome::new(genes, config.recombination_rate)
}

fn founder_allele(gene_type: GeneType, variation: f32, rng: &mut impl Rng) -> Allele {
    let r = gene_type.range();
    let jitter = if variation > 0.0 { rng.gen_range(-variation..=variation) * r.width() } else { 0.0 };
    Allele::new(r.clamp(r.default + jitter), 0.5)
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, n) = values.fold((0.0f32, 0u32), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneticsConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn founder(seed: u64) -> DiploidGenome {
        DiploidGenome::founder(&GeneticsConfig::default().genome, &mut ChaCha8Rng::seed_from_u64(seed))
    }

    #[test]
    fn founder_carries_every_type_on_both_strands() {
        let g = founder(1);
        assert_eq!(g.gene_count(), GeneType::COUNT * 2);
        for pair in &g.pairs {
            assert!(!pair.is_structurally_heterozygous());
        }
        assert_eq!(g.species_id, 0);
        assert!(!g.hybrid);
    }

    #[test]
    fn copying_strands_makes_every_locus_homozygous() {
        let mut g = founder(4);
        for gene in g.genes_mut() {
            gene.paternal = gene.maternal.clone();
        }
        assert_eq!(g.inbreeding_coefficient(), 1.0);
        assert_eq!(g.heterozygosity(), 0.0);
    }

    #[test]
    fn lineage_ids_are_unique() {
        assert_ne!(founder(1).lineage_id(), founder(1).lineage_id());
    }

    #[test]
    fn distance_to_self_is_zero() {
        let g = founder(2);
        assert_eq!(g.distance(&g), 0.0);
    }

    #[test]
    fn founders_are_close() {
        let (a, b) = (founder(3), founder(4));
        let d = a.distance(&b);
        assert!(d > 0.0 && d < 0.05, "{d}");
    }

    #[test]
    fn structural_gap_adds_distance() {
        let a = founder(5);
        let mut b = a.clone();
        b.pairs[0].maternal.genes.truncate(1);
        assert!(b.distance(&a) > 0.0);
        assert!((b.distance(&a) - a.distance(&b)).abs() < 1e-6);
    }

    #[test]
    fn fertilize_sets_hybrid_on_species_mismatch() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut a = founder(6);
        let mut b = founder(7);
        a.species_id = 1;
        b.species_id = 1;
        let child = DiploidGenome::fertilize(&a, &b, false, &mut rng);
        assert!(!child.hybrid);
        assert_eq!(child.species_id, 1);
        assert!(DiploidGenome::fertilize(&a, &b, true, &mut rng).hybrid);
        b.species_id = 2;
        let child = DiploidGenome::fertilize(&a, &b, false, &mut rng);
        assert!(child.hybrid);
        assert_eq!(child.species_id, 1);
    }

    #[test]
    fn offspring_pair_count_is_minimum() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let a = founder(8);
        let mut b = founder(9);
        b.pairs.pop();
        let child = DiploidGenome::fertilize(&a, &b, false, &mut rng);
        assert_eq!(child.pair_count(), a.pair_count().min(b.pair_count()));
    }

    #[test]
    fn neural_weights_fill_every_slot() {
        let g = founder(10);
        let w = g.neural_weights();
        assert_eq!(w.len(), NEURAL_SLOTS as usize);
        assert!(w.iter().all(|v| v.abs() <= 2.0));
    }

    #[test]
    fn founders_are_load_free() {
        let g = founder(11);
        assert_eq!(g.genetic_load(), 0.0);
        assert_eq!(g.deleterious_count(), 0);
    }

    #[test]
    fn mutation_changes_alleles() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let mut g = founder(12);
        let before = g.clone();
        let config = MutationConfig { rate: 1.0, ..Default::default() };
        let applied = g.mutate(&config, &mut rng);
        assert_eq!(applied, g.pair_count() * 2);
        assert_ne!(g, before);
    }

    #[test]
    fn malnutrition_marks_only_nutritional_genes() {
        let mut g = founder(13);
        let marked = g.apply_malnutrition(0.1, 3);
        assert_eq!(marked, 6);
        assert!(g.genes().filter(|x| !x.marks.is_empty()).all(|x| x.gene_type.is_nutritional()));
        let size_before = founder(13).trait_value(GeneType::Size);
        assert!(g.trait_value(GeneType::Size) <= size_before + 1e-4);
    }

    #[test]
    fn phenotype_matches_trait_value() {
        let g = founder(14);
        let p = g.phenotype();
        for gt in [GeneType::Size, GeneType::ColorBlue, GeneType::NeuralWeight(3)] {
            assert!((p.get(gt) - g.trait_value(gt)).abs() < 1e-5);
        }
    }
}
