//! Chromosomes, crossover and single-strand structural mutation.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::gene::{Gene, GeneType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructuralMutation {
    Duplication,
    Deletion,
    Inversion,
    Translocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossover {
    None,
    SinglePoint(usize),
    TwoPoint(usize, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chromosome {
    id: u64,
    pub genes: Vec<Gene>,
    pub recombination_rate: f32,
}

impl Chromosome {
    fn mint_id() -> u64 {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NEXT.fetch_add(1, Ordering::Relaxed)
    }

    pub fn new(genes: Vec<Gene>, recombination_rate: f32) -> Self {
        Self { id: Self::mint_id(), genes, recombination_rate: recombination_rate.clamp(0.0, 1.0) }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn layout(&self) -> Vec<GeneType> {
        self.genes.iter().map(|g| g.gene_type).collect()
    }

    /// Rolls the crossover applied between `self` and `other`: with the
    /// chromosome's recombination rate a crossover happens, 70% of those two-point.
    pub fn roll_crossover(&self, other: &Chromosome, rng: &mut impl Rng) -> Crossover {
        let n = self.len().min(other.len());
        if n < 2 || !rng.gen_bool(self.recombination_rate as f64) {
            return Crossover::None;
        }
        if n >= 3 && rng.gen_bool(0.7) {
            let a = rng.gen_range(1..n);
            let mut b = rng.gen_range(1..n - 1);
            if b >= a {
                b += 1;
            }
            Crossover::TwoPoint(a.min(b), a.max(b))
        } else {
            Crossover::SinglePoint(rng.gen_range(1..n))
        }
    }

    /// The two recombinant strands of a crossover, `self` leading the first.
    pub fn recombine(&self, other: &Chromosome, crossover: Crossover) -> (Chromosome, Chromosome) {
        let (a, b) = (&self.genes, &other.genes);
        let (first, second) = match crossover {
            Crossover::None => (a.clone(), b.clone()),
            Crossover::SinglePoint(c) => (splice(&[(a, 0, c), (b, c, b.len())]), splice(&[(b, 0, c), (a, c, a.len())])),
            Crossover::TwoPoint(c1, c2) => (
                splice(&[(a, 0, c1), (b, c1, c2), (a, c2, a.len())]),
                splice(&[(b, 0, c1), (a, c1, c2), (b, c2, b.len())]),
            ),
        };
        (Chromosome::new(first, self.recombination_rate), Chromosome::new(second, other.recombination_rate))
    }

    /// Meiosis for one pair: cross over, then keep one strand at random.
    pub fn gamete_strand(&self, other: &Chromosome, rng: &mut impl Rng) -> Chromosome {
        let crossover = self.roll_crossover(other, rng);
        let (first, second) = self.recombine(other, crossover);
        if rng.gen_bool(0.5) {
            first
        } else {
            second
        }
    }

    /// Applies one structural edit in place. Returns false when the strand is
    /// too short for it.
    pub fn apply_structural(&mut self, kind: StructuralMutation, rng: &mut impl Rng) -> bool {
        let n = self.genes.len();
        match kind {
            StructuralMutation::Duplication => {
                if n == 0 {
                    return false;
                }
                let i = rng.gen_range(0..n);
                let copy = self.genes[i].clone();
                self.genes.insert(i + 1, copy);
            }
            StructuralMutation::Deletion => {
                if n <= 1 {
                    return false;
                }
                self.genes.remove(rng.gen_range(0..n));
            }
            StructuralMutation::Inversion => {
                if n < 2 {
                    return false;
                }
                let a = rng.gen_range(0..n - 1);
                let b = rng.gen_range(a + 1..n);
                self.genes[a..=b].reverse();
            }
            StructuralMutation::Translocation => {
                if n < 3 {
                    return false;
                }
                let start = rng.gen_range(0..n - 1);
                let end = rng.gen_range(start + 1..n);
                let segment: Vec<Gene> = self.genes.drain(start..end).collect();
                let at = rng.gen_range(0..=self.genes.len());
                self.genes.splice(at..at, segment);
            }
        }
        for (locus, gene) in self.genes.iter_mut().enumerate() {
            gene.locus = locus as u32;
        }
        true
    }
}

fn splice(parts: &[(&Vec<Gene>, usize, usize)]) -> Vec<Gene> {
    parts
        .iter()
        .flat_map(|(src, from, to)| {
            let to = (*to).min(src.len());
            let from = (*from).min(to);
            src[from..to].iter().cloned()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allele::Allele;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn strand(values: &[f32]) -> Chromosome {
        let genes = values
            .iter()
            .enumerate()
            .map(|(i, v)| Gene::new(i as u32, GeneType::BASE[i], Allele::new(*v, 0.5), Allele::new(*v, 0.5)))
            .collect();
        Chromosome::new(genes, 1.0)
    }

    fn values(c: &Chromosome) -> Vec<f32> {
        c.genes.iter().map(|g| g.maternal.value()).collect()
    }

    #[test]
    fn single_point_swaps_tails() {
        let a = strand(&[1.0, 1.0, 1.0, 1.0]);
        let b = strand(&[2.0, 2.0, 2.0, 2.0]);
        let (x, y) = a.recombine(&b, Crossover::SinglePoint(1));
        assert_eq!(values(&x), vec![1.0, 2.0, 2.0, 2.0]);
        assert_eq!(values(&y), vec![2.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn two_point_swaps_middle() {
        let a = strand(&[1.0; 5]);
        let b = strand(&[2.0; 5]);
        let (x, _) = a.recombine(&b, Crossover::TwoPoint(1, 3));
        assert_eq!(values(&x), vec![1.0, 2.0, 2.0, 1.0, 1.0]);
    }

    #[test]
    fn rolled_cuts_are_interior_and_distinct() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let a = strand(&[0.0; 6]);
        for _ in 0..500 {
            match a.roll_crossover(&a, &mut rng) {
                Crossover::TwoPoint(c1, c2) => assert!(1 <= c1 && c1 < c2 && c2 < 6),
                Crossover::SinglePoint(c) => assert!((1..6).contains(&c)),
                Crossover::None => panic!("rate 1.0 always crosses over"),
            }
        }
    }

    #[test]
    fn structural_edits_renumber_loci() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut c = strand(&[0.1, 0.2, 0.3, 0.4, 0.5]);
        assert!(c.apply_structural(StructuralMutation::Duplication, &mut rng));
        assert_eq!(c.len(), 6);
        assert!(c.apply_structural(StructuralMutation::Deletion, &mut rng));
        assert!(c.apply_structural(StructuralMutation::Inversion, &mut rng));
        assert!(c.apply_structural(StructuralMutation::Translocation, &mut rng));
        assert_eq!(c.len(), 5);
        for (i, g) in c.genes.iter().enumerate() {
            assert_eq!(g.locus, i as u32);
        }
    }

    #[test]
    fn deletion_keeps_last_gene() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let mut c = strand(&[0.5]);
        assert!(!c.apply_structural(StructuralMutation::Deletion, &mut rng));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn recombinants_get_fresh_ids() {
        let a = strand(&[1.0; 3]);
        let (x, y) = a.recombine(&a, Crossover::None);
        assert_ne!(x.id(), a.id());
        assert_ne!(x.id(), y.id());
    }
}
