//! Immutable alleles and point mutation.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::gene::GeneRange;

/// Which mutation class produced an allele.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    Founder,
    Silent,
    Missense,
    Nonsense,
    Regulatory,
    DominanceShift,
}

impl MutationKind {
    /// Rolls a point-mutation class: 25% silent, 40% missense, 15% nonsense,
    /// 10% regulatory, 10% dominance shift.
    pub fn roll(rng: &mut impl Rng) -> Self {
        match rng.gen_range(0..100u32) {
            0..=24 => MutationKind::Silent,
            25..=64 => MutationKind::Missense,
            65..=79 => MutationKind::Nonsense,
            80..=89 => MutationKind::Regulatory,
            _ => MutationKind::DominanceShift,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Allele {
    id: u64,
    value: f32,
    dominance: f32,
    fitness_effect: f32,
    expression: f32,
    deleterious: bool,
    origin: MutationKind,
}

impl Allele {
    fn mint_id() -> u64 {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NEXT.fetch_add(1, Ordering::Relaxed)
    }

    /// Founder allele with neutral fitness and unit expression.
    pub fn new(value: f32, dominance: f32) -> Self {
        Self {
            id: Self::mint_id(),
            value,
            dominance: dominance.clamp(0.0, 1.0),
            fitness_effect: 0.0,
            expression: 1.0,
            deleterious: false,
            origin: MutationKind::Founder,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn dominance(&self) -> f32 {
        self.dominance
    }

    pub fn fitness_effect(&self) -> f32 {
        self.fitness_effect
    }

    pub fn expression(&self) -> f32 {
        self.expression
    }

    pub fn is_deleterious(&self) -> bool {
        self.deleterious
    }

    pub fn origin(&self) -> MutationKind {
        self.origin
    }

    /// Trait contribution after the allele's own expression modifier.
    pub fn effective_value(&self) -> f32 {
        self.value * self.expression
    }

    /// Returns a mutated copy with a fresh id. The source is untouched.
    pub fn mutate(&self, strength: f32, range: GeneRange, rng: &mut impl Rng) -> Allele {
        let kind = MutationKind::roll(rng);
        self.mutate_as(kind, strength, range, rng)
    }

    /// Applies a specific mutation class.
    pub fn mutate_as(&self, kind: MutationKind, strength: f32, range: GeneRange, rng: &mut impl Rng) -> Allele {
        let strength = strength.max(0.0);
        let mut next = Allele { id: Self::mint_id(), origin: kind, ..self.clone() };
        match kind {
            MutationKind::Founder => {}
            MutationKind::Silent => {
                next.expression = (next.expression + rng.gen_range(-0.01..=0.01)).clamp(0.1, 2.0);
            }
            MutationKind::Missense => {
                if strength > 0.0 {
                    next.value = range.clamp(next.value + rng.gen_range(-strength..=strength) * range.width());
                }
                if rng.gen_bool(0.3) {
                    next.fitness_effect = (next.fitness_effect + rng.gen_range(-0.2..=0.1)).clamp(-1.0, 1.0);
                }
                next.deleterious = next.fitness_effect < -0.1;
            }
            MutationKind::Nonsense => {
                let value_scale = rng.gen_range(0.1..=0.5);
                let expression_scale = rng.gen_range(0.2..=0.6);
                next.value = range.clamp(next.value * value_scale);
                next.expression = (next.expression * expression_scale).clamp(0.1, 2.0);
                next.fitness_effect = rng.gen_range(-0.3..=-0.05);
                next.deleterious = true;
            }
            MutationKind::Regulatory => {
                next.expression = (next.expression * rng.gen_range(0.5..=1.5)).clamp(0.1, 2.0);
            }
            MutationKind::DominanceShift => {
                next.dominance = (next.dominance + rng.gen_range(-0.2..=0.2)).clamp(0.0, 1.0);
            }
        }
        next
    }
}
