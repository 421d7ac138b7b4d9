//! Gene types, their valid ranges, epigenetic marks and single-locus expression.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::allele::Allele;

/// Number of neural-weight slots a genome can carry.
pub const NEURAL_SLOTS: u8 = 8;

/// Trait kinds a gene can encode. `NeuralWeight` carries its slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GeneType {
    // Body
    Size,
    Speed,
    VisionRange,
    VisionAngle,
    Efficiency,
    MotionDetection,
    Strength,
    Armor,
    // Coloration
    ColorRed,
    ColorGreen,
    ColorBlue,
    PatternType,
    PatternIntensity,
    // Behavior
    Aggression,
    Sociability,
    Curiosity,
    FearResponse,
    Territoriality,
    ParentalCare,
    // Mate preferences
    SizePreference,
    OrnamentPreference,
    SimilarityPreference,
    Choosiness,
    // Ornaments
    OrnamentIntensity,
    OrnamentSize,
    DisplayFrequency,
    // Metabolism and life history
    MetabolicRate,
    HeatTolerance,
    ColdTolerance,
    MaturationRate,
    Lifespan,
    Fertility,
    // Niche axes
    DietSpecialization,
    HabitatPreference,
    ActivityTime,
    // Creature-type aptitudes
    AquaticAptitude,
    FlightAptitude,
    ClimbingAptitude,
    DiggingAptitude,
    // Wings, fins, schooling
    WingSpan,
    FinSize,
    SchoolingStrength,
    GlideEfficiency,
    // Senses
    SmellRange,
    HearingRange,
    Echolocation,
    Camouflage,
    Memory,
    // Body plan
    HeadShape,
    TailLength,
    LimbLength,
    BodyElongation,
    NeuralWeight(u8),
}

/// Valid phenotype range of a gene type plus the ancestral value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl GeneRange {
    const fn new(min: f32, max: f32, default: f32) -> Self {
        Self { min, max, default }
    }

    pub fn width(&self) -> f32 {
        self.max - self.min
    }

    pub fn clamp(&self, v: f32) -> f32 {
        v.clamp(self.min, self.max)
    }

    /// Maps `v` into [0, 1] over the range.
    pub fn normalize(&self, v: f32) -> f32 {
        ((v - self.min) / self.width()).clamp(0.0, 1.0)
    }
}

const UNIT: GeneRange = GeneRange::new(0.0, 1.0, 0.5);

impl GeneType {
    /// Every non-neural gene type, in canonical layout order.
    pub const BASE: [GeneType; 52] = [
        GeneType::Size,
        GeneType::Speed,
        GeneType::VisionRange,
        GeneType::VisionAngle,
        GeneType::Efficiency,
        GeneType::MotionDetection,
        GeneType::Strength,
        GeneType::Armor,
        GeneType::ColorRed,
        GeneType::ColorGreen,
        GeneType::ColorBlue,
        GeneType::PatternType,
        GeneType::PatternIntensity,
        GeneType::Aggression,
        GeneType::Sociability,
        GeneType::Curiosity,
        GeneType::FearResponse,
        GeneType::Territoriality,
        GeneType::ParentalCare,
        GeneType::SizePreference,
        GeneType::OrnamentPreference,
        GeneType::SimilarityPreference,
        GeneType::Choosiness,
        GeneType::OrnamentIntensity,
        GeneType::OrnamentSize,
        GeneType::DisplayFrequency,
        GeneType::MetabolicRate,
        GeneType::HeatTolerance,
        GeneType::ColdTolerance,
        GeneType::MaturationRate,
        GeneType::Lifespan,
        GeneType::Fertility,
        GeneType::DietSpecialization,
        GeneType::HabitatPreference,
        GeneType::ActivityTime,
        GeneType::AquaticAptitude,
        GeneType::FlightAptitude,
        GeneType::ClimbingAptitude,
        GeneType::DiggingAptitude,
        GeneType::WingSpan,
        GeneType::FinSize,
        GeneType::SchoolingStrength,
        GeneType::GlideEfficiency,
        GeneType::SmellRange,
        GeneType::HearingRange,
        GeneType::Echolocation,
        GeneType::Camouflage,
        GeneType::Memory,
        GeneType::HeadShape,
        GeneType::TailLength,
        GeneType::LimbLength,
        GeneType::BodyElongation,
    ];

    /// Total number of distinct gene types including neural slots.
    pub const COUNT: usize = Self::BASE.len() + NEURAL_SLOTS as usize;

    /// Base types followed by every neural slot.
    pub fn all() -> impl Iterator<Item = GeneType> {
        Self::BASE.into_iter().chain((0..NEURAL_SLOTS).map(GeneType::NeuralWeight))
    }

    /// Dense index in `0..COUNT`.
    pub fn index(self) -> usize {
        match self {
            GeneType::NeuralWeight(slot) => Self::BASE.len() + (slot % NEURAL_SLOTS) as usize,
            other => Self::BASE.iter().position(|t| *t == other).unwrap_or(0),
        }
    }

    /// Genes hit by poor nutrition.
    pub fn is_nutritional(self) -> bool {
        matches!(self, GeneType::Size | GeneType::MetabolicRate | GeneType::MaturationRate)
    }

    pub fn range(self) -> GeneRange {
        use GeneType::*;
        match self {
            Size => GeneRange::new(0.3, 3.0, 1.0),
            Speed => GeneRange::new(0.2, 3.0, 1.0),
            VisionRange => GeneRange::new(5.0, 60.0, 20.0),
            VisionAngle => GeneRange::new(0.5, std::f32::consts::TAU, 2.0),
            Efficiency | MetabolicRate | MaturationRate => GeneRange::new(0.3, 2.0, 1.0),
            Strength => GeneRange::new(0.2, 3.0, 1.0),
            Lifespan => GeneRange::new(0.5, 2.0, 1.0),
            Fertility => GeneRange::new(0.1, 1.0, 0.5),
            Armor | Territoriality | Aggression | OrnamentIntensity | OrnamentSize | DisplayFrequency
            | Choosiness | SchoolingStrength | Camouflage => GeneRange::new(0.0, 1.0, 0.3),
            AquaticAptitude | ClimbingAptitude | DiggingAptitude | WingSpan | FinSize | GlideEfficiency => {
                GeneRange::new(0.0, 1.0, 0.2)
            }
            FlightAptitude => GeneRange::new(0.0, 1.0, 0.1),
            Echolocation => GeneRange::new(0.0, 1.0, 0.05),
            SizePreference | OrnamentPreference => GeneRange::new(-1.0, 1.0, 0.0),
            SimilarityPreference => GeneRange::new(-1.0, 1.0, 0.3),
            NeuralWeight(_) => GeneRange::new(-2.0, 2.0, 0.0),
            MotionDetection | ColorRed | ColorGreen | ColorBlue | PatternType | PatternIntensity | Sociability
            | Curiosity | FearResponse | ParentalCare | HeatTolerance | ColdTolerance | DietSpecialization
            | HabitatPreference | ActivityTime | SmellRange | HearingRange | Memory | HeadShape | TailLength
            | LimbLength | BodyElongation => UNIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkKind {
    Methylation,
    Acetylation,
    Phosphorylation,
    Imprinting,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpigeneticMark {
    pub kind: MarkKind,
    pub intensity: f32,
    pub generations_remaining: u32,
    pub heritable: bool,
}

impl EpigeneticMark {
    pub fn new(kind: MarkKind, intensity: f32, generations_remaining: u32, heritable: bool) -> Self {
        Self { kind, intensity: intensity.clamp(0.0, 1.0), generations_remaining, heritable }
    }

    /// Multiplier applied to expression while the mark is active.
    pub fn modifier(&self) -> f32 {
        match self.kind {
            MarkKind::Methylation => 1.0 - 0.5 * self.intensity,
            MarkKind::Imprinting => 1.0 - 0.3 * self.intensity,
            MarkKind::Acetylation => 1.0 + 0.3 * self.intensity,
            MarkKind::Phosphorylation => 1.0 + 0.2 * self.intensity,
        }
    }

    pub fn is_active(&self) -> bool {
        self.generations_remaining > 0 && self.intensity > 0.0
    }

    /// The copy passed to offspring: weaker and one generation closer to expiry.
    pub fn inherited(&self) -> Option<Self> {
        let remaining = self.generations_remaining.saturating_sub(1);
        (self.heritable && remaining > 0).then(|| Self {
            intensity: self.intensity * 0.7,
            generations_remaining: remaining,
            ..*self
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gene {
    pub locus: u32,
    pub gene_type: GeneType,
    pub maternal: Allele,
    pub paternal: Allele,
    pub base_expression: f32,
    pub marks: Vec<EpigeneticMark>,
}

impl Gene {
    pub fn new(locus: u32, gene_type: GeneType, maternal: Allele, paternal: Allele) -> Self {
        Self { locus, gene_type, maternal, paternal, base_expression: 1.0, marks: Vec::new() }
    }

    pub fn range(&self) -> GeneRange {
        self.gene_type.range()
    }

    /// Product of every active mark's modifier.
    pub fn epigenetic_modifier(&self) -> f32 {
        self.marks.iter().filter(|m| m.is_active()).map(EpigeneticMark::modifier).product()
    }

    /// Dominance-weighted allele mix scaled by expression and marks, clamped to range.
    pub fn phenotype(&self) -> f32 {
        let (a, b) = (&self.maternal, &self.paternal);
        let h = (a.dominance() + b.dominance()) * 0.5;
        let (dominant, recessive) = if a.dominance() >= b.dominance() { (a, b) } else { (b, a) };
        let mixed = dominant.value() * (1.0 - h) + recessive.value() * h;
        let expression = (a.expression() + b.expression()) * 0.5;
        self.range().clamp(mixed * expression * self.base_expression * self.epigenetic_modifier())
    }

    /// Normalized |maternal - paternal| in [0, 1].
    pub fn heterozygosity(&self) -> f32 {
        let r = self.range();
        ((self.maternal.value() - self.paternal.value()).abs() / r.width()).min(1.0)
    }

    pub fn is_homozygous(&self) -> bool {
        self.heterozygosity() < 0.05
    }

    /// Sum of the alleles' fitness costs.
    pub fn load(&self) -> f32 {
        (-self.maternal.fitness_effect()).max(0.0) + (-self.paternal.fitness_effect()).max(0.0)
    }

    /// Sorted normalized effective allele values, for order-free comparisons.
    pub fn allele_signature(&self) -> (f32, f32) {
        let r = self.range();
        let a = r.normalize(self.maternal.effective_value());
        let b = r.normalize(self.paternal.effective_value());
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Mutates one of the two alleles, chosen uniformly.
    pub fn mutate_allele(&mut self, strength: f32, rng: &mut impl Rng) {
        let range = self.range();
        let slot = if rng.gen_bool(0.5) { &mut self.maternal } else { &mut self.paternal };
        *slot = slot.mutate(strength, range, rng);
    }

    pub fn add_mark(&mut self, mark: EpigeneticMark) {
        self.marks.push(mark);
    }

    /// One update cycle: intensities decay and counters tick; expired marks drop.
    pub fn decay_marks(&mut self, factor: f32) {
        for m in &mut self.marks {
            m.intensity *= factor;
            m.generations_remaining = m.generations_remaining.saturating_sub(1);
        }
        self.marks.retain(EpigeneticMark::is_active);
    }

    /// Copy with marks filtered through inheritance.
    pub fn inherit_marks(&mut self, rng: &mut impl Rng) {
        let marks = std::mem::take(&mut self.marks);
        self.marks = marks.iter().filter(|_| rng.gen_bool(0.3)).filter_map(EpigeneticMark::inherited).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allele::Allele;

    fn gene(gt: GeneType, a: f32, b: f32) -> Gene {
        Gene::new(0, gt, Allele::new(a, 0.5), Allele::new(b, 0.5))
    }

    #[test]
    fn indices_are_dense_and_unique() {
        let mut seen = vec![false; GeneType::COUNT];
        for gt in GeneType::all() {
            assert!(!seen[gt.index()], "{gt:?} collides");
            seen[gt.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
        assert_eq!(GeneType::COUNT, 60);
    }

    #[test]
    fn defaults_lie_inside_ranges() {
        for gt in GeneType::all() {
            let r = gt.range();
            assert!(r.min < r.max, "{gt:?}");
            assert!(r.default >= r.min && r.default <= r.max, "{gt:?}");
        }
    }

    #[test]
    fn phenotype_is_clamped() {
        let g = gene(GeneType::ColorRed, 5.0, 5.0);
        assert_eq!(g.phenotype(), 1.0);
        let g = gene(GeneType::Size, -3.0, -3.0);
        assert_eq!(g.phenotype(), 0.3);
    }

    #[test]
    fn equal_dominance_mixes_evenly() {
        let g = gene(GeneType::ColorRed, 0.2, 0.6);
        assert!((g.phenotype() - 0.4).abs() < 1e-5);
    }

    #[test]
    fn methylation_lowers_expression() {
        let mut g = gene(GeneType::ColorRed, 0.8, 0.8);
        let before = g.phenotype();
        g.add_mark(EpigeneticMark::new(MarkKind::Methylation, 1.0, 3, true));
        assert!((g.phenotype() - before * 0.5).abs() < 1e-5);
        g.marks.clear();
        g.add_mark(EpigeneticMark::new(MarkKind::Acetylation, 1.0, 3, false));
        assert!(g.phenotype() > before);
    }

    #[test]
    fn marks_decay_and_expire() {
        let mut g = gene(GeneType::Size, 1.0, 1.0);
        g.add_mark(EpigeneticMark::new(MarkKind::Imprinting, 1.0, 2, true));
        g.decay_marks(0.8);
        assert_eq!(g.marks.len(), 1);
        assert!((g.marks[0].intensity - 0.8).abs() < 1e-6);
        g.decay_marks(0.8);
        assert!(g.marks.is_empty());
    }

    #[test]
    fn inherited_mark_is_weaker() {
        let m = EpigeneticMark::new(MarkKind::Methylation, 1.0, 3, true);
        let child = m.inherited().unwrap();
        assert!((child.intensity - 0.7).abs() < 1e-6);
        assert_eq!(child.generations_remaining, 2);
        assert!(EpigeneticMark::new(MarkKind::Methylation, 1.0, 3, false).inherited().is_none());
        assert!(EpigeneticMark::new(MarkKind::Methylation, 1.0, 1, true).inherited().is_none());
    }

    #[test]
    fn homozygous_below_threshold() {
        assert!(gene(GeneType::ColorRed, 0.5, 0.52).is_homozygous());
        assert!(!gene(GeneType::ColorRed, 0.2, 0.8).is_homozygous());
    }
}
