//! Deterministic Latin-style binomials.

use crate::species::NicheCentroid;

const DIET_ROOTS: [&str; 3] = ["Phyto", "Pan", "Sarco"];
const HABITAT_ROOTS: [&str; 3] = ["litho", "sylv", "hydro"];
const GENUS_ENDINGS: [&str; 6] = ["saurus", "therium", "morpha", "gnathus", "pteryx", "cephalus"];
const EPITHETS_DAY: [&str; 4] = ["diurnus", "solaris", "lucidus", "aurorae"];
const EPITHETS_NIGHT: [&str; 4] = ["nocturnus", "umbrae", "lunaris", "obscurus"];
const EPITHETS_DUSK: [&str; 4] = ["crepuscularis", "vespertinus", "ambiguus", "mutabilis"];

fn bucket(v: f32) -> usize {
    if v < 0.35 {
        0
    } else if v > 0.65 {
        2
    } else {
        1
    }
}

fn mix(id: u64) -> u64 {
    let mut x = id.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    x ^= x >> 29;
    x.wrapping_mul(0xBF58_476D_1CE4_E5B9)
}

/// Genus from diet and habitat, epithet from activity time; the id breaks ties.
pub fn binomial(id: u64, niche: &NicheCentroid) -> String {
    let h = mix(id);
    let genus = format!(
        "{}{}{}",
        DIET_ROOTS[bucket(niche.diet)],
        HABITAT_ROOTS[bucket(niche.habitat)],
        GENUS_ENDINGS[(h % GENUS_ENDINGS.len() as u64) as usize]
    );
    let epithets = match bucket(niche.activity) {
        0 => &EPITHETS_NIGHT,
        2 => &EPITHETS_DAY,
        _ => &EPITHETS_DUSK,
    };
    let epithet = epithets[((h >> 16) % epithets.len() as u64) as usize];
    format!("{genus} {epithet}")
}
