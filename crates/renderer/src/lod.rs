/// Index of the first threshold `distance` falls below; `None` past the last.
pub fn select_lod(distance: f32, thresholds: &[f32]) -> Option<usize> {
    thresholds.iter().position(|t| distance < *t)
}

/// 1 until `band` before `end`, then linearly down to 0 at `end`.
pub fn fade_out(distance: f32, end: f32, band: f32) -> f32 {
    if band <= 0.0 {
        return 1.0;
    }
    ((end - distance) / band).clamp(0.0, 1.0)
}

/// SplitMix64 finalizer. Stable across runs and platforms.
pub fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// Uniform value in [0, 1) derived from `x`.
pub fn unit_hash(x: u64) -> f32 {
    (mix64(x) >> 40) as f32 / (1u32 << 24) as f32
}
