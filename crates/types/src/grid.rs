//! Row-major 2D cell grids over square worlds.

/// Linear index of cell `(x, z)` in a grid `width` cells wide.
#[inline]
pub fn grid_index(x: u32, z: u32, width: u32) -> usize {
    (z * width + x) as usize
}

/// Inverse of [`grid_index`].
#[inline]
pub fn grid_coords(index: usize, width: u32) -> (u32, u32) {
    let index = index as u32;
    (index % width, index / width)
}

/// Cell containing world coordinate `(wx, wz)` in a `cells`×`cells` grid
/// spanning `[-world_size/2, world_size/2]`, clamped to the border.
#[inline]
pub fn world_to_cell(wx: f32, wz: f32, world_size: f32, cells: u32) -> (u32, u32) {
    let cell = world_size / cells as f32;
    let half = world_size * 0.5;
    let to = |w: f32| (((w + half) / cell).floor().max(0.0) as u32).min(cells - 1);
    (to(wx), to(wz))
}

/// World-space minimum corner of cell `(x, z)`.
#[inline]
pub fn cell_origin(x: u32, z: u32, world_size: f32, cells: u32) -> (f32, f32) {
    let cell = world_size / cells as f32;
    let half = world_size * 0.5;
    (x as f32 * cell - half, z as f32 * cell - half)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_index_last() {
        assert_eq!(grid_index(31, 31, 32), 32 * 32 - 1);
    }

    #[test]
    fn grid_roundtrip() {
        for &(x, z) in &[(0, 0), (1, 2), (17, 30), (31, 31)] {
            assert_eq!(grid_coords(grid_index(x, z, 32), 32), (x, z));
        }
    }

    #[test]
    fn world_to_cell_clamps() {
        assert_eq!(world_to_cell(-1024.0, -1024.0, 2048.0, 32), (0, 0));
        assert_eq!(world_to_cell(5000.0, -5000.0, 2048.0, 32), (31, 0));
        assert_eq!(world_to_cell(0.0, 0.0, 2048.0, 32), (16, 16));
        assert_eq!(cell_origin(16, 16, 2048.0, 32), (0.0, 0.0));
    }
}
