//! Per-frame counters reported by each renderer.

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    pub visible: usize,
    pub culled: usize,
    /// Visible objects per LOD level.
    pub per_lod: Vec<usize>,
    pub draw_calls: usize,
    /// Records that did not fit the instance buffer.
    pub dropped: usize,
}

impl RenderStats {
    pub fn with_levels(levels: usize) -> Self {
        Self { per_lod: vec![0; levels], ..Self::default() }
    }

    pub fn reset(&mut self) {
        let levels = self.per_lod.len();
        *self = Self::with_levels(levels);
    }

    pub fn count_visible(&mut self, lod: usize) {
        self.visible += 1;
        if let Some(n) = self.per_lod.get_mut(lod) {
            *n += 1;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub creatures: RenderStats,
    pub shadow_draw_calls: usize,
    pub trees: RenderStats,
    pub grass: RenderStats,
    pub terrain: RenderStats,
    pub water_draw_calls: usize,
}

impl FrameStats {
    pub fn draw_calls(&self) -> usize {
        self.creatures.draw_calls
            + self.shadow_draw_calls
            + self.trees.draw_calls
            + self.grass.draw_calls
            + self.terrain.draw_calls
            + self.water_draw_calls
    }
}
