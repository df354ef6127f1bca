//! Connects tile-space `(x, y, z)` coordinates to pattern-space coordinates
//! plus an in-window offset, as described in the data model's
//! `TileModelMapping`.
//!
//! For `Adjacent` models tile-space and pattern-space coincide (a single
//! offset, `0`). For `Overlapping` models, non-periodic axes shrink the
//! pattern grid by `window_axis - 1` relative to the tile grid (there's no
//! anchored window for the trailing cells along that axis); those trailing
//! tile coordinates map to the last pattern cell on that axis at a nonzero
//! offset instead.

use crate::topology::Periodicity;

#[derive(Debug, Clone, Copy)]
pub struct TileModelMapping {
    tile_dims: (u32, u32, u32),
    pattern_dims: (u32, u32, u32),
    window: (u32, u32, u32),
}

impl TileModelMapping {
    pub fn identity(tile_dims: (u32, u32, u32)) -> Self {
        Self { tile_dims, pattern_dims: tile_dims, window: (1, 1, 1) }
    }

    pub fn overlapping(tile_dims: (u32, u32, u32), window: (u32, u32, u32), periodicity: Periodicity) -> Self {
        let pattern_dims = (
            pattern_extent(tile_dims.0, window.0, periodicity.x),
            pattern_extent(tile_dims.1, window.1, periodicity.y),
            pattern_extent(tile_dims.2, window.2, periodicity.z),
        );
        Self { tile_dims, pattern_dims, window }
    }

    pub fn pattern_dims(&self) -> (u32, u32, u32) {
        self.pattern_dims
    }

    pub fn tile_dims(&self) -> (u32, u32, u32) {
        self.tile_dims
    }

    pub fn window(&self) -> (u32, u32, u32) {
        self.window
    }

    /// Map a tile-space coordinate to its `(pattern-space coordinate, offset)`.
    pub fn to_pattern_coord(&self, tile_coord: (u32, u32, u32)) -> ((u32, u32, u32), (u32, u32, u32)) {
        let (px, ox) = axis_map(tile_coord.0, self.pattern_dims.0);
        let (py, oy) = axis_map(tile_coord.1, self.pattern_dims.1);
        let (pz, oz) = axis_map(tile_coord.2, self.pattern_dims.2);
        ((px, py, pz), (ox, oy, oz))
    }

    /// Linearize an offset triple into the index `patterns_to_tiles_by_offset`
    /// is keyed by.
    pub fn offset_index(&self, offset: (u32, u32, u32)) -> usize {
        (offset.2 as usize * self.window.1 as usize + offset.1 as usize) * self.window.0 as usize + offset.0 as usize
    }
}

fn pattern_extent(tile_extent: u32, window_extent: u32, periodic: bool) -> u32 {
    if periodic {
        tile_extent
    } else {
        tile_extent - window_extent + 1
    }
}

fn axis_map(coord: u32, pattern_extent: u32) -> (u32, u32) {
    if coord < pattern_extent {
        (coord, 0)
    } else {
        (pattern_extent - 1, coord - (pattern_extent - 1))
    }
}
