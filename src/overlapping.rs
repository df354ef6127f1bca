//! Pattern compilation for `TileModel::Overlapping`: window extraction from
//! sample grids, rotation/reflection expansion, and window-shift derived
//! adjacency.
//!
//! Generalizes `wfc/src/overlapping.rs`'s window extraction (which always
//! extracted windows at a single fixed `Orientation::Clockwise90`, a minimal
//! placeholder compared to what the richer `wfc-image` crate did) into full
//! rotation-group expansion driven by a caller-supplied `RotationGroup` and
//! per-tile rotation function, and generalizes `are_patterns_compatible`
//! from a fixed `CardinalDirection` to an arbitrary `DirectionSet` offset.

use crate::error::Error;
use crate::pattern::{CompiledModel, PatternId, PatternTable, PatternWeight};
use crate::rotation::Rotation;
use crate::tile::Tile;
use crate::tile_model::SampleGrid;
use crate::topology::DirectionSet;
use hashbrown::HashMap;
use std::num::NonZeroU32;

/// A single N×M×L window's tile contents, addressable by position within
/// the window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Window<T: Tile> {
    dims: (u32, u32, u32),
    cells: Vec<T>,
}

impl<T: Tile> Window<T> {
    fn get(&self, x: u32, y: u32, z: u32) -> &T {
        let (n, m, _l) = self.dims;
        &self.cells[(z as usize * m as usize + y as usize) * n as usize + x as usize]
    }

    fn offset_index(&self, x: u32, y: u32, z: u32) -> usize {
        let (n, m, _l) = self.dims;
        (z as usize * m as usize + y as usize) * n as usize + x as usize
    }
}

/// Rotate bounded window coordinates (distinct from `topology::rotate_offset_2d`,
/// which rotates unbounded direction vectors around the origin).
fn transform_coord(rotation: Rotation, size: (u32, u32), coord: (i32, i32)) -> (i32, i32) {
    let (w, _h) = (size.0 as i32, size.1 as i32);
    let (mut x, mut y) = coord;
    if rotation.is_reflected() {
        std::mem::swap(&mut x, &mut y);
    }
    for _ in 0..rotation.turns() {
        let (nx, ny) = (y, w - 1 - x);
        x = nx;
        y = ny;
    }
    (x, y)
}

/// Apply `rotation` to a window. Only defined for square (`n == m`), flat
/// (`l == 1`) windows: rotating a non-square window would change its
/// bounding box, which the fixed-size pattern representation can't express.
/// Non-square or 3D windows therefore only ever contribute their identity
/// orientation (a decision recorded in DESIGN.md).
fn rotate_window<T: Tile>(
    window: &Window<T>,
    rotation: Rotation,
    apply_rotation: &impl Fn(&T, Rotation) -> Result<T, Error>,
) -> Option<Window<T>> {
    let (n, m, l) = window.dims;
    if rotation == Rotation::IDENTITY {
        return Some(window.clone());
    }
    if n != m || l != 1 {
        return None;
    }
    let mut cells = window.cells.clone();
    for z in 0..l {
        for y in 0..m {
            for x in 0..n {
                let (ox, oy) = transform_coord(rotation, (n, m), (x as i32, y as i32));
                let rotated_tile = apply_rotation(window.get(x, y, z), rotation).ok()?;
                let idx = window.offset_index(ox as u32, oy as u32, z);
                cells[idx] = rotated_tile;
            }
        }
    }
    Some(Window { dims: window.dims, cells })
}

fn extract_windows<T: Tile>(sample: &SampleGrid<T>, window: (u32, u32, u32), periodic: (bool, bool, bool)) -> Vec<Window<T>> {
    let (n, m, l) = window;
    let anchors_x = if periodic.0 { sample.width() } else { sample.width() - n + 1 };
    let anchors_y = if periodic.1 { sample.height() } else { sample.height() - m + 1 };
    let anchors_z = if periodic.2 { sample.depth() } else { sample.depth() - l + 1 };

    let mut windows = Vec::new();
    for az in 0..anchors_z {
        for ay in 0..anchors_y {
            for ax in 0..anchors_x {
                let mut cells = Vec::with_capacity((n * m * l) as usize);
                for dz in 0..l {
                    for dy in 0..m {
                        for dx in 0..n {
                            let sx = (ax + dx) % sample.width();
                            let sy = (ay + dy) % sample.height();
                            let sz = (az + dz) % sample.depth();
                            cells.push(sample.get(sx, sy, sz).clone());
                        }
                    }
                }
                windows.push(Window { dims: window, cells });
            }
        }
    }
    windows
}

/// Does `q`'s window agree with `p`'s window on every cell they share once
/// `q` is shifted by `offset` (a unit direction vector) relative to `p`?
fn windows_compatible<T: Tile>(p: &Window<T>, q: &Window<T>, offset: (i32, i32, i32)) -> bool {
    let (n, m, l) = p.dims;
    for z in 0..l as i32 {
        for y in 0..m as i32 {
            for x in 0..n as i32 {
                let (px, py, pz) = (x + offset.0, y + offset.1, z + offset.2);
                if px < 0 || py < 0 || pz < 0 || px >= n as i32 || py >= m as i32 || pz >= l as i32 {
                    continue;
                }
                if p.get(px as u32, py as u32, pz as u32) != q.get(x as u32, y as u32, z as u32) {
                    return false;
                }
            }
        }
    }
    true
}

fn offset_coords(offset: usize, dims: (u32, u32, u32)) -> (u32, u32, u32) {
    let (n, m, _l) = dims;
    let x = offset % n as usize;
    let y = (offset / n as usize) % m as usize;
    let z = offset / (n as usize * m as usize);
    (x as u32, y as u32, z as u32)
}

/// Compile an `Overlapping` model into a `CompiledModel`: extract every
/// window (plus its rotation/reflection expansions), dedupe into patterns
/// weighted by occurrence count, and derive `prop[p][dir]` by window-shift
/// compatibility.
pub fn compile<T: Tile>(
    window: (u32, u32, u32),
    periodic: (bool, bool, bool),
    samples: &[SampleGrid<T>],
    direction_set: DirectionSet,
    rotations: impl Iterator<Item = Rotation> + Clone,
    apply_rotation: impl Fn(&T, Rotation) -> Result<T, Error>,
) -> Result<CompiledModel<T>, Error> {
    let mut counts: HashMap<Window<T>, u32> = HashMap::new();
    for sample in samples {
        for raw in extract_windows(sample, window, periodic) {
            for rotation in rotations.clone() {
                if let Some(rotated) = rotate_window(&raw, rotation, &apply_rotation) {
                    *counts.entry(rotated).or_insert(0) += 1;
                }
            }
        }
    }
    if counts.is_empty() {
        return Err(Error::EmptyPatternSet);
    }

    let patterns: Vec<(Window<T>, u32)> = counts.into_iter().collect();
    let weights = patterns
        .iter()
        .map(|(_, count)| PatternWeight::new(NonZeroU32::new(*count).expect("count is always >= 1")))
        .collect::<PatternTable<_>>();

    let num_offsets = (window.0 * window.1 * window.2) as usize;
    let mut tiles_by_offset: Vec<Vec<T>> = vec![Vec::with_capacity(patterns.len()); num_offsets];
    for (w, _) in &patterns {
        for (offset, bucket) in tiles_by_offset.iter_mut().enumerate() {
            let (ox, oy, oz) = offset_coords(offset, window);
            bucket.push(w.get(ox, oy, oz).clone());
        }
    }
    let patterns_to_tiles_by_offset: Vec<PatternTable<T>> =
        tiles_by_offset.into_iter().map(PatternTable::from_vec).collect();

    let mut tiles_to_patterns_by_offset: Vec<HashMap<T, Vec<PatternId>>> = vec![HashMap::new(); num_offsets];
    for (offset, table) in patterns_to_tiles_by_offset.iter().enumerate() {
        for (pattern_id, tile) in table.enumerate() {
            tiles_to_patterns_by_offset[offset].entry(tile.clone()).or_default().push(pattern_id);
        }
    }

    let num_directions = direction_set.len();
    let mut propagator: Vec<Vec<Vec<PatternId>>> = vec![vec![Vec::new(); num_directions]; patterns.len()];
    for (pid_a, (window_a, _)) in patterns.iter().enumerate() {
        for dir in 0..num_directions {
            let info = direction_set.directions()[dir];
            for (pid_b, (window_b, _)) in patterns.iter().enumerate() {
                if windows_compatible(window_a, window_b, info.offset) {
                    propagator[pid_a][dir].push(pid_b as PatternId);
                }
            }
        }
    }

    Ok(CompiledModel {
        num_directions,
        num_offsets,
        weights,
        propagator: PatternTable::from_vec(propagator),
        tiles_to_patterns_by_offset,
        patterns_to_tiles_by_offset,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rotation::RotationGroup;

    fn grid(tiles: Vec<&'static str>, w: u32, h: u32) -> SampleGrid<&'static str> {
        SampleGrid::new(w, h, 1, tiles)
    }

    #[test]
    fn checkerboard_2x2_periodic_compiles() {
        let sample = grid(vec!["A", "B", "B", "A"], 2, 2);
        let group = RotationGroup::new(1, false).unwrap();
        let compiled = compile(
            (2, 2, 1),
            (true, true, true),
            &[sample],
            DirectionSet::Cartesian2D,
            group.iter(),
            |t: &&'static str, _r| Ok(*t),
        )
        .unwrap();
        assert!(compiled.num_patterns() >= 2);
        assert_eq!(compiled.num_offsets, 4);
    }

    #[test]
    fn empty_samples_rejected() {
        let result = compile::<&'static str>(
            (2, 2, 1),
            (true, true, true),
            &[],
            DirectionSet::Cartesian2D,
            RotationGroup::new(1, false).unwrap().iter(),
            |t, _r| Ok(*t),
        );
        assert!(matches!(result, Err(Error::EmptyPatternSet)));
    }

    #[test]
    fn non_square_window_skips_nonidentity_rotation() {
        let window = Window { dims: (2, 1, 1), cells: vec!["A", "B"] };
        let rotated = rotate_window(&window, Rotation::new(1, false), &|t: &&'static str, _r| Ok(*t));
        assert!(rotated.is_none());
    }
}
