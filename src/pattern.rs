//! Pattern ids, per-pattern weights, and the compiled propagator table that
//! pattern compilation (the `Adjacent` and `Overlapping` paths, the latter
//! in `overlapping.rs`) produces.
//!
//! `PatternTable` is ported directly from `wfc/src/wfc.rs`'s table type,
//! generalized from a fixed 4-entry `CardinalDirectionTable` per pattern to
//! a `Vec` sized by the topology's direction count.

use crate::error::Error;
use crate::rotation::Rotation;
use crate::tile::Tile;
use crate::topology::DirectionSet;
use hashbrown::HashMap;
use std::num::NonZeroU32;
use std::ops::{Index, IndexMut};
use std::slice;

pub type PatternId = u32;

#[derive(Default, Clone, Debug)]
pub struct PatternTable<T> {
    table: Vec<T>,
}

impl<T> PatternTable<T> {
    pub fn from_vec(table: Vec<T>) -> Self {
        Self { table }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<T> {
        self.table.iter()
    }

    pub fn iter_mut(&mut self) -> slice::IterMut<T> {
        self.table.iter_mut()
    }

    pub fn enumerate(&self) -> impl Iterator<Item = (PatternId, &T)> {
        self.iter().enumerate().map(|(i, item)| (i as PatternId, item))
    }
}

impl<T> Index<PatternId> for PatternTable<T> {
    type Output = T;
    fn index(&self, index: PatternId) -> &Self::Output {
        &self.table[index as usize]
    }
}

impl<T> IndexMut<PatternId> for PatternTable<T> {
    fn index_mut(&mut self, index: PatternId) -> &mut Self::Output {
        &mut self.table[index as usize]
    }
}

impl<T> std::iter::FromIterator<T> for PatternTable<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self { table: Vec::from_iter(iter) }
    }
}

/// A pattern's frequency weight, and `w * log2(w)` cached alongside it
/// since both the global stats and every wave cell's incremental entropy
/// bookkeeping need it repeatedly.
#[derive(Debug, Clone, Copy)]
pub struct PatternWeight {
    weight: NonZeroU32,
    weight_log_weight: f32,
}

impl PatternWeight {
    pub fn new(weight: NonZeroU32) -> Self {
        let w = weight.get() as f32;
        Self { weight, weight_log_weight: w * w.log2() }
    }

    pub fn weight(&self) -> u32 {
        self.weight.get()
    }

    pub fn weight_log_weight(&self) -> f32 {
        self.weight_log_weight
    }
}

/// `prop[p][dir] = sorted list of patterns q compatible as p's neighbor in
/// direction dir`, plus per-pattern weights and the tile↔pattern-by-offset
/// maps that the tile-space lifting layer (`mapping.rs`, `tile_propagator.rs`)
/// needs to translate tiles to patterns and back.
pub struct CompiledModel<T: Tile> {
    pub num_directions: usize,
    pub num_offsets: usize,
    pub weights: PatternTable<PatternWeight>,
    pub propagator: PatternTable<Vec<Vec<PatternId>>>,
    pub tiles_to_patterns_by_offset: Vec<HashMap<T, Vec<PatternId>>>,
    pub patterns_to_tiles_by_offset: Vec<PatternTable<T>>,
}

impl<T: Tile> CompiledModel<T> {
    pub fn num_patterns(&self) -> usize {
        self.weights.len()
    }

    pub fn compatible_in_direction(&self, pattern: PatternId, dir: usize) -> &[PatternId] {
        &self.propagator[pattern][dir]
    }
}

/// Expand a declared adjacency set through the rotation group: for every
/// rotation `r`, a declared pair `(a, b)` in direction `dir` also yields
/// `(rotate(a, r), rotate(b, r))` in whichever direction `dir` rotates into.
/// Pairs are dropped (not an error) when `apply_rotation` reports a missing
/// transform, or when `dir` doesn't rotate into another direction of the
/// same set (e.g. a diagonal rotation applied to a hex direction set).
pub fn expand_adjacency<T: Tile>(
    adjacency: &[Vec<(T, T)>],
    direction_set: DirectionSet,
    rotations: impl Iterator<Item = Rotation> + Clone,
    apply_rotation: impl Fn(&T, Rotation) -> Result<T, Error>,
) -> Vec<Vec<(T, T)>> {
    let mut expanded: Vec<Vec<(T, T)>> = adjacency.to_vec();
    for rotation in rotations {
        for (dir, pairs) in adjacency.iter().enumerate() {
            let Some(rotated_dir) = direction_set.rotate(dir, rotation) else {
                continue;
            };
            for (a, b) in pairs {
                let (Ok(ra), Ok(rb)) = (apply_rotation(a, rotation), apply_rotation(b, rotation)) else {
                    continue;
                };
                if !expanded[rotated_dir].iter().any(|(x, y)| *x == ra && *y == rb) {
                    expanded[rotated_dir].push((ra, rb));
                }
            }
        }
    }
    expanded
}

/// Compile an `Adjacent` model: one pattern per tile, `prop[p][dir]`
/// populated directly from the declared adjacency pairs (already expanded
/// through the rotation group by the caller). There is a single offset (the
/// tile itself).
pub fn compile_adjacent<T: Tile>(
    tiles: &[T],
    frequency: &HashMap<T, u32>,
    adjacency: &[Vec<(T, T)>],
) -> Result<CompiledModel<T>, Error> {
    let num_directions = adjacency.len();
    if tiles.is_empty() {
        return Err(Error::EmptyPatternSet);
    }
    let index_of: HashMap<T, PatternId> =
        tiles.iter().cloned().enumerate().map(|(i, t)| (t, i as PatternId)).collect();

    let mut propagator: Vec<Vec<Vec<PatternId>>> = vec![vec![Vec::new(); num_directions]; tiles.len()];
    for (dir, pairs) in adjacency.iter().enumerate() {
        for (a, b) in pairs {
            let (Some(&pa), Some(&pb)) = (index_of.get(a), index_of.get(b)) else {
                return Err(Error::UnknownTile { context: "adjacency declaration" });
            };
            let neighbours = &mut propagator[pa as usize][dir];
            if !neighbours.contains(&pb) {
                neighbours.push(pb);
            }
        }
    }
    for per_pattern in propagator.iter_mut() {
        for neighbours in per_pattern.iter_mut() {
            neighbours.sort_unstable();
        }
    }

    let weights = tiles
        .iter()
        .map(|t| {
            let w = frequency.get(t).copied().unwrap_or(1).max(1);
            PatternWeight::new(NonZeroU32::new(w).expect("max(1) is non-zero"))
        })
        .collect::<PatternTable<_>>();

    let mut tile_map: HashMap<T, Vec<PatternId>> = HashMap::new();
    for (id, tile) in tiles.iter().cloned().enumerate() {
        tile_map.entry(tile).or_default().push(id as PatternId);
    }

    Ok(CompiledModel {
        num_directions,
        num_offsets: 1,
        weights,
        propagator: PatternTable::from_vec(propagator),
        tiles_to_patterns_by_offset: vec![tile_map],
        patterns_to_tiles_by_offset: vec![PatternTable::from_vec(tiles.to_vec())],
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn trivial_two_tile_all_adjacencies() {
        let tiles = vec!["A", "B"];
        let freq: HashMap<&str, u32> = [("A", 1), ("B", 1)].into_iter().collect();
        let adjacency: Vec<Vec<(&str, &str)>> = vec![
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
        ];
        let compiled = compile_adjacent(&tiles, &freq, &adjacency).unwrap();
        assert_eq!(compiled.num_patterns(), 2);
        assert_eq!(compiled.compatible_in_direction(0, 0).len(), 2);
    }

    #[test]
    fn forced_stripe_adjacency_is_directional() {
        let tiles = vec!["A", "B"];
        let freq: HashMap<&str, u32> = [("A", 1), ("B", 1)].into_iter().collect();
        // direction 0 = east, direction 1 = west (matching Cartesian2D order)
        let adjacency: Vec<Vec<(&str, &str)>> = vec![vec![], vec![], vec![("A", "B"), ("B", "A")], vec![("B", "A"), ("A", "B")]];
        let compiled = compile_adjacent(&tiles, &freq, &adjacency).unwrap();
        assert_eq!(compiled.compatible_in_direction(0, 2), &[1]);
        assert_eq!(compiled.compatible_in_direction(1, 2), &[0]);
    }

    #[test]
    fn empty_tile_list_is_rejected() {
        let tiles: Vec<&str> = vec![];
        let freq = HashMap::new();
        let adjacency: Vec<Vec<(&str, &str)>> = vec![vec![]; 4];
        assert!(matches!(compile_adjacent(&tiles, &freq, &adjacency), Err(Error::EmptyPatternSet)));
    }
}
