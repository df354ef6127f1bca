//! The per-cell bitset of still-possible patterns, its incremental entropy
//! bookkeeping, and the compatibility counters propagation consumes.
//!
//! Ported from `wfc/src/wfc.rs` (`WaveCell`, `WaveCellStats`,
//! `NumWaysToBecomePattern`), generalized from a fixed 4-direction
//! `CardinalDirectionTable` to a `Vec` sized by the topology's direction
//! count, and extended with explicit handling of masked-out topology cells
//! (`None` entries that never participate in selection, propagation, or the
//! contradiction check).

use crate::pattern::{CompiledModel, PatternId, PatternTable, PatternWeight};
use crate::tile::Tile;
use rand::Rng;

#[derive(Default, Debug, Clone)]
struct WaveCellStats {
    num_weighted_compatible_patterns: u32,
    sum_compatible_pattern_weight: u32,
    sum_compatible_pattern_weight_log_weight: f32,
}

impl WaveCellStats {
    fn add(&mut self, weight: &PatternWeight) {
        self.num_weighted_compatible_patterns += 1;
        self.sum_compatible_pattern_weight += weight.weight();
        self.sum_compatible_pattern_weight_log_weight += weight.weight_log_weight();
    }

    fn remove(&mut self, weight: &PatternWeight) {
        debug_assert!(self.num_weighted_compatible_patterns >= 1);
        self.num_weighted_compatible_patterns -= 1;
        self.sum_compatible_pattern_weight -= weight.weight();
        self.sum_compatible_pattern_weight_log_weight -= weight.weight_log_weight();
    }

    fn entropy(&self) -> f32 {
        debug_assert!(self.sum_compatible_pattern_weight > 0);
        let sum = self.sum_compatible_pattern_weight as f32;
        sum.log2() - (self.sum_compatible_pattern_weight_log_weight / sum)
    }
}

/// Per-direction count of still-possible neighbor patterns compatible with
/// this cell becoming a given pattern. Doubles as the possibility bit: the
/// pattern is still possible here iff every entry is non-zero (and once any
/// entry hits zero all entries are cleared, so checking one suffices).
#[derive(Default, Debug, Clone)]
struct NumWaysToBecomePattern {
    per_direction: Vec<u32>,
}

impl NumWaysToBecomePattern {
    fn new(per_direction: Vec<u32>) -> Self {
        if per_direction.iter().any(|&c| c == 0) {
            Self { per_direction: vec![0; per_direction.len()] }
        } else {
            Self { per_direction }
        }
    }

    fn is_zero(&self) -> bool {
        self.per_direction.first().map_or(true, |&c| c == 0)
    }

    /// Returns `true` if this decrement newly zeroed the pattern out (i.e.
    /// the pattern just became banned at this cell).
    fn try_decrement(&mut self, dir: usize) -> bool {
        let count = &mut self.per_direction[dir];
        if *count == 0 {
            return false;
        }
        if *count != 1 {
            *count -= 1;
            return false;
        }
        self.per_direction.iter_mut().for_each(|c| *c = 0);
        true
    }
}

#[derive(Debug, Clone)]
pub struct WaveCell {
    noise: u32,
    num_compatible_patterns: u32,
    stats: WaveCellStats,
    num_ways_to_become_each_pattern: PatternTable<NumWaysToBecomePattern>,
}

impl WaveCell {
    pub fn possible(&self, pattern: PatternId) -> bool {
        !self.num_ways_to_become_each_pattern[pattern].is_zero()
    }

    pub fn pattern_count(&self) -> u32 {
        self.num_compatible_patterns
    }

    pub fn entropy(&self) -> f32 {
        self.stats.entropy()
    }

    pub fn noise(&self) -> u32 {
        self.noise
    }

    /// The single remaining pattern, if this cell is decided.
    pub fn chosen_pattern(&self) -> Option<PatternId> {
        if self.num_compatible_patterns != 1 {
            return None;
        }
        self.num_ways_to_become_each_pattern
            .enumerate()
            .find(|(_, ways)| !ways.is_zero())
            .map(|(id, _)| id)
    }

    pub fn remaining_patterns(&self) -> impl Iterator<Item = PatternId> + '_ {
        self.num_ways_to_become_each_pattern.enumerate().filter_map(|(id, ways)| if ways.is_zero() { None } else { Some(id) })
    }

    /// Remove `pattern` from this cell's possibility set. Returns `false` if
    /// it was already gone (no-op). Does not touch neighbor compat counters
    /// or the propagation queue — that bookkeeping lives in `propagator.rs`.
    fn remove(&mut self, pattern: PatternId, weight: &Option<PatternWeight>) -> bool {
        if self.num_ways_to_become_each_pattern[pattern].is_zero() {
            return false;
        }
        self.num_ways_to_become_each_pattern[pattern].per_direction.iter_mut().for_each(|c| *c = 0);
        self.num_compatible_patterns -= 1;
        if let Some(weight) = weight {
            self.stats.remove(weight);
        }
        true
    }

    /// Undo a prior `remove`, restoring the direction-wise compat counts
    /// that were in effect before the removal (captured by the caller in
    /// the backtrack journal, since this cell alone doesn't know them).
    fn restore(&mut self, pattern: PatternId, per_direction: Vec<u32>, weight: &Option<PatternWeight>) {
        self.num_ways_to_become_each_pattern[pattern] = NumWaysToBecomePattern::new(per_direction);
        self.num_compatible_patterns += 1;
        if let Some(weight) = weight {
            self.stats.add(weight);
        }
    }

    fn compat_snapshot(&self, pattern: PatternId) -> Vec<u32> {
        self.num_ways_to_become_each_pattern[pattern].per_direction.clone()
    }

    /// Inverse of a single `try_decrement` step that did *not* zero the
    /// pattern out: put the one direction's count back up by one. Used only
    /// by backtracking (`propagator.rs`'s `JournalEntry::Decremented`).
    fn bump_compat(&mut self, pattern: PatternId, dir: usize) {
        self.num_ways_to_become_each_pattern[pattern].per_direction[dir] += 1;
    }

    fn try_decrement_compat(&mut self, pattern: PatternId, dir: usize, weight: &Option<PatternWeight>) -> bool {
        if self.num_ways_to_become_each_pattern[pattern].is_zero() {
            return false;
        }
        let became_zero = self.num_ways_to_become_each_pattern[pattern].try_decrement(dir);
        if became_zero {
            self.num_compatible_patterns -= 1;
            if let Some(weight) = weight {
                self.stats.remove(weight);
            }
        }
        became_zero
    }
}

/// The dense per-cell bitmap of still-possible patterns over pattern space.
/// `cells[i] = None` marks a topology cell masked out as inactive; it never
/// participates in selection, propagation or the contradiction check.
pub struct Wave {
    cells: Vec<Option<WaveCell>>,
    num_patterns: usize,
}

impl Wave {
    /// `opposite(dir)` is the topology's direction-set opposite lookup.
    /// `compat[i][p][dir]` is initialized from `|prop[p][opposite(dir)]|`
    /// per `wfc/src/wfc.rs`'s `NumWaysToBecomeEachPatternByDirection`: this
    /// cell's support for pattern `p` from the neighbor in direction `dir`
    /// comes from that neighbor's own outgoing compatibility list in the
    /// direction pointing back here, which window-shift-derived (and
    /// symmetrically declared) adjacency makes equal to `prop[p][opposite(dir)]`.
    pub fn new<T: Tile>(
        active: impl Fn(usize) -> bool,
        len: usize,
        compiled: &CompiledModel<T>,
        opposite: impl Fn(usize) -> usize,
        rng: &mut impl Rng,
    ) -> Self {
        let weights: Vec<Option<PatternWeight>> = compiled.weights.iter().map(|w| Some(*w)).collect();
        let per_pattern_compat: Vec<Vec<u32>> = (0..compiled.num_patterns())
            .map(|p| {
                (0..compiled.num_directions)
                    .map(|dir| compiled.propagator[p as PatternId][opposite(dir)].len() as u32)
                    .collect()
            })
            .collect();

        let cells = (0..len)
            .map(|i| {
                if !active(i) {
                    return None;
                }
                let mut stats = WaveCellStats::default();
                for weight in weights.iter().flatten() {
                    stats.add(weight);
                }
                let num_ways_to_become_each_pattern = (0..compiled.num_patterns())
                    .map(|p| NumWaysToBecomePattern::new(per_pattern_compat[p].clone()))
                    .collect::<PatternTable<_>>();
                Some(WaveCell {
                    noise: rng.gen(),
                    num_compatible_patterns: compiled.num_patterns() as u32,
                    stats,
                    num_ways_to_become_each_pattern,
                })
            })
            .collect();

        Self { cells, num_patterns: compiled.num_patterns() }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn num_patterns(&self) -> usize {
        self.num_patterns
    }

    pub fn cell(&self, index: usize) -> Option<&WaveCell> {
        self.cells[index].as_ref()
    }

    pub(crate) fn cell_mut(&mut self, index: usize) -> Option<&mut WaveCell> {
        self.cells[index].as_mut()
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.cells[index].is_some()
    }

    /// `true` iff any active cell has zero remaining patterns.
    pub fn is_contradiction(&self) -> bool {
        self.cells.iter().flatten().any(|c| c.pattern_count() == 0)
    }

    /// `true` iff every active cell has exactly one remaining pattern.
    pub fn is_decided(&self) -> bool {
        self.cells.iter().flatten().all(|c| c.pattern_count() == 1)
    }

    pub(crate) fn ban_raw(&mut self, index: usize, pattern: PatternId, weight: &Option<PatternWeight>) -> bool {
        self.cells[index].as_mut().map(|c| c.remove(pattern, weight)).unwrap_or(false)
    }

    pub(crate) fn restore_raw(&mut self, index: usize, pattern: PatternId, per_direction: Vec<u32>, weight: &Option<PatternWeight>) {
        if let Some(cell) = self.cells[index].as_mut() {
            cell.restore(pattern, per_direction, weight);
        }
    }

    pub(crate) fn compat_snapshot(&self, index: usize, pattern: PatternId) -> Vec<u32> {
        self.cells[index].as_ref().map(|c| c.compat_snapshot(pattern)).unwrap_or_default()
    }

    pub(crate) fn try_decrement_compat(&mut self, index: usize, pattern: PatternId, dir: usize, weight: &Option<PatternWeight>) -> bool {
        self.cells[index].as_mut().map(|c| c.try_decrement_compat(pattern, dir, weight)).unwrap_or(false)
    }

    /// See `WaveCell::bump_compat`.
    pub(crate) fn bump_compat(&mut self, index: usize, pattern: PatternId, dir: usize) {
        if let Some(cell) = self.cells[index].as_mut() {
            cell.bump_compat(pattern, dir);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pattern::compile_adjacent;
    use hashbrown::HashMap;
    use rand_xorshift::XorShiftRng;
    use rand::SeedableRng;

    #[test]
    fn fresh_wave_has_all_patterns_possible_everywhere() {
        let tiles = vec!["A", "B"];
        let freq: HashMap<&str, u32> = [("A", 1), ("B", 1)].into_iter().collect();
        let adjacency: Vec<Vec<(&str, &str)>> = vec![
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
        ];
        let compiled = compile_adjacent(&tiles, &freq, &adjacency).unwrap();
        let mut rng = XorShiftRng::seed_from_u64(0);
        let wave = Wave::new(|_| true, 1, &compiled, |d| [1, 0, 3, 2][d], &mut rng);
        assert_eq!(wave.cell(0).unwrap().pattern_count(), 2);
        assert!(!wave.is_decided());
        assert!(!wave.is_contradiction());
    }

    #[test]
    fn masked_cell_is_inactive() {
        let tiles = vec!["A"];
        let freq: HashMap<&str, u32> = [("A", 1)].into_iter().collect();
        let adjacency: Vec<Vec<(&str, &str)>> = vec![vec![("A", "A")]; 4];
        let compiled = compile_adjacent(&tiles, &freq, &adjacency).unwrap();
        let mut rng = XorShiftRng::seed_from_u64(0);
        let wave = Wave::new(|i| i != 1, 2, &compiled, |d| [1, 0, 3, 2][d], &mut rng);
        assert!(wave.is_active(0));
        assert!(!wave.is_active(1));
        assert!(wave.cell(1).is_none());
    }
}
