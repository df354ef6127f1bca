//! The public tile-space solver: owns the `Wave`, drains the propagation
//! queue to arc consistency, runs the entropy-based observer loop, and
//! performs chronological backtracking when a decision leads to a
//! contradiction.
//!
//! `wfc/src/wfc.rs`'s `Context`/`Observer`/`RunOwn` never backtrack
//! (`retry.rs`'s `Forever`/`NumTimes` instead restart the whole wave from
//! scratch on contradiction) and have no constraint hook protocol at all.
//! The entropy priority queue with lazy invalidation (`HeapEntry`,
//! `select_cell`) is ported from that module's `Observer`/`CoordEntropy`/
//! `entropy_priority_queue`; everything else here (the journal, `Constraint`
//! dispatch, backtracking) is new, built on an index/id-based design rather
//! than a pointer graph, so the backtrack journal stays plain data.

use crate::constraints::Constraint;
use crate::error::Error;
use crate::mapping::TileModelMapping;
use crate::pattern::{compile_adjacent, expand_adjacency, CompiledModel, PatternId};
use crate::rotation::{Rotation, RotationGroup};
use crate::tile::Tile;
use crate::tile_model::TileModel;
use crate::topology::Topology;
use crate::wave::Wave;
use log::{debug, warn};
use rand::Rng;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// `status()` sentinel values, matching §6's `Undecided = -1`, `Decided =
/// -2`, `Contradiction = -3` (patterns themselves are always `>= 0`, so the
/// three are mutually exclusive with any real pattern id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Undecided,
    Decided,
    Contradiction,
}

impl Status {
    pub fn sentinel(self) -> i64 {
        match self {
            Status::Undecided => -1,
            Status::Decided => -2,
            Status::Contradiction => -3,
        }
    }
}

/// What a decoded tile-space cell holds: a concrete tile, one of the two
/// non-tile states `toArray` can report (`status` §3 invariant 4), or
/// `Outside` for a cell the topology's mask excluded from the solve
/// entirely. A masked cell is "absence, not a sentinel" (DESIGN.md):
/// it never has zero remaining patterns (`wave.cell` returns `None` for
/// it, not a zeroed `WaveCell`), so it must never be reported the same way
/// as a genuine `Contradiction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    Tile(T),
    Undecided,
    Contradiction,
    Outside,
}

struct HeapEntry {
    index: usize,
    entropy: f32,
    noise: u32,
    pattern_count: u32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.entropy == other.entropy && self.noise == other.noise
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// `BinaryHeap` is a max-heap; reverse the comparison so the minimum-entropy
// cell (tie-broken by the smaller per-cell noise sample) pops first.
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .entropy
            .partial_cmp(&self.entropy)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.noise.cmp(&self.noise))
    }
}

/// One journaled mutation, with enough state to invert it exactly on
/// backtrack (invariant 4, §8). `Removed` covers both a direct `ban`/`select`
/// and a propagation decrement that zeroed a pattern out — either way
/// `remove()` clobbers every direction's compat count, so undoing it needs
/// the full pre-removal snapshot. `Decremented` covers a propagation step
/// that lowered one direction's count without zeroing it: nothing else
/// changed, so undoing it is a single `+1`.
enum JournalEntry {
    Removed { index: usize, pattern: PatternId, snapshot: Vec<u32> },
    Decremented { index: usize, pattern: PatternId, dir: usize },
}

/// Everything undone together when one decision is rolled back: the bans it
/// caused (directly or through propagation/constraints), plus the decision
/// itself so the propagator knows which choice to re-ban at that cell.
///
/// `undo_hooks` is the "journal hook for arbitrary undo callbacks" the
/// constraint contract (§4.5) requires for constraints with internal state
/// beyond the wave; none of the six built-ins in this crate need it (they
/// recompute from the wave on every `check`), so it is exercised only by
/// unit tests here, but the capability is part of the `Constraint` contract
/// future constraints rely on.
#[derive(Default)]
struct Frame {
    decision: Option<(usize, PatternId)>,
    entries: Vec<JournalEntry>,
    undo_hooks: Vec<Box<dyn FnMut()>>,
}

/// The pattern-space arc-consistency solver lifted to a tile-space public
/// API (§4.6). Generic over the tile type `T`; `canonicalize`, if set,
/// implements the `RotatedTile` fallback lookup of §4.6 step 2 ("for
/// `RotatedTile` values not in the table, canonicalize first") without
/// requiring `T` to literally be `RotatedTile<U>`.
pub struct TilePropagator<T: Tile> {
    topology: Topology,
    mapping: TileModelMapping,
    compiled: CompiledModel<T>,
    wave: Wave,
    queue: Vec<(usize, PatternId)>,
    heap: BinaryHeap<HeapEntry>,
    frames: Vec<Frame>,
    backtrack_depth: i64,
    backtrack_count: u64,
    status: Status,
    constraints: Vec<Box<dyn Constraint<T>>>,
    canonicalize: Option<Box<dyn Fn(&T) -> T>>,
}

/// Construction-time configuration, matching §6's `new TilePropagator(...,
/// { backtrackDepth, constraints, random })`.
///
/// `rotation_group` and `apply_rotation` drive the rotation-group expansion
/// of §4.1: for `Adjacent` models, declared adjacency pairs are expanded
/// through every rotation in the group before compilation; for `Overlapping`
/// models, every sampled window is additionally emitted in every rotation.
/// Left at the default identity group, neither model gets any expansion —
/// exactly the single-orientation behavior of a caller that never declares
/// symmetry.
pub struct PropagatorOptions<T: Tile> {
    pub backtrack_depth: i64,
    pub constraints: Vec<Box<dyn Constraint<T>>>,
    pub canonicalize: Option<Box<dyn Fn(&T) -> T>>,
    pub rotation_group: RotationGroup,
    pub apply_rotation: Option<Box<dyn Fn(&T, Rotation) -> Result<T, Error>>>,
}

impl<T: Tile> Default for PropagatorOptions<T> {
    fn default() -> Self {
        Self {
            backtrack_depth: 0,
            constraints: Vec::new(),
            canonicalize: None,
            rotation_group: RotationGroup::new(1, false).expect("1, false is always a valid group"),
            apply_rotation: None,
        }
    }
}

impl<T: Tile> TilePropagator<T> {
    pub fn new(
        model: TileModel<T>,
        topology: Topology,
        options: PropagatorOptions<T>,
        rng: &mut impl Rng,
    ) -> Result<Self, Error> {
        let direction_set = topology.direction_set();
        // Identity-only unless the caller opted into a richer symmetry
        // group; a missing `apply_rotation` behaves like `Treatment::Missing`
        // for every non-identity rotation, which `expand_adjacency`/
        // `overlapping::compile` both already treat as "drop that expansion"
        // rather than an error.
        let apply_rotation = |t: &T, r: Rotation| -> Result<T, Error> {
            if r == Rotation::IDENTITY {
                return Ok(t.clone());
            }
            match &options.apply_rotation {
                Some(f) => f(t, r),
                None => Err(Error::MissingRotation { rotation: r }),
            }
        };
        let (compiled, mapping) = match model {
            TileModel::Adjacent { tiles, frequency, adjacency } => {
                if adjacency.len() != direction_set.len() {
                    return Err(Error::AdjacencyDirectionCountMismatch {
                        expected: direction_set.len(),
                        actual: adjacency.len(),
                    });
                }
                let expanded = expand_adjacency(&adjacency, direction_set, options.rotation_group.iter(), apply_rotation);
                let compiled = compile_adjacent(&tiles, &frequency, &expanded)?;
                let mapping = TileModelMapping::identity((topology.width(), topology.height(), topology.depth()));
                (compiled, mapping)
            }
            TileModel::Overlapping { window, periodic_x, periodic_y, periodic_z, samples } => {
                let compiled = crate::overlapping::compile(
                    window,
                    (periodic_x, periodic_y, periodic_z),
                    &samples,
                    direction_set,
                    options.rotation_group.iter(),
                    apply_rotation,
                )?;
                let mapping = TileModelMapping::overlapping(
                    (topology.width(), topology.height(), topology.depth()),
                    window,
                    topology.periodicity(),
                );
                (compiled, mapping)
            }
        };
        debug!(
            "compiled {} patterns, {} directions, {} offsets",
            compiled.num_patterns(),
            compiled.num_directions,
            compiled.num_offsets
        );

        Self::from_compiled(compiled, mapping, topology, options, rng)
    }

    fn from_compiled(
        compiled: CompiledModel<T>,
        mapping: TileModelMapping,
        topology: Topology,
        options: PropagatorOptions<T>,
        rng: &mut impl Rng,
    ) -> Result<Self, Error> {
        let pattern_len = mapping.pattern_dims().0 as usize * mapping.pattern_dims().1 as usize * mapping.pattern_dims().2 as usize;
        let wave = Wave::new(
            |i| pattern_space_active(&topology, &mapping, i),
            pattern_len,
            &compiled,
            |dir| topology.opposite(dir),
            rng,
        );

        let mut propagator = Self {
            topology,
            mapping,
            compiled,
            wave,
            queue: Vec::new(),
            heap: BinaryHeap::new(),
            frames: vec![Frame::default()],
            backtrack_depth: options.backtrack_depth,
            backtrack_count: 0,
            status: Status::Undecided,
            constraints: options.constraints,
            canonicalize: options.canonicalize,
        };
        propagator.seed_heap();

        let mut constraints = std::mem::take(&mut propagator.constraints);
        for constraint in constraints.iter_mut() {
            constraint.init(&mut propagator);
        }
        propagator.constraints = constraints;
        if propagator.wave.is_contradiction() {
            propagator.status = Status::Contradiction;
        } else if propagator.quiesce().is_err() {
            propagator.status = Status::Contradiction;
        }
        Ok(propagator)
    }

    fn seed_heap(&mut self) {
        self.heap.clear();
        for index in 0..self.wave.len() {
            if let Some(cell) = self.wave.cell(index) {
                if cell.pattern_count() > 1 {
                    self.heap.push(HeapEntry {
                        index,
                        entropy: cell.entropy(),
                        noise: cell.noise(),
                        pattern_count: cell.pattern_count(),
                    });
                }
            }
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn backtrack_count(&self) -> u64 {
        self.backtrack_count
    }

    /// Fraction of cells that are no longer undecided (`pattern_count <=
    /// 1`), for callers that want a rough progress readout.
    pub fn progress(&self) -> f32 {
        let mut total = 0usize;
        let mut resolved = 0usize;
        for index in 0..self.wave.len() {
            if let Some(cell) = self.wave.cell(index) {
                total += 1;
                if cell.pattern_count() <= 1 {
                    resolved += 1;
                }
            }
        }
        if total == 0 {
            1.0
        } else {
            resolved as f32 / total as f32
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    // ---- pattern-space primitives ----

    fn current_frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("at least one frame always exists")
    }

    /// The propagator's sole mutator (§4.3): clears the bit, updates entropy
    /// bookkeeping, journals the removal, and enqueues it for propagation.
    /// No-op if the pattern is already gone.
    fn ban_raw(&mut self, index: usize, pattern: PatternId) {
        let weight = self.compiled.weights.iter().nth(pattern as usize).copied();
        let snapshot = self.wave.compat_snapshot(index, pattern);
        if !self.wave.ban_raw(index, pattern, &weight) {
            return;
        }
        self.current_frame().entries.push(JournalEntry::Removed { index, pattern, snapshot });
        self.queue.push((index, pattern));
        if let Some(cell) = self.wave.cell(index) {
            if cell.pattern_count() > 1 {
                self.heap.push(HeapEntry {
                    index,
                    entropy: cell.entropy(),
                    noise: cell.noise(),
                    pattern_count: cell.pattern_count(),
                });
            }
        }
    }

    /// Drain loop (§4.3): pop a removed `(cell, pattern)`, decrement every
    /// neighbor's compat counter for patterns it supported, recursing into
    /// further bans when a counter reaches zero. Returns `Err` the instant
    /// any active cell's pattern count hits zero, discarding the rest of the
    /// queue (contradictions don't need further propagation).
    fn drain(&mut self) -> Result<(), ()> {
        while let Some((index, pattern)) = self.queue.pop() {
            for dir in 0..self.compiled.num_directions {
                let Some(neighbor) = pattern_neighbor(&self.topology, &self.mapping, index, dir) else {
                    continue;
                };
                let compatible: Vec<PatternId> = self.compiled.compatible_in_direction(pattern, dir).to_vec();
                for q in compatible {
                    let weight = self.compiled.weights.iter().nth(q as usize).copied();
                    // Snapshot before decrementing: if this decrement zeroes
                    // the pattern out, `try_decrement_compat` clobbers every
                    // direction's count, so the snapshot is what a later
                    // backtrack needs to restore to.
                    let snapshot = self.wave.compat_snapshot(neighbor, q);
                    let became_zero = self.wave.try_decrement_compat(neighbor, q, dir, &weight);
                    if became_zero {
                        self.current_frame().entries.push(JournalEntry::Removed { index: neighbor, pattern: q, snapshot });
                        self.queue.push((neighbor, q));
                        if let Some(cell) = self.wave.cell(neighbor) {
                            if cell.pattern_count() == 0 {
                                self.queue.clear();
                                return Err(());
                            }
                            if cell.pattern_count() > 1 {
                                self.heap.push(HeapEntry {
                                    index: neighbor,
                                    entropy: cell.entropy(),
                                    noise: cell.noise(),
                                    pattern_count: cell.pattern_count(),
                                });
                            }
                        }
                    } else if snapshot.get(dir).copied().unwrap_or(0) != 0 {
                        // A real decrement happened (the pattern was still
                        // possible both before and after): journal it so
                        // backtracking can put the single count back.
                        self.current_frame().entries.push(JournalEntry::Decremented { index: neighbor, pattern: q, dir });
                    }
                }
            }
        }
        Ok(())
    }

    /// Run the drain loop, then dispatch constraint `check` passes (in
    /// registration order) until a full pass makes no further changes
    /// (fixed point; guaranteed to terminate since every pass that changes
    /// anything strictly shrinks the wave). `Err` on contradiction from
    /// either the drain or a constraint's own bans.
    fn quiesce(&mut self) -> Result<(), ()> {
        self.drain()?;
        if self.wave.is_contradiction() {
            return Err(());
        }
        loop {
            let mut changed = false;
            let mut constraints = std::mem::take(&mut self.constraints);
            for constraint in constraints.iter_mut() {
                let before = self.remaining_total();
                constraint.check(self);
                self.drain()?;
                if self.wave.is_contradiction() {
                    self.constraints = constraints;
                    return Err(());
                }
                if self.remaining_total() != before {
                    changed = true;
                }
            }
            self.constraints = constraints;
            if !changed {
                break;
            }
        }
        Ok(())
    }

    fn remaining_total(&self) -> u64 {
        (0..self.wave.len())
            .filter_map(|i| self.wave.cell(i))
            .map(|c| c.pattern_count() as u64)
            .sum()
    }

    /// Pop entries from the entropy heap until a still-valid (same pattern
    /// count, still multi-valued) minimum-entropy cell is found, ported from
    /// `wfc/src/wfc.rs`'s `Observer::choose_next_cell` lazy-invalidation
    /// scheme.
    fn select_cell(&mut self) -> Option<usize> {
        while let Some(entry) = self.heap.pop() {
            if let Some(cell) = self.wave.cell(entry.index) {
                if cell.pattern_count() == entry.pattern_count && cell.pattern_count() > 1 {
                    return Some(entry.index);
                }
            }
        }
        None
    }

    fn weighted_pick(&self, index: usize, rng: &mut impl Rng) -> PatternId {
        let cell = self.wave.cell(index).expect("selected cell is active");
        let total: u32 = cell
            .remaining_patterns()
            .map(|p| self.compiled.weights.iter().nth(p as usize).unwrap().weight())
            .sum();
        let mut choice = rng.gen_range(0..total);
        for p in cell.remaining_patterns() {
            let w = self.compiled.weights.iter().nth(p as usize).unwrap().weight();
            if choice < w {
                return p;
            }
            choice -= w;
        }
        unreachable!("weighted pick must land on a pattern")
    }

    fn open_frame(&mut self, decision: Option<(usize, PatternId)>) {
        self.frames.push(Frame { decision, entries: Vec::new(), undo_hooks: Vec::new() });
        if self.backtrack_depth >= 0 && self.frames.len() as i64 > self.backtrack_depth + 1 {
            // Discard the oldest revocable frame: decisions beyond the
            // configured depth become irrevocable (§4.4). At
            // `backtrack_depth == 0` this keeps at most the base frame plus
            // the single in-flight decision frame, and `backtrack()` below
            // refuses to pop even that one.
            self.frames.remove(1);
        }
    }

    /// Ban every remaining pattern at `index` except `keep`, in a single
    /// batch (§4.4 step 4, `select(i, chosen)`).
    fn select_pattern_at(&mut self, index: usize, keep: PatternId) {
        let Some(cell) = self.wave.cell(index) else { return };
        let others: Vec<PatternId> = cell.remaining_patterns().filter(|&p| p != keep).collect();
        for p in others {
            self.ban_raw(index, p);
        }
    }

    /// Roll the most recent decision frame back to exactly its pre-decision
    /// state (§8 invariant 4), then re-ban the choice that led there so the
    /// same branch isn't retried, and re-drain. Recurses if that re-ban
    /// itself contradicts. `Contradiction` if no frame remains to pop.
    fn backtrack(&mut self) -> Status {
        if self.backtrack_depth == 0 && self.frames.len() > 1 {
            // §4.4: `backtrackDepth == 0` means no backtracking at all, so a
            // contradiction after any decision frame is terminal rather than
            // something to undo.
            warn!("contradiction with backtrack_depth == 0, no backtracking permitted");
            self.status = Status::Contradiction;
            return self.status;
        }
        loop {
            let Some(mut frame) = self.frames.pop() else {
                self.status = Status::Contradiction;
                return self.status;
            };
            if self.frames.is_empty() {
                // The base (pre-decision, constraint-init) frame: nothing
                // left to undo into.
                self.frames.push(frame);
                self.status = Status::Contradiction;
                return self.status;
            }
            for entry in frame.entries.drain(..).rev() {
                match entry {
                    JournalEntry::Removed { index, pattern, snapshot } => {
                        let weight = self.compiled.weights.iter().nth(pattern as usize).copied();
                        self.wave.restore_raw(index, pattern, snapshot, &weight);
                    }
                    JournalEntry::Decremented { index, pattern, dir } => {
                        self.wave.bump_compat(index, pattern, dir);
                    }
                }
            }
            for mut hook in frame.undo_hooks.drain(..).rev() {
                hook();
            }
            self.backtrack_count += 1;
            self.seed_heap();
            debug!("backtrack #{} at frame depth {}", self.backtrack_count, self.frames.len());

            let Some((index, pattern)) = frame.decision else {
                // A non-decision frame (shouldn't normally contradict on its
                // own undo) — keep unwinding.
                continue;
            };
            self.ban_raw(index, pattern);
            match self.drain() {
                Err(()) => continue,
                Ok(()) => match self.quiesce() {
                    Err(()) => continue,
                    Ok(()) => {
                        self.status = if self.wave.is_decided() { Status::Decided } else { Status::Undecided };
                        return self.status;
                    }
                },
            }
        }
    }

    /// Register an undo callback fired (in LIFO order with the current
    /// frame's bans) if the current decision is backtracked. Part of the
    /// journal-hook contract §4.5 requires for constraints with internal
    /// state beyond the wave.
    pub fn register_undo(&mut self, hook: impl FnMut() + 'static) {
        self.current_frame().undo_hooks.push(Box::new(hook));
    }

    pub fn set_contradiction(&mut self) {
        self.status = Status::Contradiction;
    }

    // ---- observer loop ----

    pub fn step(&mut self, rng: &mut impl Rng) -> Status {
        if self.status != Status::Undecided {
            return self.status;
        }
        let Some(index) = self.select_cell() else {
            self.status = if self.wave.is_contradiction() { Status::Contradiction } else { Status::Decided };
            return self.status;
        };
        let pattern = self.weighted_pick(index, rng);
        self.open_frame(Some((index, pattern)));
        self.select_pattern_at(index, pattern);
        match self.quiesce() {
            Err(()) => {
                warn!("contradiction while deciding cell {}", index);
                self.status = Status::Contradiction;
                self.backtrack()
            }
            Ok(()) => {
                self.status = if self.wave.is_decided() { Status::Decided } else { Status::Undecided };
                self.status
            }
        }
    }

    pub fn run(&mut self, rng: &mut impl Rng) -> Status {
        loop {
            match self.step(rng) {
                Status::Undecided => continue,
                terminal => return terminal,
            }
        }
    }

    pub fn clear(&mut self, rng: &mut impl Rng) {
        let wave = Wave::new(
            |i| pattern_space_active(&self.topology, &self.mapping, i),
            self.wave.len(),
            &self.compiled,
            |dir| self.topology.opposite(dir),
            rng,
        );
        self.wave = wave;
        self.queue.clear();
        self.frames = vec![Frame::default()];
        self.backtrack_count = 0;
        self.status = Status::Undecided;
        self.seed_heap();
        let mut constraints = std::mem::take(&mut self.constraints);
        for constraint in constraints.iter_mut() {
            constraint.init(self);
        }
        self.constraints = constraints;
        if self.wave.is_contradiction() || self.quiesce().is_err() {
            self.status = Status::Contradiction;
        }
    }

    // ---- tile-space lifting (§4.6) ----

    fn tile_patterns(&self, offset_index: usize, tile: &T) -> Vec<PatternId> {
        if let Some(patterns) = self.compiled.tiles_to_patterns_by_offset[offset_index].get(tile) {
            return patterns.clone();
        }
        if let Some(canon) = &self.canonicalize {
            let canonical = canon(tile);
            if let Some(patterns) = self.compiled.tiles_to_patterns_by_offset[offset_index].get(&canonical) {
                return patterns.clone();
            }
        }
        Vec::new()
    }

    fn to_pattern_index(&self, x: u32, y: u32, z: u32) -> (usize, usize) {
        let ((px, py, pz), offset) = self.mapping.to_pattern_coord((x, y, z));
        let pattern_topology_index = pattern_linear_index(&self.mapping, px, py, pz);
        let offset_index = self.mapping.offset_index(offset);
        (pattern_topology_index, offset_index)
    }

    pub fn ban(&mut self, x: u32, y: u32, z: u32, tile: &T) {
        let (index, offset) = self.to_pattern_index(x, y, z);
        let patterns = self.tile_patterns(offset, tile);
        for p in patterns {
            self.ban_raw(index, p);
        }
        if self.quiesce().is_err() {
            self.status = Status::Contradiction;
        } else if self.wave.is_decided() {
            self.status = Status::Decided;
        }
    }

    pub fn select(&mut self, x: u32, y: u32, z: u32, tile: &T) {
        let (index, offset) = self.to_pattern_index(x, y, z);
        let allowed = self.tile_patterns(offset, tile);
        let Some(cell) = self.wave.cell(index) else { return };
        let to_ban: Vec<PatternId> = cell.remaining_patterns().filter(|p| !allowed.contains(p)).collect();
        self.open_frame(None);
        for p in to_ban {
            self.ban_raw(index, p);
        }
        if self.quiesce().is_err() {
            self.status = Status::Contradiction;
        } else if self.wave.is_decided() {
            self.status = Status::Decided;
        }
    }

    pub fn is_banned(&self, x: u32, y: u32, z: u32, tile: &T) -> bool {
        let (index, offset) = self.to_pattern_index(x, y, z);
        let patterns = self.tile_patterns(offset, tile);
        let Some(cell) = self.wave.cell(index) else { return true };
        patterns.iter().all(|p| !cell.possible(*p))
    }

    pub fn is_selected(&self, x: u32, y: u32, z: u32, tile: &T) -> bool {
        let (index, offset) = self.to_pattern_index(x, y, z);
        let patterns = self.tile_patterns(offset, tile);
        let Some(cell) = self.wave.cell(index) else { return false };
        cell.pattern_count() as usize == patterns.iter().filter(|p| cell.possible(**p)).count() && !patterns.is_empty()
    }

    /// Whether `tile` still has at least one possible pattern at this
    /// tile-space cell (used by constraints like `Path`/`MaxConsecutive` to
    /// query candidate cells without mutating anything).
    pub fn is_possible(&self, x: u32, y: u32, z: u32, tile: &T) -> bool {
        let (index, offset) = self.to_pattern_index(x, y, z);
        let patterns = self.tile_patterns(offset, tile);
        let Some(cell) = self.wave.cell(index) else { return false };
        patterns.iter().any(|p| cell.possible(*p))
    }

    pub fn tile_dims(&self) -> (u32, u32, u32) {
        self.mapping.tile_dims()
    }

    /// `ToArray(undecided, contradiction)` (§4.6), extended with an
    /// `outside` sentinel for cells the topology's mask excluded from the
    /// solve (see `Decoded::Outside`).
    pub fn to_array(&self, undecided: T, contradiction: T, outside: T) -> Vec<T> {
        self.to_decoded_array()
            .into_iter()
            .map(|decoded| match decoded {
                Decoded::Tile(t) => t,
                Decoded::Undecided => undecided.clone(),
                Decoded::Contradiction => contradiction.clone(),
                Decoded::Outside => outside.clone(),
            })
            .collect()
    }

    /// `toValueArray<T>` (§6): like `to_array`, but maps every decoded cell
    /// through a caller-supplied function instead of requiring sentinel
    /// values of the tile type itself.
    pub fn to_value_array<V>(&self, f: impl Fn(&Decoded<T>) -> V) -> Vec<V> {
        self.to_decoded_array().iter().map(|decoded| f(decoded)).collect()
    }

    pub fn to_decoded_array(&self) -> Vec<Decoded<T>> {
        let (w, h, d) = self.mapping.tile_dims();
        let mut out = Vec::with_capacity(w as usize * h as usize * d as usize);
        for z in 0..d {
            for y in 0..h {
                for x in 0..w {
                    out.push(self.decode(x, y, z));
                }
            }
        }
        out
    }

    /// `toArraySets` (§4.6/§6): the full set of tiles still possible at
    /// every tile-space cell, deduped (an `Overlapping` model can map
    /// several remaining patterns to the same tile at a given offset). A
    /// masked-out cell decodes to an empty set, never to `contradiction`.
    pub fn to_array_sets(&self) -> Vec<hashbrown::HashSet<T>> {
        self.to_value_sets(|t| t.clone())
    }

    /// `toValueSets<T>` (§6): like `to_array_sets`, but maps every still-
    /// possible tile through a caller-supplied function before deduping.
    pub fn to_value_sets<V: Eq + std::hash::Hash>(&self, f: impl Fn(&T) -> V) -> Vec<hashbrown::HashSet<V>> {
        let (w, h, d) = self.mapping.tile_dims();
        let mut out = Vec::with_capacity(w as usize * h as usize * d as usize);
        for z in 0..d {
            for y in 0..h {
                for x in 0..w {
                    out.push(self.possible_tiles(x, y, z).iter().map(|tile| f(tile)).collect());
                }
            }
        }
        out
    }

    /// Every tile still possible at a tile-space cell; empty for a
    /// masked-out (`Outside`) cell.
    fn possible_tiles(&self, x: u32, y: u32, z: u32) -> Vec<T> {
        let (index, offset) = self.to_pattern_index(x, y, z);
        match self.wave.cell(index) {
            None => Vec::new(),
            Some(cell) => cell.remaining_patterns().map(|p| self.compiled.patterns_to_tiles_by_offset[offset][p].clone()).collect(),
        }
    }

    fn decode(&self, x: u32, y: u32, z: u32) -> Decoded<T> {
        let (index, offset) = self.to_pattern_index(x, y, z);
        match self.wave.cell(index) {
            None => Decoded::Outside,
            Some(cell) => match cell.chosen_pattern() {
                Some(p) => Decoded::Tile(self.compiled.patterns_to_tiles_by_offset[offset][p].clone()),
                None if cell.pattern_count() == 0 => Decoded::Contradiction,
                None => Decoded::Undecided,
            },
        }
    }
}

fn pattern_linear_index(mapping: &TileModelMapping, x: u32, y: u32, z: u32) -> usize {
    let (w, h, _d) = mapping.pattern_dims();
    (z as usize * h as usize + y as usize) * w as usize + x as usize
}

fn pattern_index_coords(mapping: &TileModelMapping, index: usize) -> (u32, u32, u32) {
    let (w, h, _d) = mapping.pattern_dims();
    let x = index % w as usize;
    let y = (index / w as usize) % h as usize;
    let z = index / (w as usize * h as usize);
    (x as u32, y as u32, z as u32)
}

/// The pattern-space analogue of `Topology::neighbor`: same direction
/// offsets and periodicity, but walked over `mapping.pattern_dims()` rather
/// than the topology's own (tile-space) dimensions, since the two can
/// differ for a non-periodic `Overlapping` model (`mapping.rs`).
fn pattern_neighbor(topology: &Topology, mapping: &TileModelMapping, index: usize, dir: usize) -> Option<usize> {
    let (px, py, pz) = pattern_index_coords(mapping, index);
    let info = topology.direction_set().directions()[dir];
    let (pw, ph, pd) = mapping.pattern_dims();
    let periodicity = topology.periodicity();
    let nx = crate::topology::wrap_axis(px as i32, info.offset.0, pw, periodicity.x)?;
    let ny = crate::topology::wrap_axis(py as i32, info.offset.1, ph, periodicity.y)?;
    let nz = crate::topology::wrap_axis(pz as i32, info.offset.2, pd, periodicity.z)?;
    Some(pattern_linear_index(mapping, nx, ny, nz))
}

fn pattern_space_active(topology: &Topology, mapping: &TileModelMapping, pattern_index: usize) -> bool {
    // A masked tile-space cell is treated as outside every pattern window it
    // would otherwise belong to (the open question resolved in DESIGN.md):
    // a pattern-space cell is active iff *every* in-bounds tile-space cell
    // it covers is active, so no pattern's window ever straddles a masked
    // coordinate.
    let (px, py, pz) = pattern_index_coords(mapping, pattern_index);
    let window = mapping.window();
    for ox in 0..window.0 {
        for oy in 0..window.1 {
            for oz in 0..window.2 {
                let tx = px + ox;
                let ty = py + oy;
                let tz = pz + oz;
                if tx < topology.width() && ty < topology.height() && tz < topology.depth() {
                    if !topology.is_active(topology.index(tx, ty, tz)) {
                        return false;
                    }
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::topology::{DirectionSet, Periodicity};
    use hashbrown::HashMap;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    fn adjacent_model(tiles: Vec<&'static str>, adjacency: Vec<Vec<(&'static str, &'static str)>>) -> TileModel<&'static str> {
        let freq: HashMap<&str, u32> = tiles.iter().map(|t| (*t, 1)).collect();
        TileModel::new_adjacent(tiles, freq, adjacency).unwrap()
    }

    fn topology_1d(len: u32) -> Topology {
        Topology::new(len, 1, 1, Periodicity::default(), DirectionSet::Cartesian2D).unwrap()
    }

    #[test]
    fn trivial_one_by_one_is_deterministic_for_fixed_seed() {
        let all = vec![
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
        ];
        let model = adjacent_model(vec!["A", "B"], all);
        let topology = topology_1d(1);
        let mut rng = XorShiftRng::seed_from_u64(0);
        let mut propagator = TilePropagator::new(model, topology, PropagatorOptions::default(), &mut rng).unwrap();
        let status = propagator.run(&mut rng);
        assert_eq!(status, Status::Decided);
        let array = propagator.to_array("?", "!", "#");
        assert_eq!(array.len(), 1);
        assert!(array[0] == "A" || array[0] == "B");
    }

    #[test]
    fn forced_stripe_alternates() {
        // direction order for Cartesian2D is [north, south, east, west]
        let adjacency = vec![vec![], vec![], vec![("A", "B"), ("B", "A")], vec![("B", "A"), ("A", "B")]];
        let model = adjacent_model(vec!["A", "B"], adjacency);
        let topology = topology_1d(4);
        let mut rng = XorShiftRng::seed_from_u64(7);
        let mut propagator = TilePropagator::new(model, topology, PropagatorOptions::default(), &mut rng).unwrap();
        propagator.select(0, 0, 0, &"A");
        let status = propagator.run(&mut rng);
        assert_eq!(status, Status::Decided);
        assert_eq!(propagator.to_array("?", "!", "#"), vec!["A", "B", "A", "B"]);
    }

    #[test]
    fn contradiction_with_no_allowed_adjacency() {
        let adjacency = vec![vec![], vec![], vec![], vec![]];
        let model = adjacent_model(vec!["A", "B"], adjacency);
        let topology = topology_1d(2);
        let mut rng = XorShiftRng::seed_from_u64(3);
        let mut propagator = TilePropagator::new(model, topology, PropagatorOptions::default(), &mut rng).unwrap();
        let status = propagator.run(&mut rng);
        assert_eq!(status, Status::Contradiction);
    }

    #[test]
    fn unlimited_backtracking_recovers_from_a_bad_greedy_pick() {
        // Three tiles in a ring (A-B-C-A only); on a 3x1 periodic strip a
        // bad first pick can paint itself into a corner without backtracking.
        let adjacency = vec![vec![], vec![], vec![("A", "B"), ("B", "C"), ("C", "A")], vec![("B", "A"), ("C", "B"), ("A", "C")]];
        let model = adjacent_model(vec!["A", "B", "C"], adjacency);
        let topology = Topology::new(3, 1, 1, Periodicity { x: true, y: false, z: false }, DirectionSet::Cartesian2D).unwrap();
        let mut rng = XorShiftRng::seed_from_u64(42);
        let options = PropagatorOptions { backtrack_depth: -1, ..Default::default() };
        let mut propagator = TilePropagator::new(model, topology, options, &mut rng).unwrap();
        let status = propagator.run(&mut rng);
        assert_eq!(status, Status::Decided);
    }

    #[test]
    fn zero_backtrack_depth_surfaces_contradiction_immediately() {
        let adjacency = vec![vec![], vec![], vec![], vec![]];
        let model = adjacent_model(vec!["A", "B"], adjacency);
        let topology = topology_1d(2);
        let mut rng = XorShiftRng::seed_from_u64(3);
        let options = PropagatorOptions { backtrack_depth: 0, ..Default::default() };
        let mut propagator = TilePropagator::new(model, topology, options, &mut rng).unwrap();
        let status = propagator.run(&mut rng);
        assert_eq!(status, Status::Contradiction);
        assert_eq!(propagator.backtrack_count(), 0);
    }

    #[test]
    fn overlapping_window_straddling_a_masked_cell_is_inactive() {
        // Width-4, non-periodic strip with the last cell masked out; a
        // width-2 window anchored at pattern x=2 covers tile cells 2 and 3,
        // so it straddles the masked cell and must be inactive even though
        // one of its two covered cells (x=2) is itself active.
        let topology = Topology::new(4, 1, 1, Periodicity::default(), DirectionSet::Cartesian2D)
            .unwrap()
            .with_mask(vec![true, true, true, false]);
        let mapping = TileModelMapping::overlapping((4, 1, 1), (2, 1, 1), Periodicity::default());
        assert_eq!(mapping.pattern_dims(), (3, 1, 1));

        // Pattern x=0 (covers tiles 0,1) and x=1 (covers tiles 1,2) are fully
        // unmasked.
        assert!(pattern_space_active(&topology, &mapping, pattern_linear_index(&mapping, 0, 0, 0)));
        assert!(pattern_space_active(&topology, &mapping, pattern_linear_index(&mapping, 1, 0, 0)));
        // Pattern x=2 (covers tiles 2,3) straddles the masked tile 3.
        assert!(!pattern_space_active(&topology, &mapping, pattern_linear_index(&mapping, 2, 0, 0)));
    }

    #[test]
    fn masked_cell_decodes_as_outside_not_contradiction() {
        let all = vec![
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
        ];
        let model = adjacent_model(vec!["A", "B"], all);
        let topology = Topology::new(3, 1, 1, Periodicity::default(), DirectionSet::Cartesian2D)
            .unwrap()
            .with_mask(vec![true, false, true]);
        let mut rng = XorShiftRng::seed_from_u64(0);
        let mut propagator = TilePropagator::new(model, topology, PropagatorOptions::default(), &mut rng).unwrap();
        let status = propagator.run(&mut rng);
        assert_eq!(status, Status::Decided);

        let decoded = propagator.to_decoded_array();
        assert_eq!(decoded[1], Decoded::Outside);
        assert_ne!(decoded[1], Decoded::Contradiction);
        assert!(matches!(decoded[0], Decoded::Tile(_)));
        assert!(matches!(decoded[2], Decoded::Tile(_)));

        let array = propagator.to_array("?", "!", "#");
        assert_eq!(array[1], "#");
        assert_ne!(array[1], "!");
    }

    #[test]
    fn value_array_and_tile_sets_agree_with_to_array() {
        let all = vec![
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
        ];
        let model = adjacent_model(vec!["A", "B"], all);
        let topology = topology_1d(1);
        let mut rng = XorShiftRng::seed_from_u64(0);
        let mut propagator = TilePropagator::new(model, topology, PropagatorOptions::default(), &mut rng).unwrap();
        let status = propagator.run(&mut rng);
        assert_eq!(status, Status::Decided);

        let array = propagator.to_array("?", "!", "#");
        let value_array = propagator.to_value_array(|decoded| match decoded {
            Decoded::Tile(t) => *t,
            Decoded::Undecided => "?",
            Decoded::Contradiction => "!",
            Decoded::Outside => "#",
        });
        assert_eq!(array, value_array);

        let tile_sets = propagator.to_array_sets();
        assert_eq!(tile_sets.len(), 1);
        assert!(tile_sets[0].contains(array[0]));
        assert_eq!(tile_sets[0].len(), 1);

        let value_sets = propagator.to_value_sets(|t| t.len());
        assert_eq!(value_sets[0], tile_sets[0].iter().map(|t| t.len()).collect());
    }

    #[test]
    fn masked_cell_has_empty_tile_set() {
        let all = vec![
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
            vec![("A", "A"), ("A", "B"), ("B", "A"), ("B", "B")],
        ];
        let model = adjacent_model(vec!["A", "B"], all);
        let topology = Topology::new(3, 1, 1, Periodicity::default(), DirectionSet::Cartesian2D)
            .unwrap()
            .with_mask(vec![true, false, true]);
        let mut rng = XorShiftRng::seed_from_u64(0);
        let mut propagator = TilePropagator::new(model, topology, PropagatorOptions::default(), &mut rng).unwrap();
        propagator.run(&mut rng);

        let tile_sets = propagator.to_array_sets();
        assert!(tile_sets[1].is_empty());
        assert!(!tile_sets[0].is_empty());
    }

    #[test]
    fn zero_backtrack_depth_does_not_undo_a_prior_decision() {
        // Same ring model and seed as `unlimited_backtracking_recovers_from_a_bad_greedy_pick`,
        // which only reaches `Decided` because unlimited backtracking undoes
        // a bad early pick. With `backtrack_depth: 0` that same pick must
        // surface as a terminal contradiction the first time it paints into
        // a corner, without ever popping the decision frame that got it
        // there.
        let adjacency = vec![vec![], vec![], vec![("A", "B"), ("B", "C"), ("C", "A")], vec![("B", "A"), ("C", "B"), ("A", "C")]];
        let model = adjacent_model(vec!["A", "B", "C"], adjacency);
        let topology = Topology::new(3, 1, 1, Periodicity { x: true, y: false, z: false }, DirectionSet::Cartesian2D).unwrap();
        let mut rng = XorShiftRng::seed_from_u64(42);
        let options = PropagatorOptions { backtrack_depth: 0, ..Default::default() };
        let mut propagator = TilePropagator::new(model, topology, options, &mut rng).unwrap();
        let status = propagator.run(&mut rng);
        assert_eq!(status, Status::Contradiction);
        assert_eq!(propagator.backtrack_count(), 0);
    }
}
