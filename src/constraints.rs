//! The constraint hook protocol (§4.5) and the built-in constraints.
//!
//! There is no direct counterpart in `wfc/src/wfc.rs`: its `ForbidPattern` trait only
//! ever forbids whole *patterns* globally, once, before a run starts — it
//! has no `init`/`check` split, no per-cell targeting, and no way to react
//! to propagation as it happens. Constraints here are modeled the way the
//! design notes ask: a narrow two-method capability interface (`init`,
//! `check`) operating only through the `TilePropagator`'s public tile-space
//! surface (`ban`/`select`/`is_possible`/`is_banned`/`register_undo`), never
//! through a pointer into the wave.
//!
//! Every built-in here is monotone: each only ever calls `ban`/`select`
//! (which can only narrow a cell's possibility set), never anything that
//! could widen it.

use crate::error::Error;
use crate::propagator::TilePropagator;
use crate::tile::Tile;
use hashbrown::HashMap;

/// The capability interface every constraint implements (§4.5).
pub trait Constraint<T: Tile> {
    /// Called once, immediately after the wave is created (and again on
    /// every `clear()`). May call `ban`/`select` and install internal state.
    fn init(&mut self, propagator: &mut TilePropagator<T>);

    /// Called at every propagation quiescence, in registration order,
    /// before the observer picks the next cell. May issue further bans or
    /// call `propagator.set_contradiction()`.
    fn check(&mut self, propagator: &mut TilePropagator<T>);
}

/// Recognizes the six string type tags §6/§10 reserve for constraint
/// configuration, without constructing anything — actual construction
/// needs type-specific parameters (tiles, points, axes) that a driver
/// supplies, so the core's job here is limited to validating the tag
/// itself, per §10's "expose ... the tag-keyed factory function, not parse
/// any file format."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintTag {
    Path,
    EdgedPath,
    Border,
    FixedTile,
    MaxConsecutive,
    Mirror,
}

impl ConstraintTag {
    pub fn parse(tag: &str) -> Result<Self, Error> {
        match tag {
            "path" => Ok(ConstraintTag::Path),
            "edgedPath" => Ok(ConstraintTag::EdgedPath),
            "border" => Ok(ConstraintTag::Border),
            "fixedTile" => Ok(ConstraintTag::FixedTile),
            "maxConsecutive" => Ok(ConstraintTag::MaxConsecutive),
            "mirror" => Ok(ConstraintTag::Mirror),
            other => Err(Error::UnknownConstraintTag { tag: other.to_string() }),
        }
    }
}

/// One of the six named sides a `Border` constraint can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    XMin,
    XMax,
    YMin,
    YMax,
    ZMin,
    ZMax,
}

impl Side {
    fn matches(self, x: u32, y: u32, z: u32, dims: (u32, u32, u32)) -> bool {
        let (w, h, d) = dims;
        match self {
            Side::XMin => x == 0,
            Side::XMax => x + 1 == w,
            Side::YMin => y == 0,
            Side::YMax => y + 1 == h,
            Side::ZMin => z == 0,
            Side::ZMax => z + 1 == d,
        }
    }
}

/// Bans (or forces) a set of tiles on the named sides of the tile-space
/// grid. `invert_area` targets every cell *not* on the named sides instead.
pub struct Border<T: Tile> {
    tiles: Vec<T>,
    sides: Vec<Side>,
    invert_area: bool,
    force: Option<Vec<T>>,
}

impl<T: Tile> Border<T> {
    /// Ban `tiles` on the listed `sides`.
    pub fn new(tiles: Vec<T>, sides: Vec<Side>) -> Self {
        Self { tiles, sides, invert_area: false, force: None }
    }

    pub fn invert_area(mut self, invert: bool) -> Self {
        self.invert_area = invert;
        self
    }

    /// Instead of banning `self.tiles` on the border, force every border
    /// cell to one of `self.tiles` by banning every other tile in
    /// `universe` there.
    pub fn force(mut self, universe: Vec<T>) -> Self {
        self.force = Some(universe);
        self
    }

    fn on_area(&self, x: u32, y: u32, z: u32, dims: (u32, u32, u32)) -> bool {
        let on_named_side = self.sides.iter().any(|s| s.matches(x, y, z, dims));
        on_named_side != self.invert_area
    }
}

impl<T: Tile> Constraint<T> for Border<T> {
    fn init(&mut self, propagator: &mut TilePropagator<T>) {
        let dims = propagator.tile_dims();
        let (w, h, d) = dims;
        for z in 0..d {
            for y in 0..h {
                for x in 0..w {
                    if !self.on_area(x, y, z, dims) {
                        continue;
                    }
                    match &self.force {
                        None => {
                            for tile in &self.tiles {
                                propagator.ban(x, y, z, tile);
                            }
                        }
                        Some(universe) => {
                            for tile in universe {
                                if !self.tiles.contains(tile) {
                                    propagator.ban(x, y, z, tile);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    fn check(&mut self, _propagator: &mut TilePropagator<T>) {
        // Border only ever constrains the initial wave; nothing it could
        // learn at quiescence would change which cells are on the border.
    }
}

/// Selects a single tile at a single point, chosen up front by the caller
/// (random-point selection, if wanted, is the caller's job: it needs an
/// `Rng`, which the `Constraint` contract doesn't thread through `init`).
pub struct FixedTile<T: Tile> {
    tile: T,
    point: (u32, u32, u32),
}

impl<T: Tile> FixedTile<T> {
    pub fn new(tile: T, point: (u32, u32, u32)) -> Self {
        Self { tile, point }
    }

    /// Convenience constructor matching the spec's "or a random point if
    /// unspecified": samples a point uniformly over `dims` using the
    /// caller's own `Rng` at construction time.
    pub fn random(tile: T, dims: (u32, u32, u32), rng: &mut impl rand::Rng) -> Self {
        let (w, h, d) = dims;
        let point = (rng.gen_range(0..w), rng.gen_range(0..h), rng.gen_range(0..d));
        Self::new(tile, point)
    }
}

impl<T: Tile> Constraint<T> for FixedTile<T> {
    fn init(&mut self, propagator: &mut TilePropagator<T>) {
        let (x, y, z) = self.point;
        propagator.select(x, y, z, &self.tile);
    }

    fn check(&mut self, _propagator: &mut TilePropagator<T>) {}
}

/// Which tile-space axis a `MaxConsecutive` run is measured along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Bans `tile` from extending a run of consecutive occurrences of itself
/// past `max_run` cells along `axis`. Only considers cells already
/// *selected* as `tile` (§4.5's monotonicity: a run can't be detected, and
/// therefore can't be capped, before its cells are decided).
pub struct MaxConsecutive<T: Tile> {
    tile: T,
    axis: Axis,
    max_run: u32,
}

impl<T: Tile> MaxConsecutive<T> {
    pub fn new(tile: T, axis: Axis, max_run: u32) -> Self {
        Self { tile, axis, max_run }
    }

    fn line_len(&self, dims: (u32, u32, u32)) -> u32 {
        match self.axis {
            Axis::X => dims.0,
            Axis::Y => dims.1,
            Axis::Z => dims.2,
        }
    }

    fn coord(&self, along: u32, a: u32, b: u32) -> (u32, u32, u32) {
        match self.axis {
            Axis::X => (along, a, b),
            Axis::Y => (a, along, b),
            Axis::Z => (a, b, along),
        }
    }
}

impl<T: Tile> Constraint<T> for MaxConsecutive<T> {
    fn init(&mut self, _propagator: &mut TilePropagator<T>) {}

    fn check(&mut self, propagator: &mut TilePropagator<T>) {
        if self.max_run == 0 {
            return;
        }
        let dims = propagator.tile_dims();
        let (da, db) = match self.axis {
            Axis::X => (dims.1, dims.2),
            Axis::Y => (dims.0, dims.2),
            Axis::Z => (dims.0, dims.1),
        };
        let line_len = self.line_len(dims);
        for b in 0..db {
            for a in 0..da {
                let mut run = 0u32;
                for along in 0..line_len {
                    let (x, y, z) = self.coord(along, a, b);
                    if propagator.is_selected(x, y, z, &self.tile) {
                        run += 1;
                        if run > self.max_run {
                            propagator.ban(x, y, z, &self.tile);
                            run = 0;
                        }
                    } else if propagator.is_banned(x, y, z, &self.tile) {
                        run = 0;
                    } else if run >= self.max_run {
                        propagator.ban(x, y, z, &self.tile);
                    }
                }
            }
        }
    }
}

/// Enforces that the decoded output is symmetric under a reflection on a
/// caller-chosen axis (§9's open question: which axis is explicit here,
/// never hard-coded). Whenever a tile is banned at one cell, the
/// `mirror_tile`-mapped tile is banned at the reflected cell, so the
/// constraint can only ever narrow both sides in lockstep.
pub struct Mirror<T: Tile> {
    axis: Axis,
    tiles: Vec<T>,
    mirror_tile: Box<dyn Fn(&T) -> T>,
}

impl<T: Tile> Mirror<T> {
    pub fn new(axis: Axis, tiles: Vec<T>, mirror_tile: impl Fn(&T) -> T + 'static) -> Self {
        Self { axis, tiles, mirror_tile: Box::new(mirror_tile) }
    }

    fn partner(&self, x: u32, y: u32, z: u32, dims: (u32, u32, u32)) -> (u32, u32, u32) {
        match self.axis {
            Axis::X => (dims.0 - 1 - x, y, z),
            Axis::Y => (x, dims.1 - 1 - y, z),
            Axis::Z => (x, y, dims.2 - 1 - z),
        }
    }
}

impl<T: Tile> Constraint<T> for Mirror<T> {
    fn init(&mut self, propagator: &mut TilePropagator<T>) {
        self.check(propagator);
    }

    fn check(&mut self, propagator: &mut TilePropagator<T>) {
        let dims = propagator.tile_dims();
        let (w, h, d) = dims;
        for z in 0..d {
            for y in 0..h {
                for x in 0..w {
                    let (mx, my, mz) = self.partner(x, y, z, dims);
                    for tile in &self.tiles {
                        if propagator.is_banned(x, y, z, tile) {
                            let mirrored = (self.mirror_tile)(tile);
                            if !propagator.is_banned(mx, my, mz, &mirrored) {
                                propagator.ban(mx, my, mz, &mirrored);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Finds articulation points of an undirected graph given as an adjacency
/// list, via the standard DFS low-link algorithm. Used by `Path`/`EdgedPath`
/// to find cells whose removal from the still-possibly-path subgraph would
/// disconnect required endpoints.
fn articulation_points(adj: &[Vec<usize>]) -> Vec<usize> {
    let n = adj.len();
    let mut disc = vec![usize::MAX; n];
    let mut low = vec![usize::MAX; n];
    let mut is_articulation = vec![false; n];
    let mut timer = 0usize;

    struct Frame {
        node: usize,
        parent: Option<usize>,
        child_idx: usize,
    }

    for start in 0..n {
        if disc[start] != usize::MAX {
            continue;
        }
        let mut stack = vec![Frame { node: start, parent: None, child_idx: 0 }];
        disc[start] = timer;
        low[start] = timer;
        timer += 1;

        while let Some(frame) = stack.last_mut() {
            let node = frame.node;
            if frame.child_idx < adj[node].len() {
                let next = adj[node][frame.child_idx];
                frame.child_idx += 1;
                if Some(next) == frame.parent {
                    continue;
                }
                if disc[next] == usize::MAX {
                    disc[next] = timer;
                    low[next] = timer;
                    timer += 1;
                    stack.push(Frame { node: next, parent: Some(node), child_idx: 0 });
                } else {
                    low[node] = low[node].min(disc[next]);
                }
            } else {
                let finished = stack.pop().unwrap();
                if let Some(parent) = finished.parent {
                    low[parent] = low[parent].min(low[finished.node]);
                    // The root's articulation status is handled separately
                    // below (by component count): "low >= disc" only
                    // characterizes articulation points with a parent of
                    // their own.
                    if parent != start && low[finished.node] >= disc[parent] {
                        is_articulation[parent] = true;
                    }
                }
            }
        }
        if adj[start].len() > 1 {
            // A DFS root is an articulation point iff removing it splits
            // its neighbors into more than one connected component.
            let mut visited_children = 0;
            let mut seen = vec![false; n];
            seen[start] = true;
            for &next in &adj[start] {
                if !seen[next] {
                    visited_children += 1;
                    let mut stack = vec![next];
                    seen[next] = true;
                    while let Some(node) = stack.pop() {
                        for &nb in &adj[node] {
                            if !seen[nb] && nb != start {
                                seen[nb] = true;
                                stack.push(nb);
                            }
                        }
                    }
                }
            }
            if visited_children > 1 {
                is_articulation[start] = true;
            }
        }
    }

    (0..n).filter(|&i| is_articulation[i]).collect()
}

/// `true` iff removing `removed` from `adj` disconnects any two of
/// `required` from each other.
fn removal_disconnects(adj: &[Vec<usize>], removed: usize, required: &[usize]) -> bool {
    let n = adj.len();
    let mut seen = vec![false; n];
    seen[removed] = true;
    let Some(&start) = required.iter().find(|&&r| r != removed) else {
        return false;
    };
    let mut stack = vec![start];
    seen[start] = true;
    while let Some(node) = stack.pop() {
        for &nb in &adj[node] {
            if !seen[nb] {
                seen[nb] = true;
                stack.push(nb);
            }
        }
    }
    required.iter().any(|&r| r != removed && !seen[r])
}

fn tile_space_candidates<T: Tile>(
    propagator: &TilePropagator<T>,
    path_tiles: &[T],
) -> (Vec<(u32, u32, u32)>, HashMap<(u32, u32, u32), usize>) {
    let (w, h, d) = propagator.tile_dims();
    let mut candidates = Vec::new();
    for z in 0..d {
        for y in 0..h {
            for x in 0..w {
                if path_tiles.iter().any(|t| propagator.is_possible(x, y, z, t)) {
                    candidates.push((x, y, z));
                }
            }
        }
    }
    let index: HashMap<(u32, u32, u32), usize> = candidates.iter().cloned().enumerate().map(|(i, c)| (c, i)).collect();
    (candidates, index)
}

/// Maintains connectivity of the set of cells that *must* lie on a
/// connected path. On every `check`, any still-path-capable cell that is an
/// articulation point between two required endpoints has every
/// `non_path_tile` banned, forcing it to stay on the path.
pub struct Path<T: Tile> {
    path_tiles: Vec<T>,
    non_path_tiles: Vec<T>,
    required: Vec<(u32, u32, u32)>,
}

impl<T: Tile> Path<T> {
    pub fn new(path_tiles: Vec<T>, non_path_tiles: Vec<T>, required: Vec<(u32, u32, u32)>) -> Self {
        Self { path_tiles, non_path_tiles, required }
    }

    fn candidate_graph(&self, propagator: &TilePropagator<T>) -> (Vec<(u32, u32, u32)>, Vec<Vec<usize>>, Vec<usize>) {
        let (candidates, index) = tile_space_candidates(propagator, &self.path_tiles);
        let mut adj = vec![Vec::new(); candidates.len()];
        let topology = propagator.topology();
        for (i, &(x, y, z)) in candidates.iter().enumerate() {
            let cell_index = topology.index(x, y, z);
            for dir in 0..topology.direction_set().len() {
                if let Some(n) = topology.neighbor(cell_index, dir) {
                    let coord = topology.coords(n);
                    if let Some(&j) = index.get(&coord) {
                        adj[i].push(j);
                    }
                }
            }
        }
        let required_indices: Vec<usize> = self.required.iter().filter_map(|c| index.get(c).copied()).collect();
        (candidates, adj, required_indices)
    }
}

impl<T: Tile> Constraint<T> for Path<T> {
    fn init(&mut self, propagator: &mut TilePropagator<T>) {
        self.check(propagator);
    }

    fn check(&mut self, propagator: &mut TilePropagator<T>) {
        let (candidates, adj, required) = self.candidate_graph(propagator);
        if required.len() < 2 {
            return;
        }
        for point in articulation_points(&adj) {
            if removal_disconnects(&adj, point, &required) {
                let (x, y, z) = candidates[point];
                for tile in &self.non_path_tiles {
                    propagator.ban(x, y, z, tile);
                }
            }
        }
    }
}

/// Like `Path`, but each path tile only connects to a neighbor through the
/// directions it declares as `exits`: an edge between two candidate cells
/// only counts toward connectivity if at least one still-possible path tile
/// at each endpoint offers a matching exit (a tile's exit in `dir` pairs
/// with a tile offering `topology.opposite(dir)` at the neighbor).
pub struct EdgedPath<T: Tile> {
    path_tiles: Vec<T>,
    non_path_tiles: Vec<T>,
    required: Vec<(u32, u32, u32)>,
    exits: HashMap<T, Vec<usize>>,
}

impl<T: Tile> EdgedPath<T> {
    pub fn new(path_tiles: Vec<T>, non_path_tiles: Vec<T>, required: Vec<(u32, u32, u32)>, exits: HashMap<T, Vec<usize>>) -> Self {
        Self { path_tiles, non_path_tiles, required, exits }
    }

    fn has_exit_toward(&self, propagator: &TilePropagator<T>, cell: (u32, u32, u32), dir: usize) -> bool {
        self.path_tiles.iter().any(|tile| {
            propagator.is_possible(cell.0, cell.1, cell.2, tile)
                && self.exits.get(tile).map_or(false, |dirs| dirs.contains(&dir))
        })
    }
}

impl<T: Tile> Constraint<T> for EdgedPath<T> {
    fn init(&mut self, propagator: &mut TilePropagator<T>) {
        self.check(propagator);
    }

    fn check(&mut self, propagator: &mut TilePropagator<T>) {
        let (candidates, index) = tile_space_candidates(propagator, &self.path_tiles);
        let topology = propagator.topology();
        let mut adj = vec![Vec::new(); candidates.len()];
        for (i, &cell) in candidates.iter().enumerate() {
            let cell_index = topology.index(cell.0, cell.1, cell.2);
            for dir in 0..topology.direction_set().len() {
                let Some(n) = topology.neighbor(cell_index, dir) else { continue };
                let neighbor_coord = topology.coords(n);
                let Some(&j) = index.get(&neighbor_coord) else { continue };
                let opposite = topology.opposite(dir);
                if self.has_exit_toward(propagator, cell, dir) && self.has_exit_toward(propagator, neighbor_coord, opposite) {
                    adj[i].push(j);
                }
            }
        }
        let required_indices: Vec<usize> = self.required.iter().filter_map(|c| index.get(c).copied()).collect();
        if required_indices.len() < 2 {
            return;
        }
        for point in articulation_points(&adj) {
            if removal_disconnects(&adj, point, &required_indices) {
                let (x, y, z) = candidates[point];
                for tile in &self.non_path_tiles {
                    propagator.ban(x, y, z, tile);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn constraint_tag_parses_known_tags() {
        assert_eq!(ConstraintTag::parse("path").unwrap(), ConstraintTag::Path);
        assert_eq!(ConstraintTag::parse("edgedPath").unwrap(), ConstraintTag::EdgedPath);
        assert_eq!(ConstraintTag::parse("mirror").unwrap(), ConstraintTag::Mirror);
    }

    #[test]
    fn constraint_tag_rejects_unknown() {
        assert!(matches!(ConstraintTag::parse("bogus"), Err(Error::UnknownConstraintTag { .. })));
    }

    #[test]
    fn side_membership() {
        assert!(Side::XMin.matches(0, 5, 0, (10, 10, 1)));
        assert!(!Side::XMin.matches(1, 5, 0, (10, 10, 1)));
        assert!(Side::XMax.matches(9, 5, 0, (10, 10, 1)));
    }

    #[test]
    fn articulation_points_on_a_path_graph() {
        // 0 - 1 - 2 - 3: the middle two nodes are cut vertices.
        let adj = vec![vec![1], vec![0, 2], vec![1, 3], vec![2]];
        let mut points = articulation_points(&adj);
        points.sort_unstable();
        assert_eq!(points, vec![1, 2]);
    }

    #[test]
    fn articulation_points_on_a_cycle_are_none() {
        // A 4-cycle has no cut vertices.
        let adj = vec![vec![1, 3], vec![0, 2], vec![1, 3], vec![2, 0]];
        assert!(articulation_points(&adj).is_empty());
    }

    #[test]
    fn removal_disconnects_detects_bridge_cut() {
        let adj = vec![vec![1], vec![0, 2], vec![1, 3], vec![2]];
        assert!(removal_disconnects(&adj, 1, &[0, 3]));
        assert!(!removal_disconnects(&adj, 0, &[1, 3]));
    }
}
