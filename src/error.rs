//! Crate-level error type.
//!
//! Every fallible constructor in this crate (tile models, rotation tables,
//! the tile propagator itself) returns `Result<_, Error>`. Invariant
//! violations that indicate a bug in this crate rather than a malformed
//! caller input are not represented here; they fail fast via `panic!`/
//! `debug_assert!` at the point of detection (see `LogicError` in the
//! module docs for `propagator`).

use std::fmt;

/// The axis or direction name a caller referenced that doesn't exist in the
/// topology's direction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownDirection(pub(crate) &'static str);

impl fmt::Display for UnknownDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "direction {:?} is not part of this topology's direction set", self.0)
    }
}

/// Errors raised while constructing a tile model, rotation table, topology
/// or propagator. All of these are detected at construction time, before
/// any propagation happens.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("pattern compilation produced zero patterns: no solution is possible with this model")]
    EmptyPatternSet,

    #[error("overlapping window size must be at least 1 in every dimension, got {width}x{height}x{depth}")]
    InvalidWindowSize {
        width: u32,
        height: u32,
        depth: u32,
    },

    #[error("sample grid ({sample_width}x{sample_height}x{sample_depth}) is smaller than the overlapping window ({window_width}x{window_height}x{window_depth}) along a non-periodic axis")]
    SampleSmallerThanWindow {
        sample_width: u32,
        sample_height: u32,
        sample_depth: u32,
        window_width: u32,
        window_height: u32,
        window_depth: u32,
    },

    #[error("{0}")]
    UnknownDirection(#[from] UnknownDirection),

    #[error("unknown tile referenced in {context}")]
    UnknownTile { context: &'static str },

    #[error("tile rotation treatment is `Missing` for tile at rotation {rotation:?}, and no transform was registered")]
    MissingRotation { rotation: crate::rotation::Rotation },

    #[error("topology dimensions must be non-zero in every axis, got {width}x{height}x{depth}")]
    EmptyTopology {
        width: u32,
        height: u32,
        depth: u32,
    },

    #[error("constraint factory received unknown type tag {tag:?}")]
    UnknownConstraintTag { tag: String },

    #[error("rotational symmetry must be 1, 2 or 4, got {0}")]
    InvalidRotationalSymmetry(u32),

    #[error("adjacency table has {actual} direction(s) but the topology's direction set has {expected}")]
    AdjacencyDirectionCountMismatch { expected: usize, actual: usize },
}

/// Returned by `TilePropagator::run`/`collapse_retrying` when backtracking
/// (or the outer retry loop) is exhausted without finding a consistent
/// assignment. This is terminal: the caller must retry with a different
/// random seed or a different configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("backtracking exhausted without resolving the contradiction")]
pub struct UnrecoverableContradiction;
