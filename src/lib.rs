//! Wave Function Collapse: pattern compilation, the wave, arc-consistency
//! propagation, the constraint hook protocol, and the entropy-based
//! observer loop with chronological backtracking, all lifted to a
//! tile-space public API over 1D/2D/3D (and hex) topologies.
//!
//! See `DESIGN.md` in the crate root for how each module here relates to
//! the prior-art it was built from.

pub mod constraints;
pub mod error;
pub mod mapping;
pub mod overlapping;
pub mod pattern;
pub mod propagator;
pub mod retry;
pub mod rotation;
pub mod tile;
pub mod tile_model;
pub mod topology;
pub mod wave;

pub use error::{Error, UnrecoverableContradiction};
pub use pattern::PatternId;
pub use propagator::{Decoded, PropagatorOptions, Status, TilePropagator};
pub use rotation::{Rotation, RotatedTile, RotationGroup, TileRotation, Treatment};
pub use tile::Tile;
pub use tile_model::{SampleGrid, TileModel};
pub use topology::{DirectionSet, Periodicity, Topology};
