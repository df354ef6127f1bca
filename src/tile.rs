//! The opaque tile values the rest of the crate is generic over.

use std::hash::Hash;

/// Bound satisfied by any type usable as a tile: compared and hashed by
/// value, and cheap to duplicate into the pattern tables built during
/// compilation.
pub trait Tile: Eq + Hash + Clone {}

impl<T: Eq + Hash + Clone> Tile for T {}
