//! The symmetry group used to expand declared adjacencies and sampled
//! patterns, and the partial map from (tile, rotation) to tile used to
//! apply it to concrete tiles.

use crate::error::Error;
use hashbrown::HashMap;
use std::hash::Hash;

/// One element of the dihedral symmetry group of the square: a number of
/// quarter turns plus an optional reflection, applied reflection-then-turns.
///
/// `smallest angle = 360 / rotationalSymmetry` from the spec corresponds to
/// `turns == 1` in a group built with that `rotationalSymmetry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rotation {
    turns: u8,
    reflected: bool,
}

impl Rotation {
    pub const IDENTITY: Rotation = Rotation { turns: 0, reflected: false };

    pub fn new(turns: u8, reflected: bool) -> Self {
        Self { turns: turns % 4, reflected }
    }

    pub fn angle_degrees(self) -> u32 {
        self.turns as u32 * 90
    }

    pub fn is_reflected(self) -> bool {
        self.reflected
    }

    pub fn turns(self) -> u8 {
        self.turns
    }

    /// Compose two rotations: `self.compose(other)` applies `other` first,
    /// then `self` (ordinary function-composition order).
    pub fn compose(self, other: Rotation) -> Rotation {
        let (k1, e1) = (other.turns as i32, other.reflected);
        let (k2, e2) = (self.turns as i32, self.reflected);
        let new_turns = if e2 {
            (k2 + (4 - k1) % 4).rem_euclid(4)
        } else {
            (k2 + k1).rem_euclid(4)
        };
        Rotation {
            turns: new_turns as u8,
            reflected: e1 ^ e2,
        }
    }

    pub fn inverse(self) -> Rotation {
        if self.reflected {
            self
        } else {
            Rotation { turns: (4 - self.turns) % 4, reflected: false }
        }
    }
}

/// The finite symmetry group parameterized by `rotationalSymmetry` and
/// `reflectionalSymmetry`. Group size is one of `{1, 2, 4, 8}`.
#[derive(Debug, Clone, Copy)]
pub struct RotationGroup {
    rotational_symmetry: u32,
    reflectional_symmetry: bool,
}

impl RotationGroup {
    pub fn new(rotational_symmetry: u32, reflectional_symmetry: bool) -> Result<Self, Error> {
        if !matches!(rotational_symmetry, 1 | 2 | 4) {
            return Err(Error::InvalidRotationalSymmetry(rotational_symmetry));
        }
        Ok(Self { rotational_symmetry, reflectional_symmetry })
    }

    pub fn smallest_angle(&self) -> u32 {
        360 / self.rotational_symmetry
    }

    pub fn len(&self) -> usize {
        self.rotational_symmetry as usize * if self.reflectional_symmetry { 2 } else { 1 }
    }

    fn allowed_turns(&self) -> &'static [u8] {
        match self.rotational_symmetry {
            1 => &[0],
            2 => &[0, 2],
            4 => &[0, 1, 2, 3],
            _ => unreachable!("validated in new()"),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Rotation> + '_ {
        let reflections: &[bool] = if self.reflectional_symmetry { &[false, true] } else { &[false] };
        self.allowed_turns()
            .iter()
            .flat_map(move |&turns| reflections.iter().map(move |&r| Rotation::new(turns, r)))
    }

    pub fn contains(&self, rotation: Rotation) -> bool {
        if rotation.reflected && !self.reflectional_symmetry {
            return false;
        }
        self.allowed_turns().contains(&rotation.turns)
    }
}

/// What happens when a `(Tile, Rotation)` pair has no registered transform
/// in a `TileRotation` map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Treatment {
    /// The tile is unaffected by the rotation; it maps to itself.
    Unchanged,
    /// The rotation cannot be applied to this tile; fails with `Error::MissingRotation`.
    Missing,
    /// Synthesize a `RotatedTile(base, rotation)` value standing in for the
    /// (otherwise unknown) rotated tile.
    Generated,
}

/// A user-facing tile, or a rotated variant of one synthesized because no
/// explicit transform was registered for it (see `Treatment::Generated`).
///
/// Modeled as a tagged sum rather than via inheritance per the spec's design
/// notes: equality and hashing must descend into both variants, which
/// `#[derive(PartialEq, Eq, Hash)]` gives us for free as long as `T` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotatedTile<T> {
    Base(T),
    Rotated(T, Rotation),
}

impl<T> RotatedTile<T> {
    pub fn base(&self) -> &T {
        match self {
            RotatedTile::Base(t) => t,
            RotatedTile::Rotated(t, _) => t,
        }
    }

    pub fn rotation(&self) -> Rotation {
        match self {
            RotatedTile::Base(_) => Rotation::IDENTITY,
            RotatedTile::Rotated(_, r) => *r,
        }
    }
}

/// A partial map `(Tile, Rotation) -> Tile`, with a default `Treatment` for
/// pairs it doesn't cover.
pub struct TileRotation<T: Eq + Hash + Clone> {
    map: HashMap<(T, Rotation), T>,
    default_treatment: Treatment,
    per_tile_treatment: HashMap<T, Treatment>,
}

impl<T: Eq + Hash + Clone> TileRotation<T> {
    pub fn builder(default_treatment: Treatment) -> TileRotationBuilder<T> {
        TileRotationBuilder {
            map: HashMap::new(),
            default_treatment,
            per_tile_treatment: HashMap::new(),
        }
    }

    fn treatment_for(&self, tile: &T) -> Treatment {
        self.per_tile_treatment.get(tile).copied().unwrap_or(self.default_treatment)
    }

    /// Apply `rotation` to `tile`, following the registered transform if
    /// present, or the tile's (or the default) `Treatment` otherwise.
    pub fn apply(&self, tile: &T, rotation: Rotation) -> Result<RotatedTile<T>, Error>
    where
        T: std::fmt::Debug,
    {
        if rotation == Rotation::IDENTITY {
            return Ok(RotatedTile::Base(tile.clone()));
        }
        if let Some(mapped) = self.map.get(&(tile.clone(), rotation)) {
            return Ok(RotatedTile::Base(mapped.clone()));
        }
        match self.treatment_for(tile) {
            Treatment::Unchanged => Ok(RotatedTile::Base(tile.clone())),
            Treatment::Missing => Err(Error::MissingRotation { rotation }),
            Treatment::Generated => Ok(RotatedTile::Rotated(tile.clone(), rotation)),
        }
    }

    /// Reduce a `RotatedTile` to its canonical representative: a
    /// `RotatedTile::Rotated(base, r)` canonicalizes to `Base(mapped)` if an
    /// explicit transform for `(base, r)` exists or `Treatment::Unchanged`
    /// applies; otherwise it is already canonical.
    pub fn canonicalize(&self, tile: &RotatedTile<T>) -> RotatedTile<T>
    where
        T: std::fmt::Debug,
    {
        match tile {
            RotatedTile::Base(_) => tile.clone(),
            RotatedTile::Rotated(base, rotation) => {
                if let Some(mapped) = self.map.get(&(base.clone(), *rotation)) {
                    RotatedTile::Base(mapped.clone())
                } else if self.treatment_for(base) == Treatment::Unchanged {
                    RotatedTile::Base(base.clone())
                } else {
                    tile.clone()
                }
            }
        }
    }
}

/// Builder for `TileRotation`, matching the spec's configuration-driven
/// construction surface: rotational/reflectional symmetry is decided by the
/// caller's `RotationGroup`; this builder only owns the per-tile transform
/// overrides and treatments.
pub struct TileRotationBuilder<T: Eq + Hash + Clone> {
    map: HashMap<(T, Rotation), T>,
    default_treatment: Treatment,
    per_tile_treatment: HashMap<T, Treatment>,
}

impl<T: Eq + Hash + Clone> TileRotationBuilder<T> {
    pub fn with_transform(mut self, tile: T, rotation: Rotation, result: T) -> Self {
        self.map.insert((tile, rotation), result);
        self
    }

    pub fn with_treatment(mut self, tile: T, treatment: Treatment) -> Self {
        self.per_tile_treatment.insert(tile, treatment);
        self
    }

    pub fn build(self) -> TileRotation<T> {
        TileRotation {
            map: self.map,
            default_treatment: self.default_treatment,
            per_tile_treatment: self.per_tile_treatment,
        }
    }
}
