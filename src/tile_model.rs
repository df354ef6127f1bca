//! The two ways of declaring which local tile configurations are legal:
//! explicit `Adjacent` rules, or `Overlapping` windows sampled from example
//! grids.

use crate::error::Error;
use crate::tile::Tile;
use hashbrown::HashMap;

/// A sample grid an `Overlapping` model extracts windows from.
#[derive(Debug, Clone)]
pub struct SampleGrid<T: Tile> {
    width: u32,
    height: u32,
    depth: u32,
    tiles: Vec<T>,
}

impl<T: Tile> SampleGrid<T> {
    pub fn new(width: u32, height: u32, depth: u32, tiles: Vec<T>) -> Self {
        debug_assert_eq!(tiles.len(), width as usize * height as usize * depth as usize);
        Self { width, height, depth, tiles }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn get(&self, x: u32, y: u32, z: u32) -> &T {
        let idx = (z as usize * self.height as usize + y as usize) * self.width as usize + x as usize;
        &self.tiles[idx]
    }
}

/// Either an `Adjacent` rule set or a set of `Overlapping` sample grids.
/// Pattern compilation (`pattern::compile_adjacent`, `overlapping::compile`)
/// turns either variant into a `CompiledModel`.
pub enum TileModel<T: Tile> {
    Adjacent {
        tiles: Vec<T>,
        frequency: HashMap<T, u32>,
        /// One entry per direction id of the target topology's `DirectionSet`.
        adjacency: Vec<Vec<(T, T)>>,
    },
    Overlapping {
        window: (u32, u32, u32),
        periodic_x: bool,
        periodic_y: bool,
        periodic_z: bool,
        samples: Vec<SampleGrid<T>>,
    },
}

impl<T: Tile> TileModel<T> {
    pub fn new_adjacent(
        tiles: Vec<T>,
        frequency: HashMap<T, u32>,
        adjacency: Vec<Vec<(T, T)>>,
    ) -> Result<Self, Error> {
        if tiles.is_empty() {
            return Err(Error::EmptyPatternSet);
        }
        Ok(TileModel::Adjacent { tiles, frequency, adjacency })
    }

    pub fn new_overlapping(
        window: (u32, u32, u32),
        periodic: (bool, bool, bool),
        samples: Vec<SampleGrid<T>>,
    ) -> Result<Self, Error> {
        let (n, m, l) = window;
        if n == 0 || m == 0 || l == 0 {
            return Err(Error::InvalidWindowSize { width: n, height: m, depth: l });
        }
        for sample in &samples {
            let too_small = (!periodic.0 && sample.width() < n)
                || (!periodic.1 && sample.height() < m)
                || (!periodic.2 && sample.depth() < l);
            if too_small {
                return Err(Error::SampleSmallerThanWindow {
                    sample_width: sample.width(),
                    sample_height: sample.height(),
                    sample_depth: sample.depth(),
                    window_width: n,
                    window_height: m,
                    window_depth: l,
                });
            }
        }
        if samples.is_empty() {
            return Err(Error::EmptyPatternSet);
        }
        Ok(TileModel::Overlapping {
            window,
            periodic_x: periodic.0,
            periodic_y: periodic.1,
            periodic_z: periodic.2,
            samples,
        })
    }
}
