//! Outer-level retry strategies that restart a `TilePropagator` from
//! scratch (a fresh wave, re-running constraint `init`) when backtracking
//! is exhausted and `run()` reports `Status::Contradiction`.
//!
//! This is the coarser-grained complement to in-run backtracking
//! (`TilePropagator::backtrack`): where backtracking undoes one decision at
//! a time, these restart everything, the way `wfc/src/retry.rs`'s
//! `Forever`/`NumTimes` restarted the whole `Wave`/`Context` on a
//! `PropagateError`. That module's parallel `ParNumTimes` (rayon-backed,
//! races several retries across threads) is dropped: §1's non-goals rule
//! out parallel search outright, and a racing retry strategy has no other
//! purpose (see DESIGN.md).

use crate::error::UnrecoverableContradiction;
use crate::propagator::{Status, TilePropagator};
use crate::tile::Tile;
use rand::Rng;

/// A strategy for retrying a `TilePropagator::run` that ended in
/// `Status::Contradiction`, by calling `clear()` and running again.
pub trait Retry<T: Tile> {
    type Return;
    fn retry(&mut self, propagator: &mut TilePropagator<T>, rng: &mut impl Rng) -> Self::Return;
}

/// Retries indefinitely until a `Decided` wave is found.
#[derive(Debug, Clone, Copy, Default)]
pub struct Forever;

impl<T: Tile> Retry<T> for Forever {
    type Return = ();

    fn retry(&mut self, propagator: &mut TilePropagator<T>, rng: &mut impl Rng) {
        loop {
            match propagator.run(rng) {
                Status::Decided => return,
                Status::Contradiction => propagator.clear(rng),
                Status::Undecided => unreachable!("run() always returns a terminal status"),
            }
        }
    }
}

/// Retries up to a fixed number of additional times, giving up with
/// `UnrecoverableContradiction` if none of them decide the wave.
#[derive(Debug, Clone, Copy)]
pub struct NumTimes(pub usize);

impl<T: Tile> Retry<T> for NumTimes {
    type Return = Result<(), UnrecoverableContradiction>;

    fn retry(&mut self, propagator: &mut TilePropagator<T>, rng: &mut impl Rng) -> Self::Return {
        loop {
            match propagator.run(rng) {
                Status::Decided => return Ok(()),
                Status::Contradiction => {
                    if self.0 == 0 {
                        return Err(UnrecoverableContradiction);
                    }
                    self.0 -= 1;
                    propagator.clear(rng);
                }
                Status::Undecided => unreachable!("run() always returns a terminal status"),
            }
        }
    }
}
