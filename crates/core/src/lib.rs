#![warn(missing_docs)]
//! Core primitives shared across the workspace.

pub mod pos;

use serde::{Deserialize, Serialize};

pub use pos::BlockPos;

/// Fixed tick type (20 TPS => 50 ms per tick).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SimTick(pub u64);

impl SimTick {
    /// First tick in any deterministic timeline.
    pub const ZERO: Self = Self(0);

    /// Advance by `delta` ticks.
    pub fn advance(self, delta: u64) -> Self {
        Self(self.0 + delta)
    }

    /// Ticks remaining until `target`, saturating at zero once it has passed.
    pub fn ticks_until(self, target: SimTick) -> u64 {
        target.0.saturating_sub(self.0)
    }
}
