mod behaviors;
mod blocks;
mod chunk;
mod coord;
mod error;
mod follower;
mod pathfinding;
mod query;
mod storage;
mod ticks;
mod world;

pub use behaviors::*;
pub use blocks::*;
pub use chunk::*;
pub use coord::*;
pub use error::*;
pub use follower::*;
pub use pathfinding::*;
pub use query::*;
pub use storage::*;
pub use ticks::*;
pub use world::*;

pub use voxsim_core::{BlockPos, SimTick};
