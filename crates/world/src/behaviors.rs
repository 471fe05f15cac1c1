//! Built-in scheduled-tick behaviours.
//!
//! Each behaviour runs when a block's scheduled tick fires and may rewrite
//! nearby blocks. Follow-up ticks come from the placement and neighbour hooks
//! that [`World::set_block`] runs. Neighbour iteration uses fixed orders so
//! replays stay deterministic.

use tracing::warn;
use voxsim_core::BlockPos;

use crate::{Voxel, World, BLOCK_LOG, BLOCK_WATER};

/// Highest flowing-liquid level; sources are level 0.
pub const MAX_LIQUID_LEVEL: u16 = 7;

const HORIZONTAL: [BlockPos; 4] = [
    BlockPos::new(0, 0, -1),
    BlockPos::new(1, 0, 0),
    BlockPos::new(0, 0, 1),
    BlockPos::new(-1, 0, 0),
];

fn is_air(world: &World, pos: BlockPos) -> bool {
    world.block(pos).is_some_and(|voxel| voxel.is_air())
}

/// Hook that queues the block's own tick, using its registered delay.
pub fn schedule_update(world: &mut World, pos: BlockPos) {
    world.schedule_block_update(pos);
}

/// Unsupported blocks move down one cell per tick until they land.
pub fn fall(world: &mut World, pos: BlockPos, voxel: Voxel) {
    let below = pos.below();
    if !is_air(world, below) {
        return;
    }
    if let Err(err) = world.set_block(pos, Voxel::AIR) {
        warn!(%pos, %err, "falling block could not leave its cell");
        return;
    }
    if let Err(err) = world.set_block(below, voxel) {
        warn!(%pos, %err, "falling block could not land; restoring it");
        if let Err(err) = world.set_block(pos, voxel) {
            warn!(%pos, %err, "falling block lost");
        }
    }
}

/// Liquid flows down first; otherwise it spreads sideways one level weaker.
pub fn spread_liquid(world: &mut World, pos: BlockPos, voxel: Voxel) {
    let below = pos.below();
    if is_air(world, below) {
        if let Err(err) = world.set_block(below, voxel) {
            warn!(pos = %below, %err, "liquid could not flow down");
        }
        return;
    }

    let level = voxel.state;
    if level >= MAX_LIQUID_LEVEL {
        return;
    }
    for offset in HORIZONTAL {
        let next = pos + offset;
        if !is_air(world, next) {
            continue;
        }
        let flowing = Voxel {
            id: BLOCK_WATER,
            state: level + 1,
        };
        if let Err(err) = world.set_block(next, flowing) {
            warn!(pos = %next, %err, "liquid could not spread");
        }
    }
}

/// A sapling with room above turns into a two-block trunk.
pub fn grow_sapling(world: &mut World, pos: BlockPos, _voxel: Voxel) {
    let above = pos.above();
    if !is_air(world, above) {
        world.schedule_block_update(pos);
        return;
    }
    for trunk in [pos, above] {
        if let Err(err) = world.set_block(trunk, Voxel::of(BLOCK_LOG)) {
            warn!(pos = %trunk, %err, "sapling could not grow");
            return;
        }
    }
}
