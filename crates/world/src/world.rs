//! World driver: chunk table, block registry and the scheduled-tick loop.

use serde::{Deserialize, Serialize};
use tracing::debug;
use voxsim_core::{BlockPos, SimTick};

use crate::coord::is_legal_y;
use crate::{
    BlockId, BlockQuery, BlockRegistry, Chunk, ChunkHandle, ChunkPos, ChunkStorage,
    PackedBlockPos, TickScheduler, Voxel, WorldError,
};

/// World-level tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Maximum number of resident chunks before LRU eviction.
    pub chunk_capacity: usize,
    /// Chunk radius loaded around the origin by drivers that pre-load terrain.
    pub view_radius: i32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: 64,
            view_radius: 2,
        }
    }
}

/// Scheduled-tick tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Cap on due entries processed in one simulation step.
    pub max_ticks_per_step: usize,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            max_ticks_per_step: 65_536,
        }
    }
}

/// Summary of one simulation step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepStats {
    /// Tick that was simulated.
    pub tick: SimTick,
    /// Entries whose tick behaviour ran.
    pub fired: usize,
    /// Due entries dropped (chunk gone, block changed, or no behaviour).
    pub skipped: usize,
    /// Entries still queued after the step.
    pub pending: usize,
    /// Resident chunks whose voxels changed since the previous step.
    pub chunks_modified: usize,
}

/// Owns the loaded chunks and drives scheduled block updates.
pub struct World {
    storage: ChunkStorage,
    registry: BlockRegistry,
    scheduler: TickScheduler,
    ticks: TickConfig,
}

impl World {
    pub fn new(registry: BlockRegistry, config: WorldConfig, ticks: TickConfig) -> Self {
        Self {
            storage: ChunkStorage::new(config.chunk_capacity),
            registry,
            scheduler: TickScheduler::new(),
            ticks,
        }
    }

    /// Current simulation tick.
    pub fn now(&self) -> SimTick {
        self.scheduler.now()
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn storage(&self) -> &ChunkStorage {
        &self.storage
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut TickScheduler {
        &mut self.scheduler
    }

    /// Make a chunk resident and queue its load-time block ticks.
    pub fn load_chunk(&mut self, chunk: Chunk) -> ChunkHandle {
        let on_load: Vec<(BlockPos, BlockId)> = chunk
            .iter_blocks()
            .filter(|(_, voxel)| self.registry.properties(voxel.id).tick_on_load)
            .map(|(pos, voxel)| (pos, voxel.id))
            .collect();
        let position = chunk.position();
        let handle = self.storage.insert(chunk);
        for (pos, id) in &on_load {
            self.scheduler.schedule_unique(*id, *pos, 0);
        }
        debug!(%position, load_ticks = on_load.len(), "chunk ready");
        handle
    }

    /// Drop a chunk. Pending ticks inside it are skipped when they fall due.
    pub fn unload_chunk(&mut self, pos: ChunkPos) -> Option<Chunk> {
        self.storage.unload(pos)
    }

    /// Pack `pos` against its resident chunk.
    pub fn locate(&self, pos: BlockPos) -> Result<PackedBlockPos, WorldError> {
        if !is_legal_y(pos.y) {
            return Err(WorldError::OutOfBounds(pos));
        }
        let chunk = ChunkPos::containing(pos);
        let handle = self
            .storage
            .handle(chunk)
            .ok_or(WorldError::ChunkNotLoaded(chunk))?;
        Ok(PackedBlockPos::pack(pos, Some(handle)))
    }

    /// Read the voxel a packed key points at.
    pub fn block_at(&self, key: PackedBlockPos) -> Result<Voxel, WorldError> {
        let handle = key.chunk().ok_or(WorldError::Unattached)?;
        let chunk = self
            .storage
            .resolve(handle)
            .ok_or(WorldError::StaleHandle)?;
        Ok(chunk.voxel_packed(key))
    }

    /// Write the voxel a packed key points at, returning the previous one.
    ///
    /// This is a raw write: no block hooks run.
    pub fn set_block_at(&mut self, key: PackedBlockPos, voxel: Voxel) -> Result<Voxel, WorldError> {
        let handle = key.chunk().ok_or(WorldError::Unattached)?;
        let chunk = self
            .storage
            .resolve_mut(handle)
            .ok_or(WorldError::StaleHandle)?;
        Ok(chunk.set_voxel_packed(key, voxel))
    }

    /// Voxel at a world position, or `None` outside loaded terrain.
    pub fn block(&self, pos: BlockPos) -> Option<Voxel> {
        self.locate(pos).and_then(|key| self.block_at(key)).ok()
    }

    /// Write a voxel at a world position, returning the previous one.
    ///
    /// When the voxel actually changes, the new block's `on_added` hook runs
    /// (if its id changed) followed by `on_neighbor_changed` for each loaded
    /// face neighbour, in [`BlockPos::FACE_OFFSETS`] order.
    pub fn set_block(&mut self, pos: BlockPos, voxel: Voxel) -> Result<Voxel, WorldError> {
        let key = self.locate(pos)?;
        let previous = self.set_block_at(key, voxel)?;
        if previous != voxel {
            self.notify_changed(pos, previous, voxel);
        }
        Ok(previous)
    }

    fn notify_changed(&mut self, pos: BlockPos, previous: Voxel, voxel: Voxel) {
        if previous.id != voxel.id {
            if let Some(on_added) = self.registry.properties(voxel.id).on_added {
                on_added(self, pos);
            }
        }
        for offset in BlockPos::FACE_OFFSETS {
            let neighbour = pos + offset;
            let Some(block) = self.block(neighbour) else {
                continue;
            };
            if let Some(on_changed) = self.registry.properties(block.id).on_neighbor_changed {
                on_changed(self, neighbour);
            }
        }
    }

    /// Queue a tick for `block_id` at `pos`, ignoring exact duplicates.
    pub fn schedule_tick(&mut self, pos: BlockPos, block_id: BlockId, delay: u32) -> bool {
        self.scheduler.schedule_unique(block_id, pos, delay)
    }

    /// Queue a tick for whatever block is at `pos`, using its registered delay.
    ///
    /// Does nothing for unloaded positions or blocks without tick behaviour.
    pub fn schedule_block_update(&mut self, pos: BlockPos) -> bool {
        let Some(voxel) = self.block(pos) else {
            return false;
        };
        let props = self.registry.properties(voxel.id);
        if props.on_tick.is_none() {
            return false;
        }
        let delay = props.tick_delay;
        self.schedule_tick(pos, voxel.id, delay)
    }

    /// Advance one tick and run every scheduled update that is now due.
    ///
    /// An update only runs if the block at its position still has the
    /// scheduled identity. Zero-delay updates queued by a behaviour run in the
    /// same step, bounded by [`TickConfig::max_ticks_per_step`].
    pub fn step(&mut self) -> StepStats {
        let tick = self.scheduler.advance();
        let mut stats = StepStats {
            tick,
            ..StepStats::default()
        };

        let mut processed = 0;
        while processed < self.ticks.max_ticks_per_step {
            let Some(entry) = self.scheduler.pop_due() else {
                break;
            };
            processed += 1;

            let behaviour = self
                .block(entry.pos)
                .filter(|voxel| voxel.id == entry.block_id)
                .and_then(|voxel| {
                    self.registry
                        .properties(voxel.id)
                        .on_tick
                        .map(|on_tick| (on_tick, voxel))
                });
            match behaviour {
                Some((on_tick, voxel)) => {
                    on_tick(self, entry.pos, voxel);
                    stats.fired += 1;
                }
                None => stats.skipped += 1,
            }
        }

        stats.pending = self.scheduler.len();
        stats.chunks_modified = self.storage.take_dirty().len();
        if processed > 0 {
            debug!(
                tick = tick.0,
                fired = stats.fired,
                skipped = stats.skipped,
                pending = stats.pending,
                chunks_modified = stats.chunks_modified,
                "block ticks processed"
            );
        }
        stats
    }
}

impl BlockQuery for World {
    fn is_solid(&self, pos: BlockPos) -> bool {
        self.block(pos)
            .is_some_and(|voxel| self.registry.is_solid(voxel.id))
    }

    fn is_passable(&self, pos: BlockPos) -> bool {
        self.block(pos)
            .is_some_and(|voxel| !self.registry.is_solid(voxel.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BLOCK_SAND, BLOCK_STONE, BLOCK_WATER};

    fn world() -> World {
        World::new(
            BlockRegistry::default(),
            WorldConfig::default(),
            TickConfig::default(),
        )
    }

    #[test]
    fn block_access_goes_through_packed_keys() {
        let mut world = world();
        world.load_chunk(Chunk::new(ChunkPos::new(2, -1)));
        let pos = BlockPos::new(35, 64, -6);

        let key = world.locate(pos).expect("chunk loaded");
        assert_eq!(key.resolve(world.storage()), Some(pos));

        world.set_block(pos, Voxel::of(BLOCK_STONE)).expect("set");
        assert_eq!(world.block(pos), Some(Voxel::of(BLOCK_STONE)));
        assert!(world.is_solid(pos));
        assert!(!world.is_passable(pos));
    }

    #[test]
    fn unloaded_positions_are_neither_solid_nor_passable() {
        let world = world();
        let pos = BlockPos::new(0, 10, 0);
        assert_eq!(
            world.locate(pos),
            Err(WorldError::ChunkNotLoaded(ChunkPos::new(0, 0)))
        );
        assert!(!world.is_solid(pos));
        assert!(!world.is_passable(pos));
    }

    #[test]
    fn stale_key_is_rejected_after_unload() {
        let mut world = world();
        world.load_chunk(Chunk::new(ChunkPos::new(0, 0)));
        let key = world.locate(BlockPos::new(1, 1, 1)).expect("loaded");
        world.unload_chunk(ChunkPos::new(0, 0));
        world.load_chunk(Chunk::new(ChunkPos::new(0, 0)));
        assert_eq!(world.block_at(key), Err(WorldError::StaleHandle));
    }

    #[test]
    fn tick_is_skipped_when_block_changed() {
        let mut world = world();
        world.load_chunk(Chunk::new(ChunkPos::new(0, 0)));
        let pos = BlockPos::new(4, 10, 4);
        world.set_block(pos, Voxel::of(BLOCK_STONE)).expect("set");
        world.schedule_tick(pos, BLOCK_SAND, 0);

        let stats = world.step();
        assert_eq!(stats.fired, 0);
        assert_eq!(stats.skipped, 1);
        assert_eq!(world.block(pos), Some(Voxel::of(BLOCK_STONE)));
    }

    #[test]
    fn sand_ticks_on_load_and_falls() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        chunk.fill_layer(0, Voxel::of(BLOCK_STONE));
        chunk.set_voxel(3, 4, 3, Voxel::of(BLOCK_SAND));

        let mut world = world();
        world.load_chunk(chunk);
        assert_eq!(world.scheduler().len(), 1);

        for _ in 0..20 {
            world.step();
        }
        let base = crate::WORLD_MIN_Y;
        assert_eq!(world.block(BlockPos::new(3, base + 1, 3)), Some(Voxel::of(BLOCK_SAND)));
        assert_eq!(world.block(BlockPos::new(3, base + 4, 3)), Some(Voxel::AIR));
        assert!(world.scheduler().is_empty());
    }

    #[test]
    fn placing_water_schedules_its_own_spread() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        chunk.fill_layer(0, Voxel::of(BLOCK_STONE));
        let mut world = world();
        world.load_chunk(chunk);

        let source = BlockPos::new(8, crate::WORLD_MIN_Y + 1, 8);
        world.set_block(source, Voxel::of(BLOCK_WATER)).expect("set");
        assert!(world.scheduler().is_scheduled(source, BLOCK_WATER));
        for _ in 0..5 {
            world.step();
        }
        let east = BlockPos::new(9, crate::WORLD_MIN_Y + 1, 8);
        assert_eq!(world.block(east), Some(Voxel { id: BLOCK_WATER, state: 1 }));
    }

    #[test]
    fn packed_writes_skip_hooks() {
        let mut world = world();
        world.load_chunk(Chunk::new(ChunkPos::new(0, 0)));
        let key = world.locate(BlockPos::new(2, 40, 2)).expect("loaded");
        world.set_block_at(key, Voxel::of(BLOCK_SAND)).expect("set");
        assert!(world.scheduler().is_empty());
    }

    #[test]
    fn step_counts_modified_chunks() {
        let mut world = world();
        for cx in 0..3 {
            let mut chunk = Chunk::new(ChunkPos::new(cx, 0));
            chunk.fill_layer(0, Voxel::of(BLOCK_STONE));
            world.load_chunk(chunk);
        }
        assert_eq!(world.step().chunks_modified, 0);

        world.set_block(BlockPos::new(1, 10, 1), Voxel::of(BLOCK_STONE)).expect("set");
        world.set_block(BlockPos::new(33, 10, 1), Voxel::of(BLOCK_STONE)).expect("set");
        world.set_block(BlockPos::new(34, 10, 1), Voxel::of(BLOCK_STONE)).expect("set");
        assert_eq!(world.step().chunks_modified, 2);
        assert_eq!(world.step().chunks_modified, 0);
    }

    #[test]
    fn step_cap_defers_remaining_entries() {
        let mut world = World::new(
            BlockRegistry::default(),
            WorldConfig::default(),
            TickConfig {
                max_ticks_per_step: 2,
            },
        );
        world.load_chunk(Chunk::new(ChunkPos::new(0, 0)));
        for x in 0..5 {
            world.schedule_tick(BlockPos::new(x, 1, 0), BLOCK_SAND, 0);
        }
        let stats = world.step();
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.pending, 3);
    }
}
