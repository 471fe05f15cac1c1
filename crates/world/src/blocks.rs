//! Block ids and per-block simulation properties.

use std::collections::BTreeMap;
use std::fmt;

use voxsim_core::BlockPos;

use crate::{BlockId, Voxel, World};

/// Reserved ID for air.
pub const BLOCK_AIR: BlockId = 0;
pub const BLOCK_STONE: BlockId = 1;
pub const BLOCK_DIRT: BlockId = 2;
pub const BLOCK_GRASS: BlockId = 3;
/// Falls when unsupported.
pub const BLOCK_SAND: BlockId = 4;
/// Spreads into air below and beside it.
pub const BLOCK_WATER: BlockId = 5;
/// Grows into a two-block log trunk.
pub const BLOCK_SAPLING: BlockId = 6;
pub const BLOCK_LOG: BlockId = 7;

/// Update callback invoked when a scheduled tick for a block fires.
pub type BlockTickFn = fn(&mut World, BlockPos, Voxel);

/// Change callback: receives the position of the block being notified.
pub type BlockUpdateFn = fn(&mut World, BlockPos);

/// Properties of a block type.
#[derive(Clone)]
pub struct BlockProperties {
    /// Registry name.
    pub name: &'static str,

    /// Whether this block is solid (blocks movement, supports walkers).
    pub is_solid: bool,

    /// Schedule a zero-delay tick for every instance when its chunk loads.
    pub tick_on_load: bool,

    /// Default delay used when the block reschedules itself.
    pub tick_delay: u32,

    /// Scheduled-tick behaviour.
    pub on_tick: Option<BlockTickFn>,

    /// Runs after this block is placed through [`World::set_block`].
    pub on_added: Option<BlockUpdateFn>,

    /// Runs after a face neighbour of this block changes.
    pub on_neighbor_changed: Option<BlockUpdateFn>,
}

impl fmt::Debug for BlockProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockProperties")
            .field("name", &self.name)
            .field("is_solid", &self.is_solid)
            .field("tick_on_load", &self.tick_on_load)
            .field("tick_delay", &self.tick_delay)
            .field("ticks", &self.on_tick.is_some())
            .field("on_added", &self.on_added.is_some())
            .field("on_neighbor_changed", &self.on_neighbor_changed.is_some())
            .finish()
    }
}

impl BlockProperties {
    /// A solid block with no tick behaviour.
    pub fn solid(name: &'static str) -> Self {
        Self {
            name,
            is_solid: true,
            tick_on_load: false,
            tick_delay: 0,
            on_tick: None,
            on_added: None,
            on_neighbor_changed: None,
        }
    }

    /// A non-solid block with no tick behaviour.
    pub fn passable(name: &'static str) -> Self {
        Self {
            is_solid: false,
            ..Self::solid(name)
        }
    }

    /// Attach a tick behaviour with its reschedule delay.
    pub fn ticking(mut self, delay: u32, on_tick: BlockTickFn) -> Self {
        self.tick_delay = delay;
        self.on_tick = Some(on_tick);
        self
    }

    /// Mark the block as ticking once when its chunk loads.
    pub fn tick_on_load(mut self) -> Self {
        self.tick_on_load = true;
        self
    }

    pub fn on_added(mut self, hook: BlockUpdateFn) -> Self {
        self.on_added = Some(hook);
        self
    }

    pub fn on_neighbor_changed(mut self, hook: BlockUpdateFn) -> Self {
        self.on_neighbor_changed = Some(hook);
        self
    }
}

/// Lookup table from block id to properties.
///
/// Unknown ids are treated as solid and inert.
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    blocks: BTreeMap<BlockId, BlockProperties>,
    fallback: BlockProperties,
}

impl BlockRegistry {
    /// A registry containing only air.
    pub fn empty() -> Self {
        let mut blocks = BTreeMap::new();
        blocks.insert(BLOCK_AIR, BlockProperties::passable("air"));
        Self {
            blocks,
            fallback: BlockProperties::solid("unknown"),
        }
    }

    /// Register or replace a block definition.
    pub fn register(&mut self, id: BlockId, properties: BlockProperties) -> &mut Self {
        self.blocks.insert(id, properties);
        self
    }

    pub fn properties(&self, id: BlockId) -> &BlockProperties {
        self.blocks.get(&id).unwrap_or(&self.fallback)
    }

    #[inline]
    pub fn is_solid(&self, id: BlockId) -> bool {
        self.properties(id).is_solid
    }

    /// Resolve a block id by its registry name.
    pub fn id_by_name(&self, name: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .find(|(_, props)| props.name == name)
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Default for BlockRegistry {
    /// The built-in block set with its tick behaviours.
    fn default() -> Self {
        use crate::behaviors;

        let mut registry = Self::empty();
        registry
            .register(BLOCK_STONE, BlockProperties::solid("stone"))
            .register(BLOCK_DIRT, BlockProperties::solid("dirt"))
            .register(BLOCK_GRASS, BlockProperties::solid("grass"))
            .register(
                BLOCK_SAND,
                BlockProperties::solid("sand")
                    .ticking(2, behaviors::fall)
                    .tick_on_load()
                    .on_added(behaviors::schedule_update)
                    .on_neighbor_changed(behaviors::schedule_update),
            )
            .register(
                BLOCK_WATER,
                BlockProperties::passable("water")
                    .ticking(5, behaviors::spread_liquid)
                    .on_added(behaviors::schedule_update)
                    .on_neighbor_changed(behaviors::schedule_update),
            )
            .register(
                BLOCK_SAPLING,
                BlockProperties::passable("sapling")
                    .ticking(40, behaviors::grow_sapling)
                    .on_added(behaviors::schedule_update),
            )
            .register(BLOCK_LOG, BlockProperties::solid("log"));
        registry
    }
}
