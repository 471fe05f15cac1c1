use std::fmt;

use voxsim_core::BlockPos;

use crate::coord::{PackedBlockPos, WORLD_MIN_Y};

/// Chunk width (X axis) in voxels.
pub const CHUNK_SIZE_X: usize = 16;
/// Chunk height (Y axis) in voxels.
pub const CHUNK_SIZE_Y: usize = 256;
/// Chunk depth (Z axis) in voxels.
pub const CHUNK_SIZE_Z: usize = 16;
/// Total voxel count per chunk.
pub const CHUNK_VOLUME: usize = CHUNK_SIZE_X * CHUNK_SIZE_Y * CHUNK_SIZE_Z;

/// Block identifier referencing the registry.
pub type BlockId = u16;
/// Block state metadata bits.
pub type BlockState = u16;

/// Chunk-local position (X, Y, Z) with Y already offset by the world floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalPos {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl LocalPos {
    /// Convert to a linear index within the voxel array.
    pub fn index(self) -> usize {
        debug_assert!(self.x < CHUNK_SIZE_X);
        debug_assert!(self.y < CHUNK_SIZE_Y);
        debug_assert!(self.z < CHUNK_SIZE_Z);
        (self.y * CHUNK_SIZE_Z + self.z) * CHUNK_SIZE_X + self.x
    }

    /// Inverse of [`LocalPos::index`].
    pub fn from_index(index: usize) -> Self {
        Self {
            x: index % CHUNK_SIZE_X,
            z: (index / CHUNK_SIZE_X) % CHUNK_SIZE_Z,
            y: index / (CHUNK_SIZE_X * CHUNK_SIZE_Z),
        }
    }
}

/// Chunk coordinate (X,Z) in chunk space.
/// Implements Ord for deterministic iteration in BTreeMap/BTreeSet (sorts by x, then z).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The chunk owning a world-space block.
    pub const fn containing(pos: BlockPos) -> Self {
        Self::new(pos.x >> 4, pos.z >> 4)
    }

    /// World-space X of the chunk's first column.
    #[inline]
    pub const fn origin_x(self) -> i32 {
        self.x << 4
    }

    /// World-space Z of the chunk's first column.
    #[inline]
    pub const fn origin_z(self) -> i32 {
        self.z << 4
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Per-voxel data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Voxel {
    pub id: BlockId,
    pub state: BlockState,
}

impl Voxel {
    pub const AIR: Self = Self { id: 0, state: 0 };

    pub const fn of(id: BlockId) -> Self {
        Self { id, state: 0 }
    }

    #[inline]
    pub fn is_air(&self) -> bool {
        self.id == Self::AIR.id
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    /// Dirty flags set whenever chunk data changes.
    pub struct DirtyFlags: u8 {
        /// A voxel changed to a different block id.
        const BLOCKS = 0b0000_0001;
        /// A voxel kept its id but changed state bits.
        const STATES = 0b0000_0010;
    }
}

impl Default for DirtyFlags {
    fn default() -> Self {
        DirtyFlags::empty()
    }
}

/// Chunk storing a column of voxels plus dirty flags.
pub struct Chunk {
    position: ChunkPos,
    voxels: Vec<Voxel>,
    dirty: DirtyFlags,
}

impl Chunk {
    /// Allocate a fresh chunk filled with air.
    pub fn new(position: ChunkPos) -> Self {
        Self {
            position,
            voxels: vec![Voxel::AIR; CHUNK_VOLUME],
            dirty: DirtyFlags::empty(),
        }
    }

    #[inline]
    pub fn position(&self) -> ChunkPos {
        self.position
    }

    fn index(x: usize, y: usize, z: usize) -> usize {
        LocalPos { x, y, z }.index()
    }

    /// Fetch a voxel copy by local coordinates.
    pub fn voxel(&self, x: usize, y: usize, z: usize) -> Voxel {
        self.voxels[Self::index(x, y, z)]
    }

    /// Set a voxel by local coordinates and mark the relevant dirty flags.
    pub fn set_voxel(&mut self, x: usize, y: usize, z: usize, voxel: Voxel) {
        self.write(Self::index(x, y, z), voxel);
    }

    /// Fetch a voxel addressed by a packed chunk-relative key.
    pub fn voxel_packed(&self, key: PackedBlockPos) -> Voxel {
        self.voxels[key.storage_index()]
    }

    /// Set a voxel addressed by a packed chunk-relative key.
    ///
    /// Returns the previous voxel.
    pub fn set_voxel_packed(&mut self, key: PackedBlockPos, voxel: Voxel) -> Voxel {
        let idx = key.storage_index();
        let previous = self.voxels[idx];
        self.write(idx, voxel);
        previous
    }

    fn write(&mut self, idx: usize, voxel: Voxel) {
        let previous = self.voxels[idx];
        if previous == voxel {
            return;
        }
        self.voxels[idx] = voxel;
        if previous.id != voxel.id {
            self.dirty.insert(DirtyFlags::BLOCKS);
        } else {
            self.dirty.insert(DirtyFlags::STATES);
        }
    }

    /// Fill a horizontal layer (local Y) with one voxel.
    pub fn fill_layer(&mut self, y: usize, voxel: Voxel) {
        for z in 0..CHUNK_SIZE_Z {
            for x in 0..CHUNK_SIZE_X {
                self.set_voxel(x, y, z, voxel);
            }
        }
    }

    /// Iterate non-air voxels with their world-space positions, in storage order.
    pub fn iter_blocks(&self) -> impl Iterator<Item = (BlockPos, Voxel)> + '_ {
        let origin_x = self.position.origin_x();
        let origin_z = self.position.origin_z();
        self.voxels
            .iter()
            .enumerate()
            .filter(|(_, voxel)| !voxel.is_air())
            .map(move |(idx, voxel)| {
                let local = LocalPos::from_index(idx);
                let pos = BlockPos::new(
                    origin_x | local.x as i32,
                    local.y as i32 + WORLD_MIN_Y,
                    origin_z | local.z as i32,
                );
                (pos, *voxel)
            })
    }

    /// Flags raised since the last [`Chunk::take_dirty_flags`].
    pub fn dirty_flags(&self) -> DirtyFlags {
        self.dirty
    }

    /// Consume and return the current dirty flags.
    pub fn take_dirty_flags(&mut self) -> DirtyFlags {
        let flags = self.dirty;
        self.dirty = DirtyFlags::empty();
        flags
    }
}
