//! Packed chunk-relative block coordinates.
//!
//! A block inside a chunk is addressed by a 16-bit key: the low byte holds the
//! local X (bits 0-3) and local Z (bits 4-7), the high byte holds the full Y.
//! The key optionally carries a [`ChunkHandle`] naming the owning chunk, which
//! is enough to reconstruct the world-space position.
//!
//! The legal vertical range is a single build-wide constant. The default build
//! uses `0..=255`; enabling the `signed-y` feature switches to `-128..=127`.
//! Y is stored as its low eight bits in both cases and decoded back into the
//! configured range, so packing is bit-exact for every legal input.

use std::fmt;

use voxsim_core::BlockPos;

use crate::{ChunkHandle, ChunkPos, ChunkStorage};

/// Lowest legal block Y.
#[cfg(not(feature = "signed-y"))]
pub const WORLD_MIN_Y: i32 = 0;
/// Lowest legal block Y.
#[cfg(feature = "signed-y")]
pub const WORLD_MIN_Y: i32 = -128;

/// Highest legal block Y.
pub const WORLD_MAX_Y: i32 = WORLD_MIN_Y + 255;

const LOCAL_MASK: i32 = 0xF;

/// Whether `y` lies inside the build's vertical range.
#[inline]
pub const fn is_legal_y(y: i32) -> bool {
    y >= WORLD_MIN_Y && y <= WORLD_MAX_Y
}

/// A block position packed relative to its owning chunk.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedBlockPos {
    index: u16,
    chunk: Option<ChunkHandle>,
}

impl PackedBlockPos {
    /// Pack a world position, keeping the low four bits of X and Z and the full Y.
    ///
    /// Callers must clamp Y into [`WORLD_MIN_Y`]..=[`WORLD_MAX_Y`] first.
    pub fn pack(pos: BlockPos, chunk: Option<ChunkHandle>) -> Self {
        debug_assert!(is_legal_y(pos.y), "y {} outside build range", pos.y);
        let x = (pos.x & LOCAL_MASK) as u16;
        let z = (pos.z & LOCAL_MASK) as u16;
        let y = (pos.y & 0xFF) as u16;
        Self {
            index: x | (z << 4) | (y << 8),
            chunk,
        }
    }

    /// Rebuild from a raw key.
    pub const fn from_raw(index: u16, chunk: Option<ChunkHandle>) -> Self {
        Self { index, chunk }
    }

    /// The raw 16-bit key.
    #[inline]
    pub const fn raw(self) -> u16 {
        self.index
    }

    #[inline]
    pub const fn local_x(self) -> i32 {
        (self.index & 0xF) as i32
    }

    #[inline]
    pub const fn local_z(self) -> i32 {
        ((self.index >> 4) & 0xF) as i32
    }

    /// Decoded Y in the build's vertical range.
    #[inline]
    pub const fn y(self) -> i32 {
        let byte = (self.index >> 8) as i32;
        WORLD_MIN_Y + (byte - WORLD_MIN_Y).rem_euclid(256)
    }

    /// Handle of the owning chunk, if one was attached.
    #[inline]
    pub const fn chunk(self) -> Option<ChunkHandle> {
        self.chunk
    }

    /// Local position interpreted directly as a world position.
    pub const fn local(self) -> BlockPos {
        BlockPos::new(self.local_x(), self.y(), self.local_z())
    }

    /// Reconstruct a world position from the chunk's grid origin.
    ///
    /// Without an origin the local bits are returned unchanged.
    pub const fn unpack(self, origin: Option<ChunkPos>) -> BlockPos {
        match origin {
            None => self.local(),
            Some(chunk) => BlockPos::new(
                chunk.origin_x() | self.local_x(),
                self.y(),
                chunk.origin_z() | self.local_z(),
            ),
        }
    }

    /// Reconstruct a world position by resolving the attached handle.
    ///
    /// Returns `None` when the handle no longer names a resident chunk.
    pub fn resolve(self, storage: &ChunkStorage) -> Option<BlockPos> {
        match self.chunk {
            None => Some(self.local()),
            Some(handle) => storage
                .resolve(handle)
                .map(|chunk| self.unpack(Some(chunk.position()))),
        }
    }

    /// Offset into a chunk's voxel array.
    #[inline]
    pub(crate) fn storage_index(self) -> usize {
        let layer = (self.y() - WORLD_MIN_Y) as usize;
        (layer << 8) | (self.index & 0xFF) as usize
    }
}

impl fmt::Debug for PackedBlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackedBlockPos")
            .field("x", &self.local_x())
            .field("y", &self.y())
            .field("z", &self.local_z())
            .field("chunk", &self.chunk)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_low_bits_relative_to_chunk() {
        let packed = PackedBlockPos::pack(BlockPos::new(35, 64, -6), None);
        assert_eq!(packed.local_x(), 3);
        assert_eq!(packed.local_z(), 10);
        assert_eq!(packed.y(), 64);
        assert_eq!(packed.raw(), 3 | (10 << 4) | (64 << 8));
    }

    #[test]
    fn unpack_with_origin_restores_world_position() {
        let packed = PackedBlockPos::pack(BlockPos::new(35, 64, -6), None);
        assert_eq!(
            packed.unpack(Some(ChunkPos::new(2, -1))),
            BlockPos::new(35, 64, -6)
        );
    }

    #[test]
    fn unpack_without_origin_returns_local_bits() {
        let packed = PackedBlockPos::pack(BlockPos::new(35, 64, -6), None);
        assert_eq!(packed.unpack(None), BlockPos::new(3, 64, 10));
    }

    #[test]
    fn vertical_extremes_roundtrip() {
        for y in [WORLD_MIN_Y, WORLD_MIN_Y + 1, 0, WORLD_MAX_Y - 1, WORLD_MAX_Y] {
            let packed = PackedBlockPos::pack(BlockPos::new(0, y, 0), None);
            assert_eq!(packed.y(), y);
        }
    }

    #[test]
    fn storage_index_matches_layer_layout() {
        let packed = PackedBlockPos::pack(BlockPos::new(1, WORLD_MIN_Y + 2, 3), None);
        assert_eq!(packed.storage_index(), (2 * 16 + 3) * 16 + 1);
    }

    #[test]
    fn raw_key_roundtrips() {
        let packed = PackedBlockPos::pack(BlockPos::new(-1, WORLD_MAX_Y, 17), None);
        assert_eq!(PackedBlockPos::from_raw(packed.raw(), None), packed);
    }
}
