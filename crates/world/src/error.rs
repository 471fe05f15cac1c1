use thiserror::Error;
use voxsim_core::BlockPos;

use crate::ChunkPos;

/// Errors raised by world block access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("chunk {0} is not loaded")]
    ChunkNotLoaded(ChunkPos),
    #[error("block {0} is outside the vertical build range")]
    OutOfBounds(BlockPos),
    #[error("chunk handle no longer refers to a loaded chunk")]
    StaleHandle,
    #[error("packed position has no owning chunk")]
    Unattached,
}
