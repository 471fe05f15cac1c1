use voxsim_core::BlockPos;

/// Read-only block classification used by movement and pathfinding.
///
/// Positions outside loaded terrain must report `false` for both queries, so
/// they neither support a walker nor let one pass.
pub trait BlockQuery {
    /// Whether the block blocks movement and can be stood on.
    fn is_solid(&self, pos: BlockPos) -> bool;

    /// Whether an entity may occupy the block.
    fn is_passable(&self, pos: BlockPos) -> bool;

    /// Whether a walker standing in `pos` rests on solid ground.
    fn is_supported(&self, pos: BlockPos) -> bool {
        self.is_solid(pos.below())
    }
}

impl<Q: BlockQuery + ?Sized> BlockQuery for &Q {
    fn is_solid(&self, pos: BlockPos) -> bool {
        (**self).is_solid(pos)
    }

    fn is_passable(&self, pos: BlockPos) -> bool {
        (**self).is_passable(pos)
    }
}
