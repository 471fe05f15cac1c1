//! World-space block positions.

use std::fmt;
use std::ops::{Add, Sub};

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

/// A block position in world space.
///
/// Ordering is lexical by `(x, y, z)`, which gives search structures keyed by
/// position a stable iteration order across runs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockPos {
    /// World X.
    pub x: i32,
    /// World Y (vertical).
    pub y: i32,
    /// World Z.
    pub z: i32,
}

impl BlockPos {
    /// The origin block.
    pub const ORIGIN: Self = Self::new(0, 0, 0);

    /// The six face-adjacent offsets in fixed expansion order.
    pub const FACE_OFFSETS: [BlockPos; 6] = [
        BlockPos::new(0, 0, 1),
        BlockPos::new(0, 0, -1),
        BlockPos::new(1, 0, 0),
        BlockPos::new(-1, 0, 0),
        BlockPos::new(0, -1, 0),
        BlockPos::new(0, 1, 0),
    ];

    /// Create a new position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Position offset by the given deltas.
    #[inline]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// The block directly above.
    #[inline]
    pub const fn above(self) -> Self {
        self.offset(0, 1, 0)
    }

    /// The block directly below.
    #[inline]
    pub const fn below(self) -> Self {
        self.offset(0, -1, 0)
    }

    /// The block containing a continuous position (each axis floored).
    pub fn containing(point: Vec3) -> Self {
        Self::new(
            point.x.floor() as i32,
            point.y.floor() as i32,
            point.z.floor() as i32,
        )
    }

    /// Centre of the block's floor face, where an entity standing here has its feet.
    pub fn foot_center(self) -> Vec3 {
        Vec3::new(self.x as f32 + 0.5, self.y as f32, self.z as f32 + 0.5)
    }

    /// 3D Manhattan distance.
    pub fn manhattan(self, other: Self) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs() + (self.z - other.z).abs()
    }
}

impl Add for BlockPos {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for BlockPos {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl From<IVec3> for BlockPos {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<BlockPos> for IVec3 {
    fn from(p: BlockPos) -> Self {
        IVec3::new(p.x, p.y, p.z)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}
