//! Per-entity route following on top of [`PathFinder`].

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::trace;
use voxsim_core::{BlockPos, SimTick};

use crate::pathfinding::{snap_to_ground, PathFinder, PathNode, PathfinderConfig};
use crate::BlockQuery;

/// Vertical component above which the walker should jump.
const JUMP_THRESHOLD: f32 = 0.25;

/// Re-planning cadence and target snapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowerConfig {
    /// Ticks between route re-plans.
    pub repath_interval: u64,
    /// Blocks a floating target may be lowered to reach the ground.
    pub ground_snap: i32,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            repath_interval: 4,
            ground_snap: 3,
        }
    }
}

/// Movement intent produced by a follower.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Steering {
    /// Horizontal unit heading, or zero when standing still.
    pub heading: Vec3,
    pub jump: bool,
}

impl Steering {
    fn from_direction(direction: Vec3) -> Self {
        let flat = Vec3::new(direction.x, 0.0, direction.z);
        Self {
            heading: flat.normalize_or_zero(),
            jump: direction.y > JUMP_THRESHOLD,
        }
    }
}

/// Keeps one entity walking toward a target, re-planning periodically.
#[derive(Debug)]
pub struct PathFollower {
    finder: PathFinder,
    path: Vec<PathNode>,
    config: FollowerConfig,
    last_plan: Option<SimTick>,
    steering: Option<Steering>,
}

impl PathFollower {
    pub fn new(config: FollowerConfig, pathfinding: PathfinderConfig) -> Self {
        Self {
            finder: PathFinder::new(pathfinding),
            path: Vec::new(),
            config,
            last_plan: None,
            steering: None,
        }
    }

    /// Route from the last plan, start first.
    pub fn path(&self) -> &[PathNode] {
        &self.path
    }

    pub fn last_plan(&self) -> Option<SimTick> {
        self.last_plan
    }

    /// Steering for this tick.
    ///
    /// Plans are refreshed every `repath_interval` ticks; in between the last
    /// steering is reused. `None` means the target is unreachable.
    pub fn update<Q: BlockQuery + ?Sized>(
        &mut self,
        world: &Q,
        now: SimTick,
        position: Vec3,
        target: Vec3,
    ) -> Option<Steering> {
        let due = self
            .last_plan
            .map_or(true, |last| last.ticks_until(now) >= self.config.repath_interval);
        if !due {
            return self.steering;
        }

        let goal_cell = snap_to_ground(world, BlockPos::containing(target), self.config.ground_snap);
        let goal = Vec3::new(target.x, goal_cell.y as f32, target.z);

        self.steering = self
            .finder
            .simple_pathfind(world, position, goal, &mut self.path)
            .map(Steering::from_direction);
        self.last_plan = Some(now);
        trace!(
            tick = now.0,
            waypoints = self.path.len(),
            reachable = self.steering.is_some(),
            "follower re-planned"
        );
        self.steering
    }
}
