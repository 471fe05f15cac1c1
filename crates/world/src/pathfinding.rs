//! A* route search through the block grid.
//!
//! Walkers are two blocks tall: a cell is enterable when it and the cell
//! above it are passable. Movement follows these rules:
//! - horizontal steps are always allowed from supported ground
//! - climbing one block needs solid ground under the current cell
//! - stepping onto an unsupported cell marks the node `in_air`
//! - an airborne walker may glide one further horizontal step
//!   (`horizontal_in_air`), after which it can only fall
//! - falling is always allowed, up to `max_fall` blocks before landing
//!
//! Every step costs 1 and the heuristic is the 3D Manhattan distance, so the
//! heuristic never overestimates. Search states are a cell plus the walker's
//! movement flags, and ties in the frontier are broken by `(f, g, state)`,
//! which makes searches bit-for-bit reproducible.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::debug;
use voxsim_core::BlockPos;

use crate::BlockQuery;

/// Search limits and shortcuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfinderConfig {
    /// Frontier pops allowed before the search gives up.
    pub max_expansions: usize,
    /// Longest route, in steps, the search will consider.
    pub max_cost: i32,
    /// Longest unsupported drop a route may contain.
    pub max_fall: i32,
    /// Let [`PathFinder::simple_pathfind`] skip the search when the straight
    /// line between the endpoints is walkable.
    pub straight_line_shortcut: bool,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            max_expansions: 4096,
            max_cost: 64,
            max_fall: 3,
            straight_line_shortcut: true,
        }
    }
}

/// One entry in the search graph, and one waypoint of a finished route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PathNode {
    pub pos: BlockPos,
    /// Position this node was reached from; equals `pos` for the start.
    pub parent: BlockPos,
    /// Steps from the start.
    pub g: i32,
    /// `g` plus the heuristic to the goal.
    pub f: i32,
    /// Not resting on solid ground.
    pub in_air: bool,
    /// Reached by a horizontal move while already airborne.
    pub horizontal_in_air: bool,
    /// Blocks fallen since the walker last stood on ground.
    pub fall: i32,
}

/// How a finished search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchOutcome {
    /// The goal was popped from the frontier.
    Found,
    /// The frontier emptied without reaching the goal.
    Exhausted,
    /// The expansion budget ran out first.
    BudgetExceeded,
}

impl SearchOutcome {
    pub fn is_found(self) -> bool {
        self == SearchOutcome::Found
    }
}

/// Lifecycle of a [`PathFinder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    Searching,
    Done(SearchOutcome),
}

/// Search-graph identity: a cell plus the movement state a walker arrives in.
///
/// Two routes into the same cell can leave the walker with different options
/// (a glide may forbid the sideways step a walk allows), so each state is
/// searched on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct NodeKey {
    pos: BlockPos,
    in_air: bool,
    horizontal_in_air: bool,
    fall: i32,
}

impl NodeKey {
    fn of(node: &PathNode) -> Self {
        Self {
            pos: node.pos,
            in_air: node.in_air,
            horizontal_in_air: node.horizontal_in_air,
            fall: node.fall,
        }
    }

    /// Key range covering every state at `pos`.
    fn all_at(pos: BlockPos) -> std::ops::RangeInclusive<NodeKey> {
        let low = NodeKey {
            pos,
            in_air: false,
            horizontal_in_air: false,
            fall: i32::MIN,
        };
        let high = NodeKey {
            pos,
            in_air: true,
            horizontal_in_air: true,
            fall: i32::MAX,
        };
        low..=high
    }
}

#[derive(Debug, Clone, Copy)]
struct Visited {
    node: PathNode,
    /// Back-pointer; the start node points at itself.
    parent: NodeKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    f: i32,
    g: i32,
    key: NodeKey,
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert comparisons so the smallest (f, g, key) is popped first.
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.g.cmp(&self.g))
            .then_with(|| other.key.cmp(&self.key))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
fn heuristic(a: BlockPos, b: BlockPos) -> i32 {
    a.manhattan(b)
}

/// Reusable A* search state.
///
/// One instance serves one caller at a time; the maps are cleared and refilled
/// in place by every search.
#[derive(Debug)]
pub struct PathFinder {
    config: PathfinderConfig,
    /// Best cost found so far per search state, with its back-pointer.
    nodes: BTreeMap<NodeKey, Visited>,
    closed: BTreeSet<NodeKey>,
    frontier: BinaryHeap<OpenNode>,
    /// State in which the last search popped its goal.
    reached: Option<NodeKey>,
    state: SearchState,
    expansions: usize,
}

impl Default for PathFinder {
    fn default() -> Self {
        Self::new(PathfinderConfig::default())
    }
}

impl PathFinder {
    pub fn new(config: PathfinderConfig) -> Self {
        Self {
            config,
            nodes: BTreeMap::new(),
            closed: BTreeSet::new(),
            frontier: BinaryHeap::new(),
            reached: None,
            state: SearchState::Idle,
            expansions: 0,
        }
    }

    pub fn config(&self) -> &PathfinderConfig {
        &self.config
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    /// Frontier pops performed by the last search.
    pub fn expansions(&self) -> usize {
        self.expansions
    }

    /// Clear all search state.
    pub fn init(&mut self) {
        self.nodes.clear();
        self.closed.clear();
        self.frontier.clear();
        self.reached = None;
        self.state = SearchState::Idle;
        self.expansions = 0;
    }

    /// Search from `start` to `goal`, writing the route (start first) into `path`.
    ///
    /// The search state is re-initialised first, so one instance can serve any
    /// number of independent searches. On any outcome other than
    /// [`SearchOutcome::Found`] `path` is left empty.
    pub fn a_star_search<Q: BlockQuery + ?Sized>(
        &mut self,
        world: &Q,
        start: BlockPos,
        goal: BlockPos,
        path: &mut Vec<PathNode>,
    ) -> SearchOutcome {
        self.init();
        path.clear();
        self.state = SearchState::Searching;

        let h = heuristic(start, goal);
        let root = PathNode {
            pos: start,
            parent: start,
            g: 0,
            f: h,
            in_air: !world.is_supported(start),
            horizontal_in_air: false,
            fall: 0,
        };
        let key = NodeKey::of(&root);
        self.nodes.insert(
            key,
            Visited {
                node: root,
                parent: key,
            },
        );
        self.frontier.push(OpenNode { f: h, g: 0, key });

        let outcome = if start != goal && !Self::fits(world, goal) {
            SearchOutcome::Exhausted
        } else {
            self.run(world, goal)
        };

        if outcome.is_found() {
            self.reconstruct_path(start, goal, path);
        }
        self.state = SearchState::Done(outcome);
        debug!(
            %start,
            %goal,
            ?outcome,
            expansions = self.expansions,
            waypoints = path.len(),
            "path search finished"
        );
        outcome
    }

    fn run<Q: BlockQuery + ?Sized>(&mut self, world: &Q, goal: BlockPos) -> SearchOutcome {
        while let Some(open) = self.frontier.pop() {
            if !self.closed.insert(open.key) {
                continue;
            }
            let Some(current) = self.nodes.get(&open.key).map(|visited| visited.node) else {
                continue;
            };

            if current.pos == goal {
                self.reached = Some(open.key);
                return SearchOutcome::Found;
            }

            self.expansions += 1;
            if self.expansions > self.config.max_expansions {
                return SearchOutcome::BudgetExceeded;
            }

            let tentative_g = current.g + 1;
            if tentative_g > self.config.max_cost {
                continue;
            }

            for offset in BlockPos::FACE_OFFSETS {
                let next = current.pos + offset;
                let Some(candidate) = self.step(world, &current, next, offset.y, tentative_g, goal)
                else {
                    continue;
                };
                let key = NodeKey::of(&candidate);
                if self.closed.contains(&key) {
                    continue;
                }

                let improved = self
                    .nodes
                    .get(&key)
                    .map_or(true, |known| tentative_g < known.node.g);
                if !improved {
                    continue;
                }
                self.nodes.insert(
                    key,
                    Visited {
                        node: candidate,
                        parent: open.key,
                    },
                );
                self.frontier.push(OpenNode {
                    f: candidate.f,
                    g: candidate.g,
                    key,
                });
            }
        }
        SearchOutcome::Exhausted
    }

    /// Apply the movement rules to a single step, returning the resulting node.
    fn step<Q: BlockQuery + ?Sized>(
        &self,
        world: &Q,
        current: &PathNode,
        next: BlockPos,
        dy: i32,
        g: i32,
        goal: BlockPos,
    ) -> Option<PathNode> {
        if !Self::fits(world, next) {
            return None;
        }
        let supported = world.is_supported(next);

        let (horizontal_in_air, fall) = match dy {
            1 => {
                if current.in_air {
                    return None;
                }
                (false, 0)
            }
            0 => {
                if current.in_air && current.horizontal_in_air {
                    return None;
                }
                (current.in_air && !supported, current.fall)
            }
            _ => {
                let fall = current.fall + 1;
                if fall > self.config.max_fall {
                    return None;
                }
                (false, fall)
            }
        };

        Some(PathNode {
            pos: next,
            parent: current.pos,
            g,
            f: g + heuristic(next, goal),
            in_air: !supported,
            horizontal_in_air,
            fall: if supported { 0 } else { fall },
        })
    }

    /// Two-high clearance at `pos`.
    fn fits<Q: BlockQuery + ?Sized>(world: &Q, pos: BlockPos) -> bool {
        world.is_passable(pos) && world.is_passable(pos.above())
    }

    /// Walk back-pointers from `goal` to `start`, writing the route start-first.
    ///
    /// Follows the state the last search finished in, or else the cheapest
    /// recorded state at `goal`. Returns `false` (leaving `path` empty) when
    /// `goal` was never reached.
    pub fn reconstruct_path(
        &self,
        start: BlockPos,
        goal: BlockPos,
        path: &mut Vec<PathNode>,
    ) -> bool {
        path.clear();
        let Some(mut cursor) = self.reached.filter(|key| key.pos == goal).or_else(|| {
            self.nodes
                .range(NodeKey::all_at(goal))
                .min_by_key(|(_, visited)| visited.node.g)
                .map(|(key, _)| *key)
        }) else {
            return false;
        };

        // A chain longer than the node map would have to revisit a node.
        for _ in 0..=self.nodes.len() {
            let Some(visited) = self.nodes.get(&cursor) else {
                break;
            };
            path.push(visited.node);
            if visited.parent == cursor {
                if visited.node.pos == start {
                    path.reverse();
                    return true;
                }
                break;
            }
            cursor = visited.parent;
        }
        path.clear();
        false
    }

    /// Steering toward `goal` from a continuous position.
    ///
    /// When the straight segment between the two points is walkable on one
    /// level, the route is just the two end cells and the vector points
    /// straight at the goal. Otherwise the grid search runs and the vector
    /// points at the centre of the next waypoint, blended with the one after
    /// it. Vectors longer than one block are normalised. `None` means no route
    /// exists within the search limits.
    pub fn simple_pathfind<Q: BlockQuery + ?Sized>(
        &mut self,
        world: &Q,
        start: Vec3,
        goal: Vec3,
        path: &mut Vec<PathNode>,
    ) -> Option<Vec3> {
        let start_cell = BlockPos::containing(start);
        let goal_cell = BlockPos::containing(goal);

        if self.config.straight_line_shortcut
            && start_cell != goal_cell
            && start_cell.y == goal_cell.y
            && Self::straight_line_walkable(world, start, goal)
        {
            self.init();
            path.clear();
            let distance = heuristic(start_cell, goal_cell);
            path.push(PathNode {
                pos: start_cell,
                parent: start_cell,
                g: 0,
                f: distance,
                in_air: false,
                horizontal_in_air: false,
                fall: 0,
            });
            path.push(PathNode {
                pos: goal_cell,
                parent: start_cell,
                g: distance,
                f: distance,
                in_air: false,
                horizontal_in_air: false,
                fall: 0,
            });
            self.state = SearchState::Done(SearchOutcome::Found);
            return Some(clamp_unit(Vec3::new(goal.x - start.x, 0.0, goal.z - start.z)));
        }

        if !self.a_star_search(world, start_cell, goal_cell, path).is_found() {
            return None;
        }

        let mut direction = Vec3::ZERO;
        for waypoint in path.iter().skip(1).take(2) {
            direction += waypoint.pos.foot_center() - start;
        }
        Some(clamp_unit(direction))
    }

    /// Whether every cell crossed by the horizontal segment is enterable and supported.
    fn straight_line_walkable<Q: BlockQuery + ?Sized>(world: &Q, start: Vec3, goal: Vec3) -> bool {
        let y = start.y.floor() as i32;
        let mut cell = (start.x.floor() as i32, start.z.floor() as i32);
        let end = (goal.x.floor() as i32, goal.z.floor() as i32);
        let dx = goal.x - start.x;
        let dz = goal.z - start.z;

        let step_x = if dx > 0.0 { 1 } else { -1 };
        let step_z = if dz > 0.0 { 1 } else { -1 };
        let delta_x = if dx != 0.0 { (1.0 / dx).abs() } else { f32::MAX };
        let delta_z = if dz != 0.0 { (1.0 / dz).abs() } else { f32::MAX };
        let mut t_max_x = if dx > 0.0 {
            ((cell.0 + 1) as f32 - start.x) / dx
        } else if dx < 0.0 {
            (cell.0 as f32 - start.x) / dx
        } else {
            f32::MAX
        };
        let mut t_max_z = if dz > 0.0 {
            ((cell.1 + 1) as f32 - start.z) / dz
        } else if dz < 0.0 {
            (cell.1 as f32 - start.z) / dz
        } else {
            f32::MAX
        };

        let max_steps = (end.0 - cell.0).abs() + (end.1 - cell.1).abs();
        for _ in 0..=max_steps {
            let pos = BlockPos::new(cell.0, y, cell.1);
            if !Self::fits(world, pos) || !world.is_supported(pos) {
                return false;
            }
            if cell == end {
                return true;
            }
            if t_max_x < t_max_z {
                cell.0 += step_x;
                t_max_x += delta_x;
            } else {
                cell.1 += step_z;
                t_max_z += delta_z;
            }
        }
        false
    }
}

fn clamp_unit(v: Vec3) -> Vec3 {
    if v.length_squared() > 1.0 {
        v.normalize()
    } else {
        v
    }
}

/// Drop `pos` onto the ground if it is fewer than `max_drop` blocks above solid footing.
pub fn snap_to_ground<Q: BlockQuery + ?Sized>(world: &Q, pos: BlockPos, max_drop: i32) -> BlockPos {
    let mut cursor = pos;
    for _ in 0..max_drop {
        if !world.is_passable(cursor) {
            break;
        }
        if world.is_supported(cursor) {
            return cursor;
        }
        cursor = cursor.below();
    }
    pos
}
