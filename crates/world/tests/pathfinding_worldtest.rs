//! Pathfinding worldtest
//!
//! Runs the route search against real chunk storage:
//! - open floor routes are Manhattan-optimal
//! - searches are reproducible across fresh finders
//! - terrain changed by scheduled ticks is respected
//! - routes cross chunk seams and never enter unloaded terrain

use glam::Vec3;
use voxsim_world::{
    BlockPos, BlockQuery, BlockRegistry, Chunk, ChunkPos, PathFinder, PathNode, PathfinderConfig,
    SearchOutcome, TickConfig, Voxel, World, WorldConfig, BLOCK_SAND, BLOCK_STONE, WORLD_MIN_Y,
};

const FLOOR: i32 = WORLD_MIN_Y;
const WALK: i32 = WORLD_MIN_Y + 1;

fn flat_world(radius: i32) -> World {
    let mut world = World::new(
        BlockRegistry::default(),
        WorldConfig::default(),
        TickConfig::default(),
    );
    for cz in -radius..=radius {
        for cx in -radius..=radius {
            let mut chunk = Chunk::new(ChunkPos::new(cx, cz));
            chunk.fill_layer(0, Voxel::of(BLOCK_STONE));
            world.load_chunk(chunk);
        }
    }
    world
}

fn wall(world: &mut World, x: i32, zs: std::ops::RangeInclusive<i32>, height: i32) {
    for z in zs {
        for dy in 0..height {
            world
                .set_block(BlockPos::new(x, WALK + dy, z), Voxel::of(BLOCK_STONE))
                .expect("wall inside loaded terrain");
        }
    }
}

fn search(world: &World, start: BlockPos, goal: BlockPos) -> (SearchOutcome, Vec<PathNode>) {
    let mut finder = PathFinder::new(PathfinderConfig {
        max_expansions: 16_384,
        ..PathfinderConfig::default()
    });
    let mut path = Vec::new();
    let outcome = finder.a_star_search(world, start, goal, &mut path);
    (outcome, path)
}

fn assert_contiguous(path: &[PathNode]) {
    for pair in path.windows(2) {
        assert_eq!(pair[0].pos.manhattan(pair[1].pos), 1, "gap in {:?}", pair);
        assert_eq!(pair[1].parent, pair[0].pos);
    }
}

#[test]
fn flat_floor_route_is_manhattan_optimal() {
    let world = flat_world(1);
    let start = BlockPos::new(-10, WALK, 3);
    let goal = BlockPos::new(12, WALK, -7);
    let (outcome, path) = search(&world, start, goal);

    assert_eq!(outcome, SearchOutcome::Found);
    assert_eq!(path.first().map(|n| n.pos), Some(start));
    assert_eq!(path.last().map(|n| n.pos), Some(goal));
    assert_eq!(path.len() as i32 - 1, start.manhattan(goal));
    assert_contiguous(&path);
    assert!(path.iter().all(|n| n.pos.y == WALK && !n.in_air));
}

#[test]
fn repeated_searches_are_identical() {
    let mut world = flat_world(1);
    wall(&mut world, 2, -5..=5, 2);
    let start = BlockPos::new(-3, WALK, 0);
    let goal = BlockPos::new(7, WALK, 1);

    let (first_outcome, first) = search(&world, start, goal);
    let mut shared = PathFinder::new(PathfinderConfig {
        max_expansions: 16_384,
        ..PathfinderConfig::default()
    });
    let mut reused = Vec::new();
    for _ in 0..3 {
        let outcome = shared.a_star_search(&world, start, goal, &mut reused);
        assert_eq!(outcome, first_outcome);
        assert_eq!(reused, first);
    }
    assert_eq!(first_outcome, SearchOutcome::Found);
    assert_contiguous(&first);
    assert!(first.iter().all(|n| world.is_passable(n.pos)));
}

#[test]
fn detour_around_wall_crosses_chunk_seam() {
    let mut world = flat_world(1);
    wall(&mut world, 4, -16..=16, 2);
    let start = BlockPos::new(1, WALK, 0);
    let goal = BlockPos::new(7, WALK, 0);

    let (outcome, path) = search(&world, start, goal);
    assert_eq!(outcome, SearchOutcome::Found);
    assert_contiguous(&path);
    // The wall ends at z = 16, so the route must pass z = 17 in the next chunk row.
    assert!(path.iter().any(|n| n.pos.z == 17));
    assert_eq!(path.len() as i32 - 1, 3 + 17 + 17 + 3);
}

#[test]
fn route_climbs_onto_single_block_ledge() {
    let mut world = flat_world(0);
    for x in 6..10 {
        for z in 0..16 {
            world
                .set_block(BlockPos::new(x, WALK, z), Voxel::of(BLOCK_STONE))
                .unwrap();
        }
    }
    let (outcome, path) = search(&world, BlockPos::new(2, WALK, 4), BlockPos::new(8, WALK + 1, 4));
    assert_eq!(outcome, SearchOutcome::Found);
    assert_contiguous(&path);
    assert_eq!(path.len() - 1, 7);
    assert!(path.iter().any(|n| n.in_air));
    assert!(!path.last().unwrap().in_air);
}

#[test]
fn route_steps_down_into_pit() {
    let mut world = flat_world(0);
    for x in 0..16 {
        for z in 0..16 {
            world
                .set_block(BlockPos::new(x, WALK, z), Voxel::of(BLOCK_STONE))
                .unwrap();
        }
    }
    world.set_block(BlockPos::new(8, WALK, 8), Voxel::AIR).unwrap();
    let (outcome, path) = search(&world, BlockPos::new(4, WALK + 1, 8), BlockPos::new(8, WALK, 8));
    assert_eq!(outcome, SearchOutcome::Found);
    assert_contiguous(&path);
    assert_eq!(path.len() - 1, 5);
}

#[test]
fn unloaded_terrain_is_never_entered() {
    let world = flat_world(0);
    let (outcome, path) = search(&world, BlockPos::new(8, WALK, 8), BlockPos::new(20, WALK, 8));
    assert_eq!(outcome, SearchOutcome::Exhausted);
    assert!(path.is_empty());
}

#[test]
fn settled_sand_blocks_the_corridor() {
    let mut world = flat_world(0);
    // Two-wide corridor along x, walled at z = 3 and z = 6.
    for x in 0..16 {
        for dy in 0..2 {
            world
                .set_block(BlockPos::new(x, WALK + dy, 3), Voxel::of(BLOCK_STONE))
                .unwrap();
            world
                .set_block(BlockPos::new(x, WALK + dy, 6), Voxel::of(BLOCK_STONE))
                .unwrap();
        }
    }
    let start = BlockPos::new(1, WALK, 4);
    let goal = BlockPos::new(14, WALK, 4);
    assert_eq!(search(&world, start, goal).0, SearchOutcome::Found);

    // Drop a sand plug across the corridor; it falls into place over a few ticks.
    for z in 4..=5 {
        for dy in 4..6 {
            let pos = BlockPos::new(8, WALK + dy, z);
            world.set_block(pos, Voxel::of(BLOCK_SAND)).unwrap();
        }
    }
    for _ in 0..40 {
        world.step();
    }
    assert_eq!(
        world.block(BlockPos::new(8, WALK, 4)),
        Some(Voxel::of(BLOCK_SAND))
    );
    assert_eq!(
        world.block(BlockPos::new(8, WALK + 1, 5)),
        Some(Voxel::of(BLOCK_SAND))
    );
    // A two-high plug cannot be climbed.
    assert_eq!(search(&world, start, goal).0, SearchOutcome::Exhausted);
}

#[test]
fn simple_pathfind_direction_points_along_route() {
    let mut world = flat_world(1);
    wall(&mut world, 3, -6..=6, 2);
    let mut finder = PathFinder::default();
    let mut path = Vec::new();
    let start = Vec3::new(0.5, WALK as f32, 0.5);
    let goal = Vec3::new(6.5, WALK as f32, 0.5);

    let direction = finder
        .simple_pathfind(&world, start, goal, &mut path)
        .expect("route around the wall");
    assert!(path.len() > 2);
    assert!(direction.length() <= 1.0 + 1e-5);
    assert!(direction.length() > 0.0);

    let next = path[1].pos.foot_center() - start;
    assert!(direction.dot(next) > 0.0);

    // Same query with the shortcut disabled still agrees on the first waypoint.
    let mut strict = PathFinder::new(PathfinderConfig {
        straight_line_shortcut: false,
        ..PathfinderConfig::default()
    });
    let mut strict_path = Vec::new();
    strict.simple_pathfind(&world, start, goal, &mut strict_path);
    assert_eq!(strict_path.get(1), path.get(1));
}

#[test]
fn floor_positions_are_solid() {
    let world = flat_world(0);
    assert!(world.is_solid(BlockPos::new(3, FLOOR, 3)));
    assert!(world.is_supported(BlockPos::new(3, WALK, 3)));
    assert!(!world.is_supported(BlockPos::new(3, WALK + 1, 3)));
}
