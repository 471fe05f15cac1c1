mod config;

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use glam::Vec3;
use serde::Serialize;
use tracing::{info, warn};
use voxsim_testkit::{EventRecord, JsonlSink};
use voxsim_world::{
    BlockPos, BlockRegistry, Chunk, ChunkPos, PathFollower, StepStats, Voxel, World,
    BLOCK_DIRT, BLOCK_GRASS, BLOCK_SAND, BLOCK_SAPLING, BLOCK_STONE, BLOCK_WATER, WORLD_MIN_Y,
};

use crate::config::{SimConfig, DEFAULT_CONFIG_PATH};

/// Local layer of the grass surface in the demo terrain.
const SURFACE_LAYER: usize = 3;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting voxsim v{}", env!("CARGO_PKG_VERSION"));

    let cli = CliOptions::parse(env::args().skip(1));
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = SimConfig::load_from_path(&config_path);

    let mut events = match &cli.events {
        Some(path) => Some(JsonlSink::create(path).context("open event log")?),
        None => None,
    };

    let mut world = build_demo_world(&config);
    info!(
        chunks = world.storage().len(),
        pending = world.scheduler().len(),
        "demo world ready"
    );

    let mut total = StepStats::default();
    for _ in 0..cli.ticks {
        let stats = world.step();
        total.fired += stats.fired;
        total.skipped += stats.skipped;
        total.tick = stats.tick;
        total.pending = stats.pending;
        total.chunks_modified += stats.chunks_modified;
        if let Some(sink) = events.as_mut() {
            if stats.fired + stats.skipped > 0 {
                sink.write(&EventRecord::new(stats.tick, "step", &stats)?)?;
            }
        }
    }
    info!(
        tick = total.tick.0,
        fired = total.fired,
        skipped = total.skipped,
        pending = total.pending,
        chunk_updates = total.chunks_modified,
        "simulation finished"
    );

    let route = walk_demo_route(&world, &config);
    match route.heading {
        Some(heading) => info!(
            waypoints = route.waypoints.len(),
            heading = ?heading,
            "route planned"
        ),
        None => warn!(start = ?route.start, goal = ?route.goal, "no route to goal"),
    }
    if let Some(sink) = events.as_mut() {
        sink.write(&EventRecord::new(world.now(), "path", &route)?)?;
        sink.flush()?;
        info!(events = sink.written(), "event log written");
    }
    Ok(())
}

/// Flat terrain over the configured view radius with a few ticking blocks and a wall.
fn build_demo_world(config: &SimConfig) -> World {
    let mut world = World::new(BlockRegistry::default(), config.world, config.ticks);
    let radius = config.world.view_radius.max(0);
    for cz in -radius..=radius {
        for cx in -radius..=radius {
            let mut chunk = Chunk::new(ChunkPos::new(cx, cz));
            chunk.fill_layer(0, Voxel::of(BLOCK_STONE));
            for layer in 1..SURFACE_LAYER {
                chunk.fill_layer(layer, Voxel::of(BLOCK_DIRT));
            }
            chunk.fill_layer(SURFACE_LAYER, Voxel::of(BLOCK_GRASS));
            if (cx, cz) == (0, 0) {
                // Floating sand column; it ticks on load and settles on the grass.
                for layer in 8..11 {
                    chunk.set_voxel(2, layer, 2, Voxel::of(BLOCK_SAND));
                }
            }
            world.load_chunk(chunk);
        }
    }

    let ground = surface_y();
    let water = BlockPos::new(6, ground, 6);
    let sapling = BlockPos::new(-4, ground, 3);
    for (pos, voxel) in [
        (water, Voxel::of(BLOCK_WATER)),
        (sapling, Voxel::of(BLOCK_SAPLING)),
    ] {
        if let Err(err) = world.set_block(pos, voxel) {
            warn!(%pos, %err, "demo block not placed");
        }
    }

    for z in -6..=4 {
        for dy in 0..2 {
            let pos = BlockPos::new(3, ground + dy, z);
            if let Err(err) = world.set_block(pos, Voxel::of(BLOCK_STONE)) {
                warn!(%pos, %err, "demo wall block not placed");
            }
        }
    }
    world
}

fn surface_y() -> i32 {
    WORLD_MIN_Y + SURFACE_LAYER as i32 + 1
}

#[derive(Debug, Serialize)]
struct RouteReport {
    start: Vec3,
    goal: Vec3,
    heading: Option<Vec3>,
    jump: bool,
    waypoints: Vec<BlockPos>,
}

/// Plan one route across the demo wall.
fn walk_demo_route(world: &World, config: &SimConfig) -> RouteReport {
    let ground = surface_y() as f32;
    let start = Vec3::new(0.5, ground, 0.5);
    let goal = Vec3::new(8.5, ground + 1.0, -2.5);
    let mut follower = PathFollower::new(config.follower, config.pathfinding);
    let steering = follower.update(world, world.now(), start, goal);
    RouteReport {
        start,
        goal,
        heading: steering.map(|s| s.heading),
        jump: steering.is_some_and(|s| s.jump),
        waypoints: follower.path().iter().map(|node| node.pos).collect(),
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CliOptions {
    config: Option<PathBuf>,
    ticks: u64,
    events: Option<PathBuf>,
}

impl CliOptions {
    const DEFAULT_TICKS: u64 = 200;

    fn parse<I: Iterator<Item = String>>(mut args: I) -> Self {
        let mut opts = CliOptions {
            config: None,
            ticks: Self::DEFAULT_TICKS,
            events: None,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    if let Some(path) = args.next() {
                        opts.config = Some(PathBuf::from(path));
                    } else {
                        tracing::error!("--config requires a file path");
                    }
                }
                "--ticks" => {
                    if let Some(raw) = args.next() {
                        match raw.parse::<u64>() {
                            Ok(value) => opts.ticks = value,
                            Err(err) => {
                                tracing::error!(%err, value = %raw, "--ticks must be an integer");
                            }
                        }
                    } else {
                        tracing::error!("--ticks requires an integer");
                    }
                }
                "--events" => {
                    if let Some(path) = args.next() {
                        opts.events = Some(PathBuf::from(path));
                    } else {
                        tracing::error!("--events requires a file path");
                    }
                }
                other => warn!(arg = other, "ignoring unknown argument"),
            }
        }
        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxsim_world::BLOCK_LOG;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn cli_parses_flags() {
        let opts = CliOptions::parse(args(&["--ticks", "50", "--events", "out/run.jsonl"]));
        assert_eq!(opts.ticks, 50);
        assert_eq!(opts.events, Some(PathBuf::from("out/run.jsonl")));
        assert_eq!(opts.config, None);
    }

    #[test]
    fn cli_keeps_default_on_bad_value() {
        let opts = CliOptions::parse(args(&["--ticks", "lots"]));
        assert_eq!(opts.ticks, CliOptions::DEFAULT_TICKS);
    }

    #[test]
    fn demo_world_settles_and_route_crosses_wall() {
        let config = SimConfig::default();
        let mut world = build_demo_world(&config);
        let mut chunk_updates = 0;
        for _ in 0..CliOptions::DEFAULT_TICKS {
            chunk_updates += world.step().chunks_modified;
        }
        assert!(chunk_updates > 0);
        assert!(world.scheduler().is_empty());
        let ground = surface_y();
        assert_eq!(
            world.block(BlockPos::new(2, ground, 2)),
            Some(Voxel::of(BLOCK_SAND))
        );
        assert_eq!(
            world.block(BlockPos::new(-4, ground, 3)),
            Some(Voxel::of(BLOCK_LOG))
        );

        let route = walk_demo_route(&world, &config);
        assert!(route.heading.is_some());
        let last = route.waypoints.last().copied();
        assert_eq!(last, Some(BlockPos::new(8, ground, -3)));
    }
}
