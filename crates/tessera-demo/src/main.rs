//! Headless planet flight: builds the tile cache, terrain producers and
//! quadtree LOD controller from `config.ron`, flies a camera from orbit to
//! low altitude and logs cache, scheduler and LOD statistics.
//!
//! Run with `cargo run -p tessera-demo -- --frames 300 --max-level 10`.

mod flight;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use glam::DVec3;
use tessera_config::{CliArgs, Config, ConfigError, default_config_dir};
use tessera_lod::{LodError, PlanetShape, PlanetStats, Planetoid};
use tessera_terrain::{TerrainError, TerrainPlanet};
use tessera_tile::{Scheduler, TileCache, TileError};
use tracing::{error, info};

use crate::flight::Flight;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Tile(#[from] TileError),
    #[error(transparent)]
    Terrain(#[from] TerrainError),
    #[error(transparent)]
    Lod(#[from] LodError),
}

/// Sums over the whole flight.
#[derive(Default)]
struct Totals {
    splits: usize,
    merges: usize,
    exhausted: usize,
    frozen_frames: u32,
    peak_leaves: usize,
    peak_draw: usize,
}

impl Totals {
    fn add(&mut self, stats: &PlanetStats) {
        self.splits += stats.splits;
        self.merges += stats.merges;
        self.exhausted += stats.exhausted;
        self.frozen_frames += u32::from(stats.frozen);
        self.peak_leaves = self.peak_leaves.max(stats.leaves);
        self.peak_draw = self.peak_draw.max(stats.draw);
    }
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    tessera_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "demo failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<(), DemoError> {
    config.validate()?;

    let scheduler = Arc::new(Scheduler::from_config(&config.scheduler)?);
    let cache = Arc::new(TileCache::from_config(
        "planet",
        &config.cache,
        Arc::clone(&scheduler),
    )?);
    let terrain = TerrainPlanet::build(&cache, config.planet.clone())?;

    let planet = &config.planet;
    let shape = PlanetShape {
        radius: planet.radius,
        min_height: planet.terrain_min_height,
        max_height: planet.terrain_max_height,
        projection: planet.projection,
        origin: DVec3::ZERO,
    };
    let mut planetoid = Planetoid::new(config.lod.clone(), shape, Arc::clone(&scheduler), |face| {
        terrain.face(face).producers()
    })?;

    let frames = config.debug.frames;
    info!(
        backend = scheduler.backend_name(),
        capacity = cache.capacity(),
        tile_size = config.cache.tile_size,
        layers = cache.layers().len(),
        max_level = config.lod.max_level,
        frames,
        cutoff = planetoid.cutoff_distance(),
        "starting flight"
    );

    let flight = Flight::descent(planet.radius, frames);
    let mut totals = Totals::default();
    for frame in 0..frames {
        let stats = planetoid.update(&flight.camera(frame));
        totals.add(&stats);

        let interval = config.debug.report_interval;
        if (interval > 0 && frame % interval == 0) || frame + 1 == frames {
            let cache_stats = cache.stats();
            info!(
                frame,
                altitude = flight.altitude(frame),
                frozen = stats.frozen,
                leaves = stats.leaves,
                visible = stats.visible,
                culled = stats.culled,
                ready = stats.ready,
                draw = stats.draw,
                held = stats.held_tiles,
                resident = cache_stats.resident,
                evictions = cache_stats.evictions,
                started = stats.tick.started,
                waiting = stats.tick.waiting,
                "frame"
            );
        }
    }

    let cache_stats = cache.stats();
    let scheduler_stats = scheduler.stats();
    info!(
        splits = totals.splits,
        merges = totals.merges,
        exhausted = totals.exhausted,
        frozen_frames = totals.frozen_frames,
        peak_leaves = totals.peak_leaves,
        peak_draw = totals.peak_draw,
        hits = cache_stats.hits,
        misses = cache_stats.misses,
        evictions = cache_stats.evictions,
        completed = scheduler_stats.completed,
        failed = scheduler_stats.failed,
        cancelled = scheduler_stats.cancelled,
        "flight finished"
    );

    // Pending jobs hold dependency handles into the cache; drop them too.
    planetoid.reset_quads();
    scheduler.clear();
    info!(used = cache.stats().used, "shutdown complete");
    Ok(())
}
