//! Command-line overrides.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Tile engine command-line arguments.
///
/// Values given here override the ones loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "tessera", about = "Streaming LOD planet tile engine")]
pub struct CliArgs {
    /// Tile slots per storage layer.
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Deepest quadtree level.
    #[arg(long)]
    pub max_level: Option<u8>,

    /// Tasks the scheduler starts per frame.
    #[arg(long)]
    pub tasks_per_tick: Option<usize>,

    /// Worker threads (0 runs tile jobs on the frame thread).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Size the worker pool to the machine.
    #[arg(long, conflicts_with = "workers")]
    pub auto_workers: bool,

    /// Frames to simulate.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Config directory (overrides the platform default).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(capacity) = args.capacity {
            self.cache.capacity = capacity;
        }
        if let Some(level) = args.max_level {
            self.lod.max_level = level;
        }
        if let Some(tasks) = args.tasks_per_tick {
            self.scheduler.max_tasks_per_tick = tasks;
        }
        if let Some(workers) = args.workers {
            self.scheduler.worker_threads = workers;
            self.scheduler.auto_workers = false;
        }
        if args.auto_workers {
            self.scheduler.auto_workers = true;
        }
        if let Some(frames) = args.frames {
            self.debug.frames = frames;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
