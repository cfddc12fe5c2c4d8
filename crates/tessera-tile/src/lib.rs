//! Tile production: a shared, reference-counted tile cache with LRU eviction,
//! producers and layers that fill tiles, and a per-frame task scheduler.

mod backend;
mod cache;
mod config;
mod error;
mod handle;
mod id;
mod producer;
mod sampler;
mod scheduler;
mod storage;
mod task;
mod tile;

#[cfg(test)]
mod testing;

pub use backend::{Completion, ComputeBackend, InlineBackend, JobStatus, ThreadPoolBackend};
pub use cache::{CacheStats, LayerInfo, TileCache};
pub use config::{CacheConfig, SchedulerConfig, StorageLayerConfig};
pub use error::{ProductionError, TileError};
pub use handle::TileHandle;
pub use id::{ProducerId, TileId};
pub use producer::{ProducerCore, TileLayer, TileProducer, TileRequest, apply_layers, register_producer};
pub use sampler::{SampledTile, TileCoords, TileSampler};
pub use scheduler::{Scheduler, SchedulerStats, TickReport};
pub use storage::{CpuTileStorage, Slot, SlotRef, TileStorage};
pub use task::{Job, Readiness, Task, TaskState};
pub use tile::Tile;

static_assertions::assert_impl_all!(TileCache: Send, Sync);
static_assertions::assert_impl_all!(Scheduler: Send, Sync);
static_assertions::assert_impl_all!(Tile: Send, Sync);
static_assertions::assert_impl_all!(TileHandle: Send, Sync);
