//! Serializable settings for caches and schedulers.

use serde::{Deserialize, Serialize};

use crate::{CpuTileStorage, ThreadPoolBackend, TileStorage};

/// One logical storage layer of a cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageLayerConfig {
    /// Layer name (binding name for render backends).
    pub name: String,
    /// Floats per pixel.
    pub channels: u32,
}

impl Default for StorageLayerConfig {
    fn default() -> Self {
        Self {
            name: "elevation".to_string(),
            channels: 1,
        }
    }
}

/// Tile cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Slots per storage layer; upper bound on resident tiles.
    pub capacity: usize,
    /// Slot width and height in pixels, borders included.
    pub tile_size: u32,
    /// Storage layers, in slot order.
    pub layers: Vec<StorageLayerConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 512,
            tile_size: 36,
            layers: vec![
                StorageLayerConfig {
                    name: "elevation".to_string(),
                    channels: 1,
                },
                StorageLayerConfig {
                    name: "normal".to_string(),
                    channels: 3,
                },
                StorageLayerConfig {
                    name: "color".to_string(),
                    channels: 4,
                },
            ],
        }
    }
}

impl CacheConfig {
    /// Host-memory storages for every configured layer.
    #[must_use]
    pub fn build_storages(&self) -> Vec<Box<dyn TileStorage>> {
        self.layers
            .iter()
            .map(|layer| {
                Box::new(CpuTileStorage::new(
                    layer.name.clone(),
                    self.tile_size,
                    layer.channels,
                    self.capacity,
                )) as Box<dyn TileStorage>
            })
            .collect()
    }

    /// Index of the layer called `name`.
    #[must_use]
    pub fn layer_index(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name == name)
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tasks started per tick at most.
    pub max_tasks_per_tick: usize,
    /// Worker threads; 0 runs jobs inline on the ticking thread.
    pub worker_threads: usize,
    /// Size the worker pool to the machine, ignoring `worker_threads`.
    pub auto_workers: bool,
    /// Jobs that may be in flight on the worker pool.
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_tick: 16,
            worker_threads: 0,
            auto_workers: false,
            queue_capacity: 64,
        }
    }
}

impl SchedulerConfig {
    /// Worker threads to spawn; 0 means inline.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        if self.auto_workers {
            ThreadPoolBackend::default_thread_count()
        } else {
            self.worker_threads
        }
    }
}
