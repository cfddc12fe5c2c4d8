//! Fixtures shared by the unit tests of this crate.

use std::sync::Arc;

use tessera_cubesphere::CubeFace;
use tessera_tile::{CpuTileStorage, Scheduler, TileCache, TileStorage};

use crate::{ElevationProducer, PlanetConfig};

/// A cache with elevation, normal and color storages of 12×12 pixels on an
/// inline scheduler.
pub fn test_cache(capacity: usize) -> Arc<TileCache> {
    cache_with_layers(capacity, &[("elevation", 1), ("normal", 3), ("color", 4)])
}

pub fn cache_with_layers(capacity: usize, layers: &[(&str, u32)]) -> Arc<TileCache> {
    let storages: Vec<Box<dyn TileStorage>> = layers
        .iter()
        .map(|&(name, channels)| {
            Box::new(CpuTileStorage::new(name, 12, channels, capacity)) as Box<dyn TileStorage>
        })
        .collect();
    Arc::new(TileCache::new("terrain-test", storages, Arc::new(Scheduler::inline(16))).unwrap())
}

/// An elevation producer with no layers: every height is sea level.
pub fn flat_elevation(cache: &Arc<TileCache>, face: CubeFace, config: &PlanetConfig) -> Arc<ElevationProducer> {
    ElevationProducer::with_layers(cache, face, config, Vec::new()).unwrap()
}
