//! Height tiles for one cube face.

use std::sync::Arc;

use tessera_cubesphere::CubeFace;
use tessera_tile::{ProducerCore, TileCache, TileLayer, TileProducer, register_producer};

use crate::layers::{DetailNoiseLayer, FbmElevationLayer, LayerTarget, OceanFloorLayer};
use crate::{Fbm, PlanetConfig, TerrainError};

/// Name of the storage layer holding heights.
pub const ELEVATION_LAYER: &str = "elevation";

/// Produces elevation tiles of one cube face by compositing its layers.
pub struct ElevationProducer {
    core: ProducerCore,
    face: CubeFace,
    border: u32,
    max_level: u8,
    storage: usize,
}

impl ElevationProducer {
    /// Register an elevation producer for `face` with the standard layer stack:
    /// continental fBm, then detail noise, then ocean floor shaping.
    pub fn register(
        cache: &Arc<TileCache>,
        face: CubeFace,
        config: &PlanetConfig,
        continents: Arc<Fbm>,
        detail: Arc<Fbm>,
    ) -> Result<Arc<Self>, TerrainError> {
        let storage = crate::storage_index(cache, ELEVATION_LAYER, 1)?;
        let target = LayerTarget {
            face,
            projection: config.projection,
            storage,
        };
        let layers: Vec<Box<dyn TileLayer>> = vec![
            Box::new(FbmElevationLayer::new(target, continents, config)),
            Box::new(DetailNoiseLayer::new(target, detail, config.detail_min_level)),
            Box::new(OceanFloorLayer::new(target, config)),
        ];
        Self::with_layers(cache, face, config, layers)
    }

    /// Register an elevation producer for `face` with a custom layer stack.
    pub fn with_layers(
        cache: &Arc<TileCache>,
        face: CubeFace,
        config: &PlanetConfig,
        layers: Vec<Box<dyn TileLayer>>,
    ) -> Result<Arc<Self>, TerrainError> {
        let storage = crate::storage_index(cache, ELEVATION_LAYER, 1)?;
        let producer = register_producer(cache, format!("elevation-{face}"), layers, |core| Self {
            core,
            face,
            border: config.border,
            max_level: config.max_level,
            storage,
        })?;
        Ok(producer)
    }

    #[must_use]
    pub fn face(&self) -> CubeFace {
        self.face
    }

    /// Deepest level this producer builds.
    #[must_use]
    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    /// Index of the elevation storage in the cache.
    #[must_use]
    pub fn storage(&self) -> usize {
        self.storage
    }
}

impl TileProducer for ElevationProducer {
    fn core(&self) -> &ProducerCore {
        &self.core
    }

    fn border(&self) -> u32 {
        self.border
    }

    fn has_tile(&self, level: u8, tx: u32, ty: u32) -> bool {
        if level > self.max_level {
            return false;
        }
        let grid = 1u64 << level;
        u64::from(tx) < grid && u64::from(ty) < grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_cache;

    fn producer(max_level: u8) -> (Arc<TileCache>, Arc<ElevationProducer>) {
        let cache = test_cache(8);
        let config = PlanetConfig {
            max_level,
            ..Default::default()
        };
        let p = ElevationProducer::register(
            &cache,
            CubeFace::Right,
            &config,
            Arc::new(Fbm::new(config.continents.clone())),
            Arc::new(Fbm::new(config.detail.clone())),
        )
        .unwrap();
        (cache, p)
    }

    #[test]
    fn test_depth_limit() {
        let (_cache, p) = producer(3);
        assert!(p.has_tile(3, 7, 7));
        assert!(!p.has_tile(3, 8, 0));
        assert!(!p.has_tile(4, 0, 0));
        assert!(p.has_children(2, 3, 3));
        assert!(!p.has_children(3, 0, 0));
        assert_eq!(p.name(), "elevation-right");
        assert_eq!(p.border(), 2);
    }

    #[test]
    fn test_tile_is_produced_through_layers() {
        let (cache, p) = producer(6);
        let handle = p.get_tile(1, 1, 0).unwrap();
        assert!(!handle.is_ready());
        cache.scheduler().run_until_idle(8);
        assert!(handle.is_ready());
        let slot = handle.slots()[p.storage()].read();
        assert!(slot.texels().iter().any(|&h| h != 0.0));
    }

    #[test]
    fn test_adjacent_tiles_agree_on_shared_edge() {
        let (cache, p) = producer(6);
        let left = p.get_tile(2, 1, 2).unwrap();
        let right = p.get_tile(2, 2, 2).unwrap();
        cache.scheduler().run_until_idle(8);

        let size = p.tile_size(p.storage());
        let border = p.border();
        let last = size - border - 1;
        let a = left.slots()[p.storage()].read();
        let b = right.slots()[p.storage()].read();
        for y in border..=last {
            let (ha, hb) = (a.get(last, y, 0), b.get(border, y, 0));
            assert!((ha - hb).abs() < 1e-3, "row {y}: {ha} vs {hb}");
        }
    }

    #[test]
    fn test_missing_storage_layer() {
        let cache = crate::testing::cache_with_layers(4, &[("color", 4)]);
        let config = PlanetConfig::default();
        let err = ElevationProducer::with_layers(&cache, CubeFace::Top, &config, Vec::new())
            .err()
            .unwrap();
        assert!(matches!(err, TerrainError::MissingLayer("elevation")));
    }
}
