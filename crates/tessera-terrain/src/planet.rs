//! The full producer set of a planet: elevation, normal and color per face.

use std::sync::Arc;

use tessera_cubesphere::CubeFace;
use tessera_tile::{TileCache, TileProducer};
use tracing::info;

use crate::{ColorProducer, ElevationProducer, Fbm, FbmParams, NormalProducer, PlanetConfig, TerrainError};

/// Producers of one cube face.
pub struct FaceProducers {
    pub face: CubeFace,
    pub elevation: Arc<ElevationProducer>,
    pub normal: Arc<NormalProducer>,
    pub color: Arc<ColorProducer>,
}

impl FaceProducers {
    /// Producers a quad of this face requests tiles from, in request order.
    #[must_use]
    pub fn producers(&self) -> Vec<Arc<dyn TileProducer>> {
        vec![
            Arc::clone(&self.elevation) as Arc<dyn TileProducer>,
            Arc::clone(&self.normal) as Arc<dyn TileProducer>,
            Arc::clone(&self.color) as Arc<dyn TileProducer>,
        ]
    }
}

/// Terrain producers for all six faces, sharing one cache and one set of
/// noise fields.
pub struct TerrainPlanet {
    config: PlanetConfig,
    faces: Vec<FaceProducers>,
}

impl TerrainPlanet {
    /// Register eighteen producers (three per face) with `cache`.
    pub fn build(cache: &Arc<TileCache>, config: PlanetConfig) -> Result<Self, TerrainError> {
        config.validate().map_err(TerrainError::Invalid)?;
        let sizes: Vec<u32> = cache.layers().iter().map(|l| l.tile_size).collect();
        if let Some(&first) = sizes.first()
            && sizes.iter().any(|&s| s != first)
        {
            return Err(TerrainError::Invalid(format!(
                "terrain storages must share one tile size, got {sizes:?}"
            )));
        }

        let seeded = |params: &FbmParams| {
            Arc::new(Fbm::new(FbmParams {
                seed: config.seed.wrapping_add(params.seed),
                ..params.clone()
            }))
        };
        let continents = seeded(&config.continents);
        let detail = seeded(&config.detail);

        let mut faces = Vec::with_capacity(CubeFace::ALL.len());
        for face in CubeFace::ALL {
            let elevation = ElevationProducer::register(
                cache,
                face,
                &config,
                Arc::clone(&continents),
                Arc::clone(&detail),
            )?;
            let normal = NormalProducer::register(cache, Arc::clone(&elevation), &config)?;
            let color = ColorProducer::register(cache, Arc::clone(&normal), &config)?;
            faces.push(FaceProducers {
                face,
                elevation,
                normal,
                color,
            });
        }
        info!(
            radius = config.radius,
            seed = config.seed,
            max_level = config.max_level,
            producers = faces.len() * 3,
            "terrain producers registered"
        );
        Ok(Self { config, faces })
    }

    #[must_use]
    pub fn config(&self) -> &PlanetConfig {
        &self.config
    }

    /// All faces in [`CubeFace::ALL`] order.
    #[must_use]
    pub fn faces(&self) -> &[FaceProducers] {
        &self.faces
    }

    #[must_use]
    pub fn face(&self, face: CubeFace) -> &FaceProducers {
        &self.faces[face.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{cache_with_layers, test_cache};

    #[test]
    fn test_build_registers_every_face() {
        let cache = test_cache(32);
        let planet = TerrainPlanet::build(&cache, PlanetConfig::default()).unwrap();
        assert_eq!(planet.faces().len(), 6);
        for face in CubeFace::ALL {
            let set = planet.face(face);
            assert_eq!(set.face, face);
            let ids: Vec<_> = set.producers().iter().map(|p| p.id()).collect();
            assert_eq!(ids.len(), 3);
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_face_produces_complete_tile_set() {
        let cache = test_cache(32);
        let planet = TerrainPlanet::build(&cache, PlanetConfig::default()).unwrap();
        let handles: Vec<_> = planet
            .face(CubeFace::Front)
            .producers()
            .iter()
            .map(|p| p.get_tile(1, 1, 1).unwrap())
            .collect();
        cache.scheduler().run_until_idle(16);
        assert!(handles.iter().all(|h| h.is_ready()));
    }

    #[test]
    fn test_rejects_missing_storage() {
        let cache = cache_with_layers(4, &[("elevation", 1), ("normal", 3)]);
        let err = TerrainPlanet::build(&cache, PlanetConfig::default()).err().unwrap();
        assert!(matches!(err, TerrainError::MissingLayer("color")));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let cache = test_cache(4);
        let config = PlanetConfig {
            radius: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            TerrainPlanet::build(&cache, config),
            Err(TerrainError::Invalid(_))
        ));
    }
}
