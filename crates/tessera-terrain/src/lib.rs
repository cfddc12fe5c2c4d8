//! Procedural planet terrain as tile producers: fBm elevation layers and the
//! normal and color producers derived from them.

mod color;
mod config;
mod dependency;
mod elevation;
mod error;
mod heightmap;
mod layers;
mod normal;
mod planet;
mod surface;

#[cfg(test)]
mod testing;

use tessera_tile::TileCache;

pub use color::{COLOR_LAYER, ColorProducer, Palette};
pub use config::PlanetConfig;
pub use elevation::{ELEVATION_LAYER, ElevationProducer};
pub use error::TerrainError;
pub use heightmap::{Fbm, FbmParams};
pub use layers::{DetailNoiseLayer, FbmElevationLayer, LayerTarget, OceanFloorLayer};
pub use normal::{NORMAL_LAYER, NormalProducer};
pub use planet::{FaceProducers, TerrainPlanet};
pub use surface::TileFrame;

/// Index of the storage called `name`, which must hold `channels` floats per pixel.
pub(crate) fn storage_index(
    cache: &TileCache,
    name: &'static str,
    channels: u32,
) -> Result<usize, TerrainError> {
    let index = cache.layer_index(name).ok_or(TerrainError::MissingLayer(name))?;
    let actual = cache.layers()[index].channels;
    if actual != channels {
        return Err(TerrainError::LayerChannels {
            layer: name,
            expected: channels,
            actual,
        });
    }
    Ok(index)
}
