//! Planet and terrain generation settings.

use serde::{Deserialize, Serialize};
use tessera_cubesphere::{ProjectionMethod, QuadAddress};

use crate::FbmParams;

/// Shape of the planet and of the noise that builds its terrain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanetConfig {
    /// Sea-level radius in metres.
    pub radius: f64,
    /// Highest terrain above sea level, in metres.
    pub terrain_max_height: f64,
    /// Deepest terrain below sea level, in metres.
    pub terrain_min_height: f64,
    /// World seed, added to the seed of every noise field.
    pub seed: u32,
    /// Border pixels replicated around every tile.
    pub border: u32,
    /// Deepest quadtree level the producers can build.
    pub max_level: u8,
    /// Cube-to-sphere mapping.
    pub projection: ProjectionMethod,
    /// Continental shape.
    pub continents: FbmParams,
    /// Fine detail added to deeper tiles.
    pub detail: FbmParams,
    /// Detail noise is only added from this level down.
    pub detail_min_level: u8,
    /// Factor applied to depths below sea level.
    pub ocean_floor_scale: f64,
}

impl Default for PlanetConfig {
    fn default() -> Self {
        Self {
            radius: 6_371_000.0,
            terrain_max_height: 8_000.0,
            terrain_min_height: -4_000.0,
            seed: 42,
            border: 2,
            max_level: 16,
            projection: ProjectionMethod::default(),
            continents: FbmParams::default(),
            detail: FbmParams {
                seed: 1,
                octaves: 4,
                base_frequency: 96.0,
                amplitude: 150.0,
                ..FbmParams::default()
            },
            detail_min_level: 4,
            ocean_floor_scale: 0.4,
        }
    }
}

impl PlanetConfig {
    /// Check value ranges, returning a description of the first bad field.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(format!("planet.radius must be positive, got {}", self.radius));
        }
        if self.terrain_max_height < 0.0 || self.terrain_min_height > 0.0 {
            return Err(format!(
                "planet terrain range [{}, {}] must contain sea level",
                self.terrain_min_height, self.terrain_max_height
            ));
        }
        if self.max_level > QuadAddress::MAX_LEVEL {
            return Err(format!(
                "planet.max_level {} exceeds {}",
                self.max_level,
                QuadAddress::MAX_LEVEL
            ));
        }
        if !(0.0..=1.0).contains(&self.ocean_floor_scale) {
            return Err(format!(
                "planet.ocean_floor_scale must be in [0, 1], got {}",
                self.ocean_floor_scale
            ));
        }
        Ok(())
    }

    /// Largest possible distance from the planet centre to its surface.
    #[must_use]
    pub fn outer_radius(&self) -> f64 {
        self.radius + self.terrain_max_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PlanetConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let negative = PlanetConfig {
            radius: -1.0,
            ..Default::default()
        };
        assert!(negative.validate().unwrap_err().contains("radius"));

        let deep = PlanetConfig {
            max_level: 31,
            ..Default::default()
        };
        assert!(deep.validate().unwrap_err().contains("max_level"));

        let inverted = PlanetConfig {
            terrain_min_height: 10.0,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }
}
