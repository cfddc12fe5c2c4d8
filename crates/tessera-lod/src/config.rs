//! LOD controller settings.

use serde::{Deserialize, Serialize};
use tessera_cubesphere::QuadAddress;

/// How the camera-to-quad distance is measured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMethod {
    /// Distance to the nearest projected corner.
    #[default]
    ClosestCorner,
    /// Distance to the projected center.
    Center,
    /// The smaller of the two.
    ClosestCornerOrCenter,
}

/// Which visibility tests gate tile requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CullingMode {
    /// Every quad is visible.
    None,
    /// View-frustum test of the quad's bounding sphere.
    Frustum,
    /// Quads below the planet's horizon are culled.
    Horizon,
    /// Both tests.
    #[default]
    FrustumAndHorizon,
}

impl CullingMode {
    #[must_use]
    pub fn uses_frustum(self) -> bool {
        matches!(self, Self::Frustum | Self::FrustumAndHorizon)
    }

    #[must_use]
    pub fn uses_horizon(self) -> bool {
        matches!(self, Self::Horizon | Self::FrustumAndHorizon)
    }
}

/// Quadtree subdivision policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// Deepest level quads may reach.
    pub max_level: u8,
    /// Ratio between the split distances of consecutive levels.
    pub distance_multiplier: f64,
    /// Children merge once the distance exceeds the split distance times this factor.
    pub merge_hysteresis: f64,
    pub distance_method: DistanceMethod,
    pub culling: CullingMode,
    /// LOD passes an invisible quad keeps its tiles for.
    pub release_grace_frames: u32,
    /// Frames between LOD passes. Scheduling still runs every frame.
    pub update_interval_frames: u32,
    /// Freeze the quadtree while the camera is far from the planet.
    pub cutoff_enabled: bool,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            max_level: 12,
            distance_multiplier: 2.0,
            merge_hysteresis: 1.25,
            distance_method: DistanceMethod::default(),
            culling: CullingMode::default(),
            release_grace_frames: 30,
            update_interval_frames: 1,
            cutoff_enabled: true,
        }
    }
}

impl LodConfig {
    /// Check value ranges, returning a description of the first bad field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_level > QuadAddress::MAX_LEVEL {
            return Err(format!(
                "lod.max_level {} exceeds {}",
                self.max_level,
                QuadAddress::MAX_LEVEL
            ));
        }
        if !(self.distance_multiplier > 1.0) {
            return Err(format!(
                "lod.distance_multiplier must be greater than 1, got {}",
                self.distance_multiplier
            ));
        }
        if !(self.merge_hysteresis >= 1.0) {
            return Err(format!(
                "lod.merge_hysteresis must be at least 1, got {}",
                self.merge_hysteresis
            ));
        }
        if self.update_interval_frames == 0 {
            return Err("lod.update_interval_frames must be at least 1".to_string());
        }
        Ok(())
    }
}
