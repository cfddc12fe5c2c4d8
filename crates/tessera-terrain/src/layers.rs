//! Elevation layers, applied in order by the elevation producer.
//!
//! Heights are stored in metres above sea level in channel 0 of the
//! elevation slot.

use std::sync::Arc;

use glam::DVec3;
use tessera_cubesphere::{CubeFace, ProjectionMethod};
use tessera_tile::{ProductionError, Slot, SlotRef, TileLayer, TileRequest};

use crate::surface::check_channels;
use crate::{Fbm, PlanetConfig, TileFrame};

/// What every elevation layer needs to locate its pixels.
#[derive(Clone, Copy, Debug)]
pub struct LayerTarget {
    pub face: CubeFace,
    pub projection: ProjectionMethod,
    /// Index of the elevation storage in the cache.
    pub storage: usize,
}

impl LayerTarget {
    fn slot<'a>(&self, slots: &'a [SlotRef]) -> Result<&'a SlotRef, ProductionError> {
        let slot = slots.get(self.storage).ok_or(ProductionError::SlotShape {
            expected: 1,
            actual: 0,
        })?;
        check_channels(slot, 1)?;
        Ok(slot)
    }

    /// Run `f` over every pixel of the elevation slot with its sphere direction.
    fn update(
        &self,
        request: &TileRequest,
        slots: &[SlotRef],
        mut f: impl FnMut(DVec3, &mut f32),
    ) -> Result<(), ProductionError> {
        let mut slot = self.slot(slots)?.write();
        let frame = TileFrame::new(self.face, request, slot.tile_size(), self.projection)?;
        each_pixel(&mut slot, |x, y, value| f(frame.direction(x, y), value));
        Ok(())
    }
}

fn each_pixel(slot: &mut Slot, mut f: impl FnMut(u32, u32, &mut f32)) {
    let size = slot.tile_size();
    for y in 0..size {
        for x in 0..size {
            f(x, y, &mut slot.pixel_mut(x, y)[0]);
        }
    }
}

/// Continental base shape. Overwrites the slot.
pub struct FbmElevationLayer {
    target: LayerTarget,
    fbm: Arc<Fbm>,
    max_height: f64,
    min_height: f64,
}

impl FbmElevationLayer {
    pub fn new(target: LayerTarget, fbm: Arc<Fbm>, config: &PlanetConfig) -> Self {
        Self {
            target,
            fbm,
            max_height: config.terrain_max_height,
            min_height: config.terrain_min_height,
        }
    }

    /// Height in metres at unit-sphere direction `dir`.
    #[must_use]
    pub fn height(&self, dir: DVec3) -> f64 {
        let n = self.fbm.sample_normalized(dir);
        if n >= 0.0 {
            n * self.max_height
        } else {
            -n * self.min_height
        }
    }
}

impl TileLayer for FbmElevationLayer {
    fn name(&self) -> &str {
        "fbm-elevation"
    }

    fn do_create_tile(&self, request: &TileRequest, slots: &[SlotRef]) -> Result<(), ProductionError> {
        self.target
            .update(request, slots, |dir, h| *h = self.height(dir) as f32)
    }
}

/// High-frequency detail added on top of the base shape for deep tiles.
pub struct DetailNoiseLayer {
    target: LayerTarget,
    fbm: Arc<Fbm>,
    min_level: u8,
}

impl DetailNoiseLayer {
    pub fn new(target: LayerTarget, fbm: Arc<Fbm>, min_level: u8) -> Self {
        Self {
            target,
            fbm,
            min_level,
        }
    }
}

impl TileLayer for DetailNoiseLayer {
    fn name(&self) -> &str {
        "detail-noise"
    }

    fn do_create_tile(&self, request: &TileRequest, slots: &[SlotRef]) -> Result<(), ProductionError> {
        if request.level() < self.min_level {
            return Ok(());
        }
        self.target
            .update(request, slots, |dir, h| *h += self.fbm.sample(dir) as f32)
    }
}

/// Flattens the sea floor and clamps the result to the terrain range.
pub struct OceanFloorLayer {
    target: LayerTarget,
    scale: f32,
    min_height: f32,
    max_height: f32,
}

impl OceanFloorLayer {
    pub fn new(target: LayerTarget, config: &PlanetConfig) -> Self {
        Self {
            target,
            scale: config.ocean_floor_scale as f32,
            min_height: config.terrain_min_height as f32,
            max_height: config.terrain_max_height as f32,
        }
    }
}

impl TileLayer for OceanFloorLayer {
    fn name(&self) -> &str {
        "ocean-floor"
    }

    fn do_create_tile(&self, request: &TileRequest, slots: &[SlotRef]) -> Result<(), ProductionError> {
        self.target.update(request, slots, |_, h| {
            if *h < 0.0 {
                *h *= self.scale;
            }
            *h = h.clamp(self.min_height, self.max_height);
        })
    }
}
