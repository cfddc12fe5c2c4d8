//! Albedo tiles shaded from height and slope.

use std::sync::Arc;

use glam::{DVec3, Vec4};
use tessera_cubesphere::{CubeFace, ProjectionMethod};
use tessera_tile::{
    ProducerCore, ProductionError, SlotRef, Task, Tile, TileCache, TileProducer, TileRequest,
    register_producer,
};

use crate::surface::check_channels;
use crate::{NormalProducer, PlanetConfig, TerrainError, TileFrame, dependency};

/// Name of the storage layer holding colors.
pub const COLOR_LAYER: &str = "color";

const DEEP_WATER: Vec4 = Vec4::new(0.02, 0.07, 0.25, 1.0);
const SHALLOW_WATER: Vec4 = Vec4::new(0.08, 0.30, 0.55, 1.0);
const SAND: Vec4 = Vec4::new(0.76, 0.70, 0.50, 1.0);
const GRASS: Vec4 = Vec4::new(0.20, 0.45, 0.15, 1.0);
const ROCK: Vec4 = Vec4::new(0.42, 0.38, 0.34, 1.0);
const SNOW: Vec4 = Vec4::new(0.95, 0.95, 0.97, 1.0);

/// Height bands and slope threshold for [`shade`](Self::shade).
#[derive(Clone, Copy, Debug)]
pub struct Palette {
    pub min_height: f32,
    pub max_height: f32,
    /// Below this cosine between normal and up, ground is bare rock.
    pub cliff_cos: f32,
}

impl Palette {
    #[must_use]
    pub fn new(config: &PlanetConfig) -> Self {
        Self {
            min_height: config.terrain_min_height as f32,
            max_height: config.terrain_max_height as f32,
            cliff_cos: 0.8,
        }
    }

    /// RGBA for a point at `height` metres whose normal makes cosine `slope`
    /// with the local up direction.
    #[must_use]
    pub fn shade(&self, height: f32, slope: f32) -> Vec4 {
        if height < 0.0 {
            let depth = if self.min_height < 0.0 {
                (height / self.min_height).clamp(0.0, 1.0)
            } else {
                1.0
            };
            return SHALLOW_WATER.lerp(DEEP_WATER, depth);
        }
        let t = if self.max_height > 0.0 {
            (height / self.max_height).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let ground = if t < 0.02 {
            SAND
        } else if t < 0.45 {
            GRASS.lerp(ROCK, (t - 0.02) / 0.43)
        } else if t < 0.7 {
            ROCK
        } else {
            ROCK.lerp(SNOW, ((t - 0.7) / 0.1).min(1.0))
        };
        if slope < self.cliff_cos { ROCK } else { ground }
    }
}

/// Produces RGBA tiles from the elevation and normal tiles at the same position.
pub struct ColorProducer {
    core: ProducerCore,
    normals: Arc<NormalProducer>,
    palette: Palette,
    projection: ProjectionMethod,
    storage: usize,
}

impl ColorProducer {
    pub fn register(
        cache: &Arc<TileCache>,
        normals: Arc<NormalProducer>,
        config: &PlanetConfig,
    ) -> Result<Arc<Self>, TerrainError> {
        let storage = crate::storage_index(cache, COLOR_LAYER, 4)?;
        let name = format!("color-{}", normals.face());
        let producer = register_producer(cache, name, Vec::new(), |core| Self {
            core,
            normals,
            palette: Palette::new(config),
            projection: config.projection,
            storage,
        })?;
        Ok(producer)
    }

    #[must_use]
    pub fn face(&self) -> CubeFace {
        self.normals.face()
    }

    /// Index of the color storage in the cache.
    #[must_use]
    pub fn storage(&self) -> usize {
        self.storage
    }
}

impl TileProducer for ColorProducer {
    fn core(&self) -> &ProducerCore {
        &self.core
    }

    fn border(&self) -> u32 {
        self.normals.border()
    }

    fn has_tile(&self, level: u8, tx: u32, ty: u32) -> bool {
        self.normals.has_tile(level, tx, ty)
    }

    fn create_tile(&self, tile: &Tile) -> Arc<Task> {
        let id = tile.id();
        let elevation = self.normals.elevation();
        let heights = match dependency::acquire(elevation.as_ref(), id) {
            Ok(handle) => handle,
            Err(error) => return Task::failed(id, &error),
        };
        let normals = match dependency::acquire(self.normals.as_ref(), id) {
            Ok(handle) => handle,
            Err(error) => return Task::failed(id, &error),
        };
        let (Some(height_slot), Some(normal_slot), Some(target)) = (
            heights.slot(elevation.storage()).cloned(),
            normals.slot(self.normals.storage()).cloned(),
            tile.slot(self.storage).cloned(),
        ) else {
            return Task::failed(id, &dependency::missing(self.normals.as_ref(), id));
        };

        let request = TileRequest {
            id,
            border: self.border(),
        };
        let face = self.face();
        let (palette, projection) = (self.palette, self.projection);
        let predecessors = dependency::predecessors(&[&heights, &normals]);
        Task::new(
            id,
            predecessors,
            Box::new(move || {
                dependency::ensure_ready(&heights, id)?;
                dependency::ensure_ready(&normals, id)?;
                write_colors(face, projection, palette, &request, &height_slot, &normal_slot, &target)
            }),
        )
    }
}

fn write_colors(
    face: CubeFace,
    projection: ProjectionMethod,
    palette: Palette,
    request: &TileRequest,
    height_slot: &SlotRef,
    normal_slot: &SlotRef,
    target: &SlotRef,
) -> Result<(), ProductionError> {
    check_channels(height_slot, 1)?;
    check_channels(normal_slot, 3)?;
    check_channels(target, 4)?;
    let heights = height_slot.read();
    let normals = normal_slot.read();
    let mut out = target.write();
    let frame = TileFrame::new(face, request, out.tile_size(), projection)?;
    let size = out.tile_size().min(heights.tile_size()).min(normals.tile_size());
    for y in 0..size {
        for x in 0..size {
            let n = normals.pixel(x, y);
            let normal = DVec3::new(f64::from(n[0]), f64::from(n[1]), f64::from(n[2]));
            let slope = normal.dot(frame.direction(x, y)) as f32;
            let rgba = palette.shade(heights.get(x, y, 0), slope);
            out.pixel_mut(x, y).copy_from_slice(&rgba.to_array());
        }
    }
    Ok(())
}
