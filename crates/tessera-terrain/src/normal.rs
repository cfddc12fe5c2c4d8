//! Surface normal tiles derived from elevation tiles.

use std::sync::Arc;

use glam::DVec3;
use tessera_cubesphere::{CubeFace, ProjectionMethod};
use tessera_tile::{
    ProducerCore, ProductionError, Slot, SlotRef, Task, Tile, TileCache, TileProducer, TileRequest,
    register_producer,
};

use crate::surface::check_channels;
use crate::{ElevationProducer, PlanetConfig, TerrainError, TileFrame, dependency};

/// Name of the storage layer holding normals.
pub const NORMAL_LAYER: &str = "normal";

/// Produces world-space unit normals (3 channels) from the elevation tile at
/// the same position. The elevation tile is held until the normal task ends.
pub struct NormalProducer {
    core: ProducerCore,
    elevation: Arc<ElevationProducer>,
    radius: f64,
    projection: ProjectionMethod,
    storage: usize,
}

impl NormalProducer {
    pub fn register(
        cache: &Arc<TileCache>,
        elevation: Arc<ElevationProducer>,
        config: &PlanetConfig,
    ) -> Result<Arc<Self>, TerrainError> {
        let storage = crate::storage_index(cache, NORMAL_LAYER, 3)?;
        let name = format!("normal-{}", elevation.face());
        let producer = register_producer(cache, name, Vec::new(), |core| Self {
            core,
            elevation,
            radius: config.radius,
            projection: config.projection,
            storage,
        })?;
        Ok(producer)
    }

    #[must_use]
    pub fn face(&self) -> CubeFace {
        self.elevation.face()
    }

    /// Index of the normal storage in the cache.
    #[must_use]
    pub fn storage(&self) -> usize {
        self.storage
    }

    #[must_use]
    pub fn elevation(&self) -> &Arc<ElevationProducer> {
        &self.elevation
    }
}

impl TileProducer for NormalProducer {
    fn core(&self) -> &ProducerCore {
        &self.core
    }

    fn border(&self) -> u32 {
        self.elevation.border()
    }

    fn has_tile(&self, level: u8, tx: u32, ty: u32) -> bool {
        self.elevation.has_tile(level, tx, ty)
    }

    fn create_tile(&self, tile: &Tile) -> Arc<Task> {
        let id = tile.id();
        let heights = match dependency::acquire(self.elevation.as_ref(), id) {
            Ok(handle) => handle,
            Err(error) => return Task::failed(id, &error),
        };
        let (Some(source), Some(target)) = (
            heights.slot(self.elevation.storage()).cloned(),
            tile.slot(self.storage).cloned(),
        ) else {
            return Task::failed(id, &dependency::missing(self.elevation.as_ref(), id));
        };

        let request = TileRequest {
            id,
            border: self.border(),
        };
        let face = self.face();
        let (radius, projection) = (self.radius, self.projection);
        let predecessors = dependency::predecessors(&[&heights]);
        Task::new(
            id,
            predecessors,
            // `heights` is released when the job is dropped.
            Box::new(move || {
                dependency::ensure_ready(&heights, id)?;
                write_normals(face, projection, radius, &request, &source, &target)
            }),
        )
    }
}

fn write_normals(
    face: CubeFace,
    projection: ProjectionMethod,
    radius: f64,
    request: &TileRequest,
    source: &SlotRef,
    target: &SlotRef,
) -> Result<(), ProductionError> {
    check_channels(source, 1)?;
    check_channels(target, 3)?;
    let heights = source.read();
    let mut out = target.write();
    let frame = TileFrame::new(face, request, out.tile_size(), projection)?;
    compute_normals(&frame, radius, &heights, &mut out);
    Ok(())
}

/// Central differences over the displaced sphere surface, one-sided at the
/// slot edges.
fn compute_normals(frame: &TileFrame, radius: f64, heights: &Slot, out: &mut Slot) {
    let size = out.tile_size().min(heights.tile_size());
    let position = |x: u32, y: u32| frame.direction(x, y) * (radius + f64::from(heights.get(x, y, 0)));
    for y in 0..size {
        for x in 0..size {
            let du = position((x + 1).min(size - 1), y) - position(x.saturating_sub(1), y);
            let dv = position(x, (y + 1).min(size - 1)) - position(x, y.saturating_sub(1));
            let up = frame.direction(x, y);
            let mut n = du.cross(dv).normalize_or_zero();
            if n == DVec3::ZERO {
                n = up;
            } else if n.dot(up) < 0.0 {
                n = -n;
            }
            out.pixel_mut(x, y)
                .copy_from_slice(&[n.x as f32, n.y as f32, n.z as f32]);
        }
    }
}
