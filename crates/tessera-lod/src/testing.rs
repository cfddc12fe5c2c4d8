//! Fixtures for the planetoid unit tests: a small planet with one producer per face.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::DVec3;
use tessera_cubesphere::{CubeFace, QuadAddress, QuadBounds};
use tessera_tile::{
    CpuTileStorage, ProducerCore, ProductionError, Scheduler, Task, Tile, TileCache,
    TileProducer, TileStorage, register_producer,
};

use crate::{Camera, LodConfig, PlanetShape, Planetoid};

pub const RADIUS: f64 = 1000.0;

/// Produces levels up to `max_level`; while the gate is closed every task fails.
pub struct GatedProducer {
    core: ProducerCore,
    max_level: u8,
    gate: Arc<AtomicBool>,
}

impl TileProducer for GatedProducer {
    fn core(&self) -> &ProducerCore {
        &self.core
    }

    fn has_tile(&self, level: u8, _tx: u32, _ty: u32) -> bool {
        level <= self.max_level
    }

    fn create_tile(&self, tile: &Tile) -> Arc<Task> {
        if self.gate.load(Ordering::SeqCst) {
            Task::new(tile.id(), Vec::new(), Box::new(|| Ok(())))
        } else {
            Task::failed(tile.id(), &ProductionError::Backend("gate closed".to_string()))
        }
    }
}

pub struct TestPlanet {
    pub cache: Arc<TileCache>,
    pub planetoid: Planetoid,
    pub producers: Vec<Arc<GatedProducer>>,
    gate: Arc<AtomicBool>,
}

impl TestPlanet {
    pub fn new(config: LodConfig, producer_max: u8, capacity: usize) -> Self {
        Self::build(config, producer_max, capacity, true)
    }

    /// Same planet with the gate closed: nothing finishes until [`open_gate`](Self::open_gate).
    pub fn with_gate(config: LodConfig, producer_max: u8, capacity: usize) -> Self {
        Self::build(config, producer_max, capacity, false)
    }

    fn build(config: LodConfig, producer_max: u8, capacity: usize, open: bool) -> Self {
        let storages: Vec<Box<dyn TileStorage>> =
            vec![Box::new(CpuTileStorage::new("elevation", 4, 1, capacity))];
        let scheduler = Arc::new(Scheduler::inline(64));
        let cache = Arc::new(TileCache::new("lod-test", storages, Arc::clone(&scheduler)).unwrap());
        let gate = Arc::new(AtomicBool::new(open));

        let producers: Vec<_> = CubeFace::ALL
            .iter()
            .map(|face| {
                register_producer(&cache, format!("gated-{face}"), Vec::new(), |core| GatedProducer {
                    core,
                    max_level: producer_max,
                    gate: Arc::clone(&gate),
                })
                .unwrap()
            })
            .collect();

        let planetoid = Planetoid::new(config, PlanetShape::sphere(RADIUS), scheduler, |face| {
            vec![Arc::clone(&producers[face.index()]) as Arc<dyn TileProducer>]
        })
        .unwrap();

        Self {
            cache,
            planetoid,
            producers,
            gate,
        }
    }

    pub fn open_gate(&self) {
        self.gate.store(true, Ordering::SeqCst);
    }

    pub fn close_gate(&self) {
        self.gate.store(false, Ordering::SeqCst);
    }

    /// A corner of the front root quad on the reference sphere.
    pub fn front_corner(&self) -> DVec3 {
        let shape = self.planetoid.shape();
        QuadBounds::new(
            &QuadAddress::root(CubeFace::Front),
            shape.radius,
            shape.min_height,
            shape.max_height,
            shape.projection,
        )
        .corners[0]
    }

    pub fn front_leaves(&self) -> usize {
        self.planetoid
            .leaves()
            .iter()
            .filter(|a| a.face == CubeFace::Front)
            .count()
    }

    /// Users of the front root tile.
    pub fn front_held(&self) -> u32 {
        self.producers[CubeFace::Front.index()]
            .find_tile(0, 0, 0, true, false)
            .map_or(0, |tile| tile.users())
    }
}

/// A camera at `position` looking at the planet center.
pub fn camera_at(position: DVec3) -> Camera {
    let up = if position.normalize().dot(DVec3::Y).abs() > 0.99 {
        DVec3::Z
    } else {
        DVec3::Y
    };
    Camera::look_at(
        position,
        DVec3::ZERO,
        up,
        60f64.to_radians(),
        16.0 / 9.0,
        0.1,
        RADIUS * 100.0,
    )
}

/// A camera `altitude` above the center of the front face.
pub fn camera_over_front(altitude: f64) -> Camera {
    camera_at(DVec3::Z * (RADIUS + altitude))
}
