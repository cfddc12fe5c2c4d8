//! The per-planet LOD controller: six face quadtrees driven once per frame.

use std::sync::Arc;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use tessera_cubesphere::{CubeFace, ProjectionMethod, QuadAddress};
use tessera_tile::{Scheduler, TickReport, TileProducer};
use tracing::{debug, info};

use crate::quad::{LodPass, Quad, TreeCounts};
use crate::{Camera, DrawItem, Frustum, HorizonCuller, LodConfig, LodDistances, LodError};

/// Size and placement of the planet surface the quadtree covers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanetShape {
    /// Reference sphere radius.
    pub radius: f64,
    /// Lowest terrain height relative to `radius`.
    pub min_height: f64,
    /// Highest terrain height relative to `radius`.
    pub max_height: f64,
    pub projection: ProjectionMethod,
    /// Planet center in world space.
    pub origin: DVec3,
}

impl PlanetShape {
    /// A smooth sphere of `radius` at the world origin.
    #[must_use]
    pub fn sphere(radius: f64) -> Self {
        Self {
            radius,
            min_height: 0.0,
            max_height: 0.0,
            projection: ProjectionMethod::default(),
            origin: DVec3::ZERO,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if !(self.radius > 0.0) {
            return Err(format!("planet radius must be positive, got {}", self.radius));
        }
        if self.min_height > self.max_height {
            return Err(format!(
                "min_height {} is above max_height {}",
                self.min_height, self.max_height
            ));
        }
        if self.radius + self.min_height <= 0.0 {
            return Err("min_height reaches the planet center".to_string());
        }
        Ok(())
    }
}

/// Snapshot of one [`Planetoid::update`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlanetStats {
    pub quads: usize,
    pub leaves: usize,
    /// Visible leaves.
    pub visible: usize,
    /// Leaves rejected by culling.
    pub culled: usize,
    /// Visible leaves whose tiles are all done.
    pub ready: usize,
    /// Tile handles held across every quad.
    pub held_tiles: usize,
    /// The camera is past the cutoff distance.
    pub frozen: bool,
    pub splits: usize,
    pub merges: usize,
    /// Entries in the draw list.
    pub draw: usize,
    /// Tile requests refused because the cache was full.
    pub exhausted: usize,
    /// What the scheduler did this frame.
    pub tick: TickReport,
}

struct FaceTree {
    face: CubeFace,
    producers: Vec<Arc<dyn TileProducer>>,
    root: Quad,
}

/// Quadtree LOD controller for one planet.
///
/// Each frame [`update`](Self::update) splits and merges quads against the
/// camera, requests the tiles of visible leaves, runs one scheduler tick and
/// then marks which quads have all their tiles done.
pub struct Planetoid {
    config: LodConfig,
    shape: PlanetShape,
    distances: LodDistances,
    scheduler: Arc<Scheduler>,
    faces: Vec<FaceTree>,
    tick: u64,
    frozen: bool,
    stats: PlanetStats,
}

impl Planetoid {
    /// Build six root quads, each requesting tiles from `producers(face)`.
    ///
    /// The producers' cache must be driven by `scheduler`.
    pub fn new(
        config: LodConfig,
        shape: PlanetShape,
        scheduler: Arc<Scheduler>,
        mut producers: impl FnMut(CubeFace) -> Vec<Arc<dyn TileProducer>>,
    ) -> Result<Self, LodError> {
        config.validate().map_err(LodError::Invalid)?;
        shape.validate().map_err(LodError::Invalid)?;

        let mut faces = Vec::with_capacity(CubeFace::ALL.len());
        for face in CubeFace::ALL {
            let producers = producers(face);
            if producers.is_empty() {
                return Err(LodError::NoProducers(face));
            }
            let root = Quad::new(QuadAddress::root(face), &shape, producers.len(), 0);
            faces.push(FaceTree {
                face,
                producers,
                root,
            });
        }

        let distances = LodDistances::new(
            shape.radius,
            config.distance_multiplier,
            config.max_level,
            config.merge_hysteresis,
        );
        debug!(
            radius = shape.radius,
            max_level = config.max_level,
            cutoff = Self::cutoff_for(&shape, &distances),
            "planetoid created"
        );
        Ok(Self {
            config,
            shape,
            distances,
            scheduler,
            faces,
            tick: 0,
            frozen: false,
            stats: PlanetStats::default(),
        })
    }

    fn cutoff_for(shape: &PlanetShape, distances: &LodDistances) -> f64 {
        2.0 * shape.radius + distances.split_distance(0)
    }

    /// Camera distance from the planet center beyond which the quadtree freezes.
    #[must_use]
    pub fn cutoff_distance(&self) -> f64 {
        Self::cutoff_for(&self.shape, &self.distances)
    }

    /// Advance one frame.
    pub fn update(&mut self, camera: &Camera) -> PlanetStats {
        let frame = self.tick;
        self.tick += 1;
        let local = camera.position - self.shape.origin;
        self.check_cutoff(local.length());

        let mut pass = LodPass {
            config: &self.config,
            distances: &self.distances,
            shape: &self.shape,
            producers: &[],
            camera: local,
            frustum: self
                .config
                .culling
                .uses_frustum()
                .then(|| Frustum::from_view_projection(&camera.view_projection)),
            horizon: self.config.culling.uses_horizon().then(|| {
                HorizonCuller::new(local, DVec3::ZERO, self.shape.radius + self.shape.min_height)
            }),
            tick: self.tick,
            frozen: self.frozen,
            splits: 0,
            merges: 0,
            exhausted: 0,
        };
        if frame % u64::from(self.config.update_interval_frames) == 0 {
            for tree in &mut self.faces {
                pass.producers = &tree.producers;
                tree.root.evaluate(&mut pass);
            }
        }
        let (splits, merges, exhausted) = (pass.splits, pass.merges, pass.exhausted);

        let report = self.scheduler.tick();

        for tree in &mut self.faces {
            tree.root.refresh(&tree.producers);
        }

        let mut counts = TreeCounts::default();
        for tree in &self.faces {
            tree.root.count(&mut counts);
        }
        self.stats = PlanetStats {
            quads: counts.quads,
            leaves: counts.leaves,
            visible: counts.visible,
            culled: counts.culled,
            ready: counts.ready,
            held_tiles: counts.held_tiles,
            frozen: self.frozen,
            splits,
            merges,
            draw: self.draw_list().len(),
            exhausted,
            tick: report,
        };
        self.stats
    }

    fn check_cutoff(&mut self, distance: f64) {
        let cutoff = self.cutoff_distance();
        let frozen = self.config.cutoff_enabled && distance > cutoff;
        if frozen == self.frozen {
            return;
        }
        self.frozen = frozen;
        if frozen {
            info!(distance, cutoff, "camera beyond cutoff, freezing planet LOD");
        } else {
            info!(distance, cutoff, "camera within cutoff, resuming planet LOD");
        }
    }

    /// Quads to render, finest ready level first available per region.
    #[must_use]
    pub fn draw_list(&self) -> Vec<DrawItem> {
        let mut out = Vec::new();
        for tree in &self.faces {
            tree.root.collect_draw(&mut out);
        }
        out
    }

    /// Addresses of every leaf, face by face.
    #[must_use]
    pub fn leaves(&self) -> Vec<QuadAddress> {
        let mut out = Vec::new();
        for tree in &self.faces {
            tree.root.collect_leaves(&mut out);
        }
        out
    }

    /// Collapse every face back to its root quad, releasing all held tiles.
    pub fn reset_quads(&mut self) {
        let released: usize = self
            .faces
            .iter()
            .map(|tree| {
                let mut counts = TreeCounts::default();
                tree.root.count(&mut counts);
                counts.held_tiles
            })
            .sum();
        for tree in &mut self.faces {
            tree.root.release_all();
            tree.root = Quad::new(
                QuadAddress::root(tree.face),
                &self.shape,
                tree.producers.len(),
                self.tick,
            );
        }
        self.stats = PlanetStats {
            frozen: self.frozen,
            ..PlanetStats::default()
        };
        info!(released, "planet quads reset");
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[must_use]
    pub fn distances(&self) -> &LodDistances {
        &self.distances
    }

    #[must_use]
    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    #[must_use]
    pub fn shape(&self) -> &PlanetShape {
        &self.shape
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Statistics of the last update.
    #[must_use]
    pub fn stats(&self) -> PlanetStats {
        self.stats
    }

    /// Frames updated so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.tick
    }
}
