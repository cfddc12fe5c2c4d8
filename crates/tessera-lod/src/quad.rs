//! One node of a face quadtree and the per-frame split/merge pass over it.

use std::sync::Arc;

use glam::DVec3;
use tessera_cubesphere::{QuadAddress, QuadBounds};
use tessera_tile::{Tile, TileError, TileHandle, TileProducer};
use tracing::{debug, warn};

use crate::{DistanceMethod, Frustum, HorizonCuller, LodConfig, LodDistances, PlanetShape};

/// A quad the renderer should draw this frame, with the tiles to bind.
#[derive(Clone, Debug)]
pub struct DrawItem {
    pub address: QuadAddress,
    /// One tile per producer, in producer order.
    pub tiles: Vec<Arc<Tile>>,
}

/// Everything one LOD pass reads, plus the counters it bumps.
pub(crate) struct LodPass<'a> {
    pub config: &'a LodConfig,
    pub distances: &'a LodDistances,
    pub shape: &'a PlanetShape,
    pub producers: &'a [Arc<dyn TileProducer>],
    /// Camera in planet-local space.
    pub camera: DVec3,
    /// World-space frustum, when frustum culling is on.
    pub frustum: Option<Frustum>,
    pub horizon: Option<HorizonCuller>,
    pub tick: u64,
    /// Camera beyond the cutoff: the tree shape is held, tiles still flow.
    pub frozen: bool,
    pub splits: usize,
    pub merges: usize,
    pub exhausted: usize,
}

/// Counters gathered by walking a tree.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct TreeCounts {
    pub quads: usize,
    pub leaves: usize,
    pub visible: usize,
    pub culled: usize,
    pub ready: usize,
    pub held_tiles: usize,
}

pub(crate) struct Quad {
    address: QuadAddress,
    bounds: QuadBounds,
    children: Option<Box<[Quad; 4]>>,
    /// Indexed like the face's producer list.
    tiles: Vec<Option<TileHandle>>,
    visible: bool,
    distance: f64,
    invisible_frames: u32,
    /// Tick of the last split or merge involving this quad.
    changed_tick: u64,
    /// Every tile this quad needs is held and done.
    ready: bool,
    /// Drawing the subtree below this quad leaves no hole.
    covered: bool,
}

impl Quad {
    pub(crate) fn new(address: QuadAddress, shape: &PlanetShape, producers: usize, tick: u64) -> Self {
        let bounds = QuadBounds::new(
            &address,
            shape.radius,
            shape.min_height,
            shape.max_height,
            shape.projection,
        );
        Self {
            address,
            bounds,
            children: None,
            tiles: (0..producers).map(|_| None).collect(),
            visible: false,
            distance: f64::INFINITY,
            invisible_frames: 0,
            changed_tick: tick,
            ready: false,
            covered: false,
        }
    }

    pub(crate) fn address(&self) -> QuadAddress {
        self.address
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub(crate) fn children(&self) -> Option<&[Quad; 4]> {
        self.children.as_deref()
    }

    /// Split, merge, cull and request tiles for this subtree.
    ///
    /// A frozen pass skips splits and merges but still measures, culls and
    /// keeps the leaves' tiles requested.
    pub(crate) fn evaluate(&mut self, pass: &mut LodPass<'_>) {
        self.measure(pass);
        let level = self.address.level;

        if self.is_leaf() {
            if !pass.frozen && self.can_split(pass) {
                self.split(pass);
                if let Some(children) = self.children.as_deref_mut() {
                    for child in children {
                        child.evaluate(pass);
                    }
                }
            } else {
                self.update_leaf_tiles(pass);
            }
            return;
        }

        if !pass.frozen
            && self.changed_tick != pass.tick
            && self.distance > pass.distances.merge_distance(level)
        {
            self.merge(pass);
            self.update_leaf_tiles(pass);
        } else if let Some(children) = self.children.as_deref_mut() {
            for child in children {
                child.evaluate(pass);
            }
        }
    }

    fn measure(&mut self, pass: &LodPass<'_>) {
        let camera = pass.camera;
        self.distance = match pass.config.distance_method {
            DistanceMethod::ClosestCorner => self.bounds.closest_corner_distance(camera),
            DistanceMethod::Center => self.bounds.center_distance(camera),
            DistanceMethod::ClosestCornerOrCenter => self
                .bounds
                .closest_corner_distance(camera)
                .min(self.bounds.center_distance(camera)),
        };

        let sphere = self.bounds.sphere;
        let in_frustum = pass
            .frustum
            .as_ref()
            .is_none_or(|f| f.intersects_sphere(sphere.center + pass.shape.origin, sphere.radius));
        let above_horizon = pass
            .horizon
            .as_ref()
            .is_none_or(|h| h.is_above_horizon(sphere.center, sphere.radius));
        self.visible = in_frustum && above_horizon;
    }

    fn can_split(&self, pass: &LodPass<'_>) -> bool {
        let QuadAddress { level, tx, ty, .. } = self.address;
        self.visible
            && self.changed_tick != pass.tick
            && level < pass.config.max_level
            && level < QuadAddress::MAX_LEVEL
            && self.distance < pass.distances.split_distance(level)
            && pass.producers.iter().all(|p| p.has_children(level, tx, ty))
    }

    fn split(&mut self, pass: &mut LodPass<'_>) {
        let children = self
            .address
            .children()
            .map(|addr| Quad::new(addr, pass.shape, pass.producers.len(), pass.tick));
        self.children = Some(Box::new(children));
        self.changed_tick = pass.tick;
        self.covered = false;
        pass.splits += 1;
        debug!(
            face = %self.address.face,
            level = self.address.level,
            tx = self.address.tx,
            ty = self.address.ty,
            distance = self.distance,
            "quad split"
        );
    }

    fn merge(&mut self, pass: &mut LodPass<'_>) {
        // Dropping the subtree releases every tile handle it held.
        self.children = None;
        self.changed_tick = pass.tick;
        pass.merges += 1;
        debug!(
            face = %self.address.face,
            level = self.address.level,
            tx = self.address.tx,
            ty = self.address.ty,
            distance = self.distance,
            "quad merged"
        );
    }

    fn update_leaf_tiles(&mut self, pass: &mut LodPass<'_>) {
        if self.visible {
            self.invisible_frames = 0;
            self.request_tiles(pass);
        } else {
            self.invisible_frames = self.invisible_frames.saturating_add(1);
            if self.invisible_frames > pass.config.release_grace_frames {
                self.release_tiles();
            }
        }
    }

    fn request_tiles(&mut self, pass: &mut LodPass<'_>) {
        let QuadAddress { level, tx, ty, .. } = self.address;
        for (slot, producer) in self.tiles.iter_mut().zip(pass.producers) {
            if slot.is_some() || !producer.has_tile(level, tx, ty) {
                continue;
            }
            match producer.get_tile(level, tx, ty) {
                Ok(handle) => *slot = Some(handle),
                Err(TileError::ResourceExhausted { .. }) => pass.exhausted += 1,
                Err(e) => warn!(
                    producer = producer.name(),
                    level,
                    tx,
                    ty,
                    error = %e,
                    "tile request failed"
                ),
            }
        }
    }

    pub(crate) fn release_tiles(&mut self) {
        for slot in &mut self.tiles {
            slot.take();
        }
        self.ready = false;
    }

    /// Drop every held tile in the subtree.
    pub(crate) fn release_all(&mut self) {
        self.release_tiles();
        if let Some(children) = self.children.as_deref_mut() {
            for child in children {
                child.release_all();
            }
        }
    }

    /// Recompute readiness after the scheduler ran.
    ///
    /// Broken tiles (cancelled or failed tasks) are requested again.
    /// Returns whether the subtree is covered.
    pub(crate) fn refresh(&mut self, producers: &[Arc<dyn TileProducer>]) -> bool {
        self.renew_broken(producers);
        let QuadAddress { level, tx, ty, .. } = self.address;
        self.ready = self
            .tiles
            .iter()
            .zip(producers)
            .all(|(slot, p)| match slot {
                Some(handle) => handle.is_ready(),
                None => !p.has_tile(level, tx, ty),
            });

        self.covered = match self.children.as_deref_mut() {
            None => self.ready || !self.visible,
            Some(children) => {
                let mut all = true;
                for child in children {
                    all &= child.refresh(producers);
                }
                all
            }
        };
        if !self.is_leaf() && self.covered && self.tiles.iter().any(Option::is_some) {
            self.release_tiles();
        }
        self.covered
    }

    fn renew_broken(&mut self, producers: &[Arc<dyn TileProducer>]) {
        let QuadAddress { level, tx, ty, .. } = self.address;
        for (slot, producer) in self.tiles.iter_mut().zip(producers) {
            let Some(old) = slot.as_ref() else { continue };
            if !old.is_broken() {
                continue;
            }
            // Acquire before releasing so the tile cannot be evicted in between.
            match producer.get_tile(level, tx, ty) {
                Ok(fresh) => *slot = Some(fresh),
                Err(e) => debug!(tile = %old.id(), error = %e, "could not re-request broken tile"),
            }
        }
    }

    /// Append the quads to draw: the finest ready quads, falling back to a
    /// ready ancestor where a child is still in production.
    pub(crate) fn collect_draw(&self, out: &mut Vec<DrawItem>) {
        match self.children.as_deref() {
            None => {
                if self.visible && self.ready {
                    out.push(self.draw_item());
                }
            }
            Some(children) => {
                if !self.covered && self.visible && self.ready {
                    out.push(self.draw_item());
                } else {
                    for child in children {
                        child.collect_draw(out);
                    }
                }
            }
        }
    }

    fn draw_item(&self) -> DrawItem {
        DrawItem {
            address: self.address,
            tiles: self
                .tiles
                .iter()
                .flatten()
                .map(|h| Arc::clone(h.tile()))
                .collect(),
        }
    }

    pub(crate) fn count(&self, counts: &mut TreeCounts) {
        counts.quads += 1;
        counts.held_tiles += self.tiles.iter().flatten().count();
        match self.children.as_deref() {
            None => {
                counts.leaves += 1;
                if self.visible {
                    counts.visible += 1;
                    if self.ready {
                        counts.ready += 1;
                    }
                } else {
                    counts.culled += 1;
                }
            }
            Some(children) => {
                for child in children {
                    child.count(counts);
                }
            }
        }
    }

    pub(crate) fn collect_leaves(&self, out: &mut Vec<QuadAddress>) {
        match self.children.as_deref() {
            None => out.push(self.address),
            Some(children) => children.iter().for_each(|c| c.collect_leaves(out)),
        }
    }
}
