//! Lookup of the best ready tile covering a quad.
//!
//! A quad that has just split has no data of its own yet. The sampler walks up
//! the producer's quadtree until it finds a completed ancestor and returns the
//! sub-rectangle of that tile the quad covers.

use std::sync::Arc;

use crate::{Tile, TileProducer};

/// Mapping from quad-local `[0, 1]²` coordinates into a tile's slot,
/// expressed in normalized slot coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileCoords {
    /// Slot-space U of the quad's south-west corner.
    pub offset_u: f64,
    /// Slot-space V of the quad's south-west corner.
    pub offset_v: f64,
    /// Slot-space extent of the quad.
    pub scale: f64,
}

impl TileCoords {
    /// Slot-space position of quad-local `(u, v)`.
    #[must_use]
    pub fn apply(&self, u: f64, v: f64) -> (f64, f64) {
        (self.offset_u + u * self.scale, self.offset_v + v * self.scale)
    }
}

/// A ready tile found for a quad, and where the quad sits in it.
#[derive(Clone, Debug)]
pub struct SampledTile {
    /// The completed tile. Not acquired; it may be evicted after this frame.
    pub tile: Arc<Tile>,
    /// Level of `tile`; lower than the requested level when an ancestor was used.
    pub level: u8,
    /// Where the requested quad lies inside `tile`'s slot.
    pub coords: TileCoords,
}

/// Resolves quads to ready tiles of one producer and storage layer.
#[derive(Clone)]
pub struct TileSampler {
    producer: Arc<dyn TileProducer>,
    layer: usize,
}

impl TileSampler {
    /// Sample `layer` of `producer`'s tiles.
    #[must_use]
    pub fn new(producer: Arc<dyn TileProducer>, layer: usize) -> Self {
        Self { producer, layer }
    }

    /// Binding name: the producer's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.producer.name()
    }

    /// Storage layer sampled.
    #[must_use]
    pub fn layer(&self) -> usize {
        self.layer
    }

    /// Slot size of the sampled layer.
    #[must_use]
    pub fn tile_size(&self) -> u32 {
        self.producer.tile_size(self.layer)
    }

    /// The producer sampled.
    #[must_use]
    pub fn producer(&self) -> &Arc<dyn TileProducer> {
        &self.producer
    }

    /// The finest ready tile covering quad `(level, tx, ty)`.
    ///
    /// Looks at the quad itself first, then its ancestors. Only tiles with
    /// users are considered, so the result is data some quad is holding.
    #[must_use]
    pub fn sample(&self, level: u8, tx: u32, ty: u32) -> Option<SampledTile> {
        let (mut l, mut x, mut y) = (level, tx, ty);
        loop {
            if let Some(tile) = self.producer.find_tile(l, x, y, false, true) {
                return Some(SampledTile {
                    coords: self.coords(level, tx, ty, l),
                    level: l,
                    tile,
                });
            }
            if l == 0 {
                return None;
            }
            l -= 1;
            x /= 2;
            y /= 2;
        }
    }

    fn coords(&self, level: u8, tx: u32, ty: u32, ancestor: u8) -> TileCoords {
        let depth = u32::from(level - ancestor);
        let cells = f64::from(1u32 << depth);
        let mask = (1u32 << depth) - 1;
        let (local_x, local_y) = (f64::from(tx & mask), f64::from(ty & mask));

        // Interior spans [border, size - border - 1] in pixels.
        let size = f64::from(self.tile_size().max(1));
        let border = f64::from(self.producer.border());
        let inner = (size - 2.0 * border - 1.0).max(0.0);
        let to_slot = |t: f64| (border + 0.5 + t * inner) / size;

        let scale = inner / size / cells;
        TileCoords {
            offset_u: to_slot(local_x / cells),
            offset_v: to_slot(local_y / cells),
            scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fill_producer, test_cache};

    #[test]
    fn test_sample_prefers_own_tile() {
        let cache = test_cache(4);
        let producer = fill_producer(&cache, 2.0);
        let handle = producer.get_tile(2, 1, 1).unwrap();
        cache.scheduler().run_until_idle(4);

        let sampler = TileSampler::new(producer.clone(), 0);
        let sampled = sampler.sample(2, 1, 1).unwrap();
        assert!(Arc::ptr_eq(&sampled.tile, handle.tile()));
        assert_eq!(sampled.level, 2);
        assert_eq!(sampled.coords.scale * 8.0, 7.0);
    }

    #[test]
    fn test_sample_falls_back_to_ready_ancestor() {
        let cache = test_cache(4);
        let producer = fill_producer(&cache, 2.0);
        let root = producer.get_tile(0, 0, 0).unwrap();
        cache.scheduler().run_until_idle(4);

        // Child is acquired but not produced yet.
        let _child = producer.get_tile(2, 3, 2).unwrap();
        let sampler = TileSampler::new(producer.clone(), 0);
        let sampled = sampler.sample(2, 3, 2).unwrap();
        assert!(Arc::ptr_eq(&sampled.tile, root.tile()));
        assert_eq!(sampled.level, 0);

        let whole = sampler.sample(0, 0, 0).unwrap().coords;
        assert!((sampled.coords.scale * 4.0 - whole.scale).abs() < 1e-12);
        let (u, v) = sampled.coords.apply(0.0, 0.0);
        let (wu, wv) = whole.apply(0.75, 0.5);
        assert!((u - wu).abs() < 1e-12 && (v - wv).abs() < 1e-12);
    }

    #[test]
    fn test_sample_nothing_ready() {
        let cache = test_cache(4);
        let producer = fill_producer(&cache, 2.0);
        let _pending = producer.get_tile(1, 0, 0).unwrap();
        let sampler = TileSampler::new(producer.clone(), 0);
        assert!(sampler.sample(1, 0, 0).is_none());
        assert_eq!(sampler.name(), "fill");
        assert_eq!(sampler.tile_size(), 8);
    }
}
