//! Scoped acquisition of a cached tile.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use tracing::error;

use crate::{ProducerId, Tile, TileCache, TileError};

/// An acquired tile, released back to its cache on drop.
///
/// Holding a handle keeps the tile out of the eviction sequence and its slots
/// bound to it.
pub struct TileHandle {
    cache: Arc<TileCache>,
    tile: Arc<Tile>,
}

impl TileHandle {
    /// Acquire `(producer, level, tx, ty)` from `cache`.
    pub fn acquire(
        cache: &Arc<TileCache>,
        producer: ProducerId,
        level: u8,
        tx: u32,
        ty: u32,
    ) -> Result<Self, TileError> {
        let tile = cache.get_tile(producer, level, tx, ty)?;
        Ok(Self {
            cache: Arc::clone(cache),
            tile,
        })
    }

    /// The acquired tile.
    #[must_use]
    pub fn tile(&self) -> &Arc<Tile> {
        &self.tile
    }

    /// Cache the tile belongs to.
    #[must_use]
    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    /// Release now instead of at scope end.
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for TileHandle {
    type Target = Tile;

    fn deref(&self) -> &Tile {
        &self.tile
    }
}

impl Drop for TileHandle {
    fn drop(&mut self) {
        if let Err(e) = self.cache.put_tile(&self.tile) {
            error!(tile = %self.tile.id(), error = %e, "failed to release tile");
        }
    }
}

impl fmt::Debug for TileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TileHandle").field(&self.tile).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TileProducer;
    use crate::testing::{fill_producer, test_cache};

    #[test]
    fn test_drop_releases() {
        let cache = test_cache(2);
        let producer = fill_producer(&cache, 1.0);
        {
            let handle = TileHandle::acquire(&cache, producer.id(), 0, 0, 0).unwrap();
            assert_eq!(handle.users(), 1);
            assert_eq!(cache.stats().used, 1);
        }
        assert_eq!(cache.stats().used, 0);
        assert_eq!(cache.stats().unused, 1);
    }

    #[test]
    fn test_early_release() {
        let cache = test_cache(2);
        let producer = fill_producer(&cache, 1.0);
        let a = TileHandle::acquire(&cache, producer.id(), 1, 0, 0).unwrap();
        let b = TileHandle::acquire(&cache, producer.id(), 1, 0, 0).unwrap();
        a.release();
        assert_eq!(b.users(), 1);
        assert_eq!(b.id().level, 1);
    }
}
