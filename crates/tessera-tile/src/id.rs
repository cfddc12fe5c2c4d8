//! Tile and producer identities.

use std::fmt;

/// Cache-local identifier of a producer.
///
/// Ids are handed out in increasing order by
/// [`TileCache::next_producer_id`](crate::TileCache::next_producer_id) and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProducerId(pub u32);

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a tile within one cache: `(producer, level, tx, ty)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    /// Producer that fills the tile.
    pub producer: ProducerId,
    /// Quadtree level (0 = root).
    pub level: u8,
    /// Column at `level`.
    pub tx: u32,
    /// Row at `level`.
    pub ty: u32,
}

impl TileId {
    /// Build an identity.
    #[must_use]
    pub const fn new(producer: ProducerId, level: u8, tx: u32, ty: u32) -> Self {
        Self {
            producer,
            level,
            tx,
            ty,
        }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/L{}/{},{}", self.producer, self.level, self.tx, self.ty)
    }
}
