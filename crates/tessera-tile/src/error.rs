//! Error types for the tile pipeline.

use crate::{ProducerId, TileId};

/// Errors returned by [`TileCache`](crate::TileCache) and producer registration.
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    /// Every resident tile is in use and the storage is full.
    #[error(
        "no evictable tile for producer {producer} at level {level} ({tx}, {ty}): all {capacity} slots in use"
    )]
    ResourceExhausted {
        /// Producer that asked for the tile.
        producer: ProducerId,
        /// Requested level.
        level: u8,
        /// Requested column.
        tx: u32,
        /// Requested row.
        ty: u32,
        /// Slots per storage layer.
        capacity: usize,
    },

    /// `put_tile` was called on a tile that has no users.
    #[error("double release of tile {id}")]
    DoubleRelease {
        /// The over-released tile.
        id: TileId,
    },

    /// No live producer is registered under this id.
    #[error("unknown producer {0}")]
    UnknownProducer(ProducerId),

    /// A producer is already registered under this id.
    #[error("producer {0} is already registered")]
    DuplicateProducer(ProducerId),

    /// The tile is not resident in this cache.
    #[error("tile {id} does not belong to this cache")]
    ForeignTile {
        /// The foreign tile.
        id: TileId,
    },

    /// The cache was built with no storage or with storages of different capacities.
    #[error("storage layers disagree: {0}")]
    StorageMismatch(String),

    /// A worker thread could not be started.
    #[error("failed to spawn tile worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Reasons a tile could not be filled.
///
/// These never escape the scheduler: producers fall back to neutral data and
/// the scheduler records the task as failed.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ProductionError {
    /// A tile this one is derived from was not available or not finished.
    #[error("missing dependency {dependency} for tile {tile}")]
    MissingDependency {
        /// Tile being produced.
        tile: TileId,
        /// Tile it needed.
        dependency: TileId,
    },

    /// The producer cannot build tiles this deep.
    #[error("level {level} is beyond the producer's maximum level {max}")]
    InvalidLevel {
        /// Requested level.
        level: u8,
        /// Deepest level the producer supports.
        max: u8,
    },

    /// A slot does not have the shape the layer expects.
    #[error("slot has {actual} channels, expected {expected}")]
    SlotShape {
        /// Channels the layer writes.
        expected: u32,
        /// Channels the slot holds.
        actual: u32,
    },

    /// The producer was dropped before its task ran.
    #[error("producer {0} was dropped")]
    ProducerDropped(ProducerId),

    /// The compute backend reported a failure.
    #[error("compute backend: {0}")]
    Backend(String),
}
