//! Acquiring the tiles another producer's task reads from.

use std::sync::Arc;

use tessera_tile::{ProductionError, Task, TileHandle, TileId, TileProducer};

/// Acquire `source`'s tile at the same position as `tile`.
pub(crate) fn acquire(source: &dyn TileProducer, tile: TileId) -> Result<TileHandle, ProductionError> {
    source
        .get_tile(tile.level, tile.tx, tile.ty)
        .map_err(|_| missing(source, tile))
}

/// Tasks the dependent task has to wait for.
pub(crate) fn predecessors(handles: &[&TileHandle]) -> Vec<Arc<Task>> {
    handles.iter().filter_map(|h| h.task()).collect()
}

/// Fail unless the dependency finished producing.
pub(crate) fn ensure_ready(handle: &TileHandle, tile: TileId) -> Result<(), ProductionError> {
    if handle.is_ready() {
        Ok(())
    } else {
        Err(ProductionError::MissingDependency {
            tile,
            dependency: handle.id(),
        })
    }
}

pub(crate) fn missing(source: &dyn TileProducer, tile: TileId) -> ProductionError {
    ProductionError::MissingDependency {
        tile,
        dependency: TileId::new(source.id(), tile.level, tile.tx, tile.ty),
    }
}
