use tessera_tile::TileError;

/// Errors raised while wiring terrain producers to a cache.
#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    /// The cache has no storage layer with this name.
    #[error("tile cache has no '{0}' storage layer")]
    MissingLayer(&'static str),

    /// A storage layer has fewer channels than the producer writes.
    #[error("storage layer '{layer}' has {actual} channels, {expected} required")]
    LayerChannels {
        layer: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("invalid planet configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Tile(#[from] TileError),
}
