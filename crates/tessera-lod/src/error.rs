use tessera_cubesphere::CubeFace;

/// Errors building a [`Planetoid`](crate::Planetoid).
#[derive(Debug, thiserror::Error)]
pub enum LodError {
    /// A configuration value is out of range.
    #[error("invalid LOD configuration: {0}")]
    Invalid(String),

    /// A face was given no producers to request tiles from.
    #[error("no tile producers for face {0}")]
    NoProducers(CubeFace),
}
