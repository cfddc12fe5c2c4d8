//! Quadtree level of detail for cube-sphere planets.
//!
//! A [`Planetoid`] owns one quadtree per cube face. Every frame it splits
//! quads the camera approaches, merges the ones it leaves, culls what cannot
//! be seen and requests the tiles of the remaining leaves from their
//! producers. A leaf joins the draw list once all its tiles are done.

mod config;
mod culling;
mod distances;
mod error;
mod planetoid;
mod quad;

#[cfg(test)]
mod testing;

pub use config::{CullingMode, DistanceMethod, LodConfig};
pub use culling::{Camera, Frustum, HorizonCuller};
pub use distances::LodDistances;
pub use error::LodError;
pub use planetoid::{PlanetShape, PlanetStats, Planetoid};
pub use quad::DrawItem;

static_assertions::assert_impl_all!(Planetoid: Send);
