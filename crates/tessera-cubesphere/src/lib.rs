//! Cube-sphere geometry: cube faces, quadtree addressing, cube-to-sphere projection
//! and quad bounding volumes.

mod bounds;
mod cube_face;
mod face_coord;
mod projection;
mod quad_address;

pub use bounds::{BoundingSphere, QuadBounds};
pub use cube_face::CubeFace;
pub use face_coord::FaceCoord;
pub use projection::{ProjectionMethod, cube_to_sphere_everitt, face_coord_to_cube_point, project};
pub use quad_address::{QuadAddress, Quadrant};
