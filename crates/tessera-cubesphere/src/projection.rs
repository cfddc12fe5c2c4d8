//! Cube-to-sphere projection.
//!
//! Two mappings are offered: plain normalisation of the cube point, and the
//! Everitt analytic mapping, which spreads texels more evenly across a face.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::FaceCoord;

/// How cube points are inflated onto the unit sphere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProjectionMethod {
    /// Normalise the cube point. Cheap, but cells bunch up at face corners.
    Normalize,
    /// Everitt/Mathworld analytic mapping.
    #[default]
    Everitt,
}

/// Position of `fc` on the surface of the `[-1, 1]` cube.
#[inline]
#[must_use]
pub fn face_coord_to_cube_point(fc: &FaceCoord) -> DVec3 {
    let (s, t) = fc.signed();
    fc.face.normal() + s * fc.face.east() + t * fc.face.north()
}

/// Everitt mapping of a point on the cube surface onto the unit sphere.
///
/// ```text
/// sx = x * sqrt(1 - y²/2 - z²/2 + y²z²/3)
/// ```
/// and cyclically for `y` and `z`.
#[inline]
#[must_use]
pub fn cube_to_sphere_everitt(p: DVec3) -> DVec3 {
    let (x2, y2, z2) = (p.x * p.x, p.y * p.y, p.z * p.z);
    DVec3::new(
        p.x * (1.0 - y2 / 2.0 - z2 / 2.0 + y2 * z2 / 3.0).sqrt(),
        p.y * (1.0 - x2 / 2.0 - z2 / 2.0 + x2 * z2 / 3.0).sqrt(),
        p.z * (1.0 - x2 / 2.0 - y2 / 2.0 + x2 * y2 / 3.0).sqrt(),
    )
}

/// Unit-sphere direction for `fc` using `method`.
#[inline]
#[must_use]
pub fn project(fc: &FaceCoord, method: ProjectionMethod) -> DVec3 {
    let cube = face_coord_to_cube_point(fc);
    match method {
        ProjectionMethod::Normalize => cube.normalize(),
        ProjectionMethod::Everitt => cube_to_sphere_everitt(cube),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CubeFace;

    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_face_centers_map_to_normals() {
        for method in [ProjectionMethod::Normalize, ProjectionMethod::Everitt] {
            for face in CubeFace::ALL {
                let dir = project(&FaceCoord::new(face, 0.5, 0.5), method);
                assert!(
                    (dir - face.normal()).length() < EPSILON,
                    "{method:?}: center of {face} mapped to {dir:?}"
                );
            }
        }
    }

    #[test]
    fn test_projection_is_unit_length() {
        for method in [ProjectionMethod::Normalize, ProjectionMethod::Everitt] {
            for face in CubeFace::ALL {
                for i in 0..=8 {
                    for j in 0..=8 {
                        let fc = FaceCoord::new(face, f64::from(i) / 8.0, f64::from(j) / 8.0);
                        let len = project(&fc, method).length();
                        assert!((len - 1.0).abs() < EPSILON, "{method:?} {face}: |p| = {len}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_shared_edge_is_continuous() {
        // Top face north edge (v = 0 is -north = +Z side) meets the Front face top edge.
        let top = project(&FaceCoord::new(CubeFace::Top, 0.3, 0.0), ProjectionMethod::Everitt);
        let front = project(&FaceCoord::new(CubeFace::Front, 0.3, 1.0), ProjectionMethod::Everitt);
        assert!((top - front).length() < EPSILON, "top={top:?} front={front:?}");
    }
}
