//! Normalised 2D position on one cube face.

use crate::CubeFace;

/// A point on a cube face with `u`, `v` in `[0, 1]`.
///
/// `(0, 0)` is the corner at `-east - north`, `(1, 1)` the corner at `+east + north`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceCoord {
    /// Face the coordinate lies on.
    pub face: CubeFace,
    /// Position along the face's east axis.
    pub u: f64,
    /// Position along the face's north axis.
    pub v: f64,
}

impl FaceCoord {
    /// Build a coordinate, clamping `u` and `v` into the face.
    #[must_use]
    pub fn new(face: CubeFace, u: f64, v: f64) -> Self {
        Self {
            face,
            u: u.clamp(0.0, 1.0),
            v: v.clamp(0.0, 1.0),
        }
    }

    /// `u`, `v` remapped to the `[-1, 1]` square centred on the face normal.
    #[must_use]
    pub fn signed(&self) -> (f64, f64) {
        (2.0 * self.u - 1.0, 2.0 * self.v - 1.0)
    }
}
