//! Bounding volumes of quads on the planet surface, used for LOD distances and culling.

use glam::DVec3;

use crate::{ProjectionMethod, QuadAddress, project};

/// A bounding sphere in planet-local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    /// Center relative to the planet center.
    pub center: DVec3,
    /// Radius enclosing the quad at every terrain height.
    pub radius: f64,
}

impl BoundingSphere {
    /// Distance from `point` to the sphere surface, 0 inside.
    #[must_use]
    pub fn distance_to(&self, point: DVec3) -> f64 {
        ((point - self.center).length() - self.radius).max(0.0)
    }
}

/// Planet-local geometry of a quad: projected corners, center and bounding sphere.
#[derive(Clone, Copy, Debug)]
pub struct QuadBounds {
    /// Corners on the reference sphere, in quadrant order.
    pub corners: [DVec3; 4],
    /// Center on the reference sphere.
    pub center: DVec3,
    /// Sphere enclosing the quad between `min_height` and `max_height`.
    pub sphere: BoundingSphere,
}

impl QuadBounds {
    /// Compute bounds for `addr` on a planet of `radius` whose terrain lies
    /// between `min_height` and `max_height` (relative to `radius`).
    #[must_use]
    pub fn new(
        addr: &QuadAddress,
        radius: f64,
        min_height: f64,
        max_height: f64,
        method: ProjectionMethod,
    ) -> Self {
        let corner_dirs = addr.corners().map(|fc| project(&fc, method));
        let center_dir = project(&addr.center(), method);

        let mid = radius + (min_height + max_height) * 0.5;
        let sphere_center = center_dir * mid;

        let mut max_dist_sq: f64 = 0.0;
        for dir in corner_dirs.iter().chain(std::iter::once(&center_dir)) {
            for h in [min_height, max_height] {
                let d = (*dir * (radius + h) - sphere_center).length_squared();
                max_dist_sq = max_dist_sq.max(d);
            }
        }

        Self {
            corners: corner_dirs.map(|d| d * radius),
            center: center_dir * radius,
            sphere: BoundingSphere {
                center: sphere_center,
                radius: max_dist_sq.sqrt(),
            },
        }
    }

    /// Distance from `point` to the nearest corner.
    #[must_use]
    pub fn closest_corner_distance(&self, point: DVec3) -> f64 {
        self.corners
            .iter()
            .map(|c| (*c - point).length())
            .fold(f64::INFINITY, f64::min)
    }

    /// Distance from `point` to the quad's center.
    #[must_use]
    pub fn center_distance(&self, point: DVec3) -> f64 {
        (self.center - point).length()
    }
}
