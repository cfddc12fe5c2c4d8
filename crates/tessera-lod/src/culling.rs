//! Camera description and the visibility tests run on quad bounding spheres.

use glam::{DMat4, DVec3, DVec4};

/// What the LOD controller needs to know about the viewer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    /// Eye position in world space.
    pub position: DVec3,
    /// World-to-clip transform, depth mapped to `[0, 1]`.
    pub view_projection: DMat4,
}

impl Camera {
    /// A right-handed perspective camera at `position` looking at `target`.
    #[must_use]
    pub fn look_at(
        position: DVec3,
        target: DVec3,
        up: DVec3,
        fov_y: f64,
        aspect: f64,
        near: f64,
        far: f64,
    ) -> Self {
        let view = DMat4::look_at_rh(position, target, up);
        let projection = DMat4::perspective_rh(fov_y, aspect, near, far);
        Self {
            position,
            view_projection: projection * view,
        }
    }
}

/// Six inward-facing planes extracted from a view-projection matrix.
#[derive(Clone, Debug)]
pub struct Frustum {
    /// `(nx, ny, nz, d)`: left, right, bottom, top, near, far.
    planes: [DVec4; 6],
}

impl Frustum {
    /// Gribb/Hartmann extraction for clip depth in `[0, w]`.
    #[must_use]
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let (r0, r1, r2, r3) = (vp.row(0), vp.row(1), vp.row(2), vp.row(3));
        let mut planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2];
        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }
        Self { planes }
    }

    /// Whether a sphere is at least partially inside.
    #[must_use]
    pub fn intersects_sphere(&self, center: DVec3, radius: f64) -> bool {
        self.planes
            .iter()
            .all(|p| p.truncate().dot(center) + p.w >= -radius)
    }
}

/// Culls bounding spheres hidden behind a spherical planet.
#[derive(Clone, Debug)]
pub struct HorizonCuller {
    camera: DVec3,
    center: DVec3,
    radius: f64,
    camera_distance: f64,
    cos_horizon: f64,
}

impl HorizonCuller {
    /// `radius` is the occluding sphere: the lowest terrain surface.
    #[must_use]
    pub fn new(camera: DVec3, center: DVec3, radius: f64) -> Self {
        let camera_distance = (camera - center).length();
        let cos_horizon = if camera_distance > radius {
            radius / camera_distance
        } else {
            0.0
        };
        Self {
            camera,
            center,
            radius,
            camera_distance,
            cos_horizon,
        }
    }

    /// Whether any part of the sphere can rise above the horizon.
    ///
    /// A point is visible when the angle at the planet center between it and
    /// the camera is below the horizon angle; the sphere widens that angle by
    /// its own angular radius.
    #[must_use]
    pub fn is_above_horizon(&self, center: DVec3, radius: f64) -> bool {
        if self.camera_distance <= self.radius {
            return true;
        }
        let to_sphere = center - self.center;
        let dist = to_sphere.length();
        if dist <= radius {
            return true;
        }
        let to_camera = self.camera - self.center;
        let cos_angle = to_sphere.dot(to_camera) / (dist * self.camera_distance);

        let sin_margin = radius / dist;
        let cos_margin = (1.0 - sin_margin * sin_margin).max(0.0).sqrt();
        let sin_horizon = (1.0 - self.cos_horizon * self.cos_horizon).max(0.0).sqrt();
        cos_angle >= self.cos_horizon * cos_margin - sin_horizon * sin_margin
    }

    /// Straight-line distance to the horizon, zero inside the occluder.
    #[must_use]
    pub fn horizon_distance(&self) -> f64 {
        if self.camera_distance <= self.radius {
            return 0.0;
        }
        (self.camera_distance * self.camera_distance - self.radius * self.radius).sqrt()
    }
}
