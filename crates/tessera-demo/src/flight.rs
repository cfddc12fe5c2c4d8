//! Scripted camera path: a descending quarter orbit from beyond the LOD cutoff
//! down to low altitude.

use std::f64::consts::TAU;

use glam::DVec3;
use tessera_lod::Camera;

pub struct Flight {
    radius: f64,
    start_altitude: f64,
    end_altitude: f64,
    frames: u32,
    laps: f64,
}

impl Flight {
    /// Start at three radii above the surface, which is past the freeze
    /// distance, and end 2 km up.
    pub fn descent(radius: f64, frames: u32) -> Self {
        Self {
            radius,
            start_altitude: radius * 3.0,
            end_altitude: 2_000.0_f64.min(radius * 0.01),
            frames: frames.max(2),
            laps: 0.25,
        }
    }

    fn progress(&self, frame: u32) -> f64 {
        f64::from(frame.min(self.frames - 1)) / f64::from(self.frames - 1)
    }

    /// Altitude falls geometrically so low levels get as many frames as high ones.
    pub fn altitude(&self, frame: u32) -> f64 {
        let t = self.progress(frame);
        self.start_altitude * (self.end_altitude / self.start_altitude).powf(t)
    }

    pub fn camera(&self, frame: u32) -> Camera {
        let altitude = self.altitude(frame);
        let angle = self.laps * TAU * self.progress(frame);
        let up = DVec3::new(angle.sin(), 0.0, angle.cos());
        let heading = DVec3::new(angle.cos(), 0.0, -angle.sin());

        let position = up * (self.radius + altitude);
        // Ahead and down; keeps the whole disc in view from far away.
        let target = up * self.radius + heading * altitude * 0.5;
        Camera::look_at(
            position,
            target,
            up,
            60f64.to_radians(),
            16.0 / 9.0,
            (altitude * 0.01).max(1.0),
            self.radius * 10.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_lod::Frustum;

    const RADIUS: f64 = 6_371_000.0;

    #[test]
    fn test_altitude_descends_to_target() {
        let flight = Flight::descent(RADIUS, 100);
        assert!((flight.altitude(0) - RADIUS * 3.0).abs() < 1e-6);
        assert!((flight.altitude(99) - 2_000.0).abs() < 1e-6);
        assert!((flight.altitude(500) - 2_000.0).abs() < 1e-6, "clamped past the end");
        for frame in 1..100 {
            assert!(flight.altitude(frame) < flight.altitude(frame - 1));
        }
    }

    #[test]
    fn test_camera_keeps_planet_in_view() {
        let flight = Flight::descent(RADIUS, 50);
        for frame in 0..50 {
            let camera = flight.camera(frame);
            let expected = RADIUS + flight.altitude(frame);
            assert!((camera.position.length() - expected).abs() < 1e-3 * expected);
            let frustum = Frustum::from_view_projection(&camera.view_projection);
            assert!(frustum.intersects_sphere(DVec3::ZERO, RADIUS), "frame {frame}");
        }
    }

    #[test]
    fn test_small_planet_end_altitude() {
        let flight = Flight::descent(1_000.0, 10);
        assert!((flight.altitude(9) - 10.0).abs() < 1e-9);
    }
}
