//! Multi-octave fractal Brownian motion over simplex noise.
//!
//! Samples are taken on the unit sphere, so neighbouring cube faces see one
//! continuous noise field and tiles meet without seams.

use glam::DVec3;
use noise::{NoiseFn, Simplex};
use serde::{Deserialize, Serialize};

/// Octave stack for one fBm field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FbmParams {
    /// Noise seed.
    pub seed: u32,
    /// Octaves to composite.
    pub octaves: u32,
    /// Frequency multiplier between octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between octaves.
    pub persistence: f64,
    /// Frequency of the first octave, in cycles per unit-sphere radius.
    pub base_frequency: f64,
    /// Amplitude of the first octave.
    pub amplitude: f64,
}

impl Default for FbmParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 6,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 1.5,
            amplitude: 1.0,
        }
    }
}

/// An fBm noise field on the unit sphere.
pub struct Fbm {
    noise: Simplex,
    params: FbmParams,
}

impl Fbm {
    #[must_use]
    pub fn new(params: FbmParams) -> Self {
        Self {
            noise: Simplex::new(params.seed),
            params,
        }
    }

    /// Raw sum of all octaves at `point`, in `[-max_amplitude, max_amplitude]`.
    #[must_use]
    pub fn sample(&self, point: DVec3) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude;
        for _ in 0..self.params.octaves {
            let p = point * frequency;
            total += self.noise.get([p.x, p.y, p.z]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }
        total
    }

    /// Sample remapped to `[-1, 1]`. Zero when the field has no amplitude.
    #[must_use]
    pub fn sample_normalized(&self, point: DVec3) -> f64 {
        let max = self.max_amplitude();
        if max == 0.0 {
            return 0.0;
        }
        (self.sample(point) / max).clamp(-1.0, 1.0)
    }

    /// Geometric sum of the octave amplitudes.
    #[must_use]
    pub fn max_amplitude(&self) -> f64 {
        let mut sum = 0.0;
        let mut amp = self.params.amplitude;
        for _ in 0..self.params.octaves {
            sum += amp;
            amp *= self.params.persistence;
        }
        sum
    }

    #[must_use]
    pub fn params(&self) -> &FbmParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_value() {
        let a = Fbm::new(FbmParams {
            seed: 42,
            ..Default::default()
        });
        let b = Fbm::new(FbmParams {
            seed: 42,
            ..Default::default()
        });
        let p = DVec3::new(0.3, -0.5, 0.81).normalize();
        assert_eq!(a.sample(p), b.sample(p));
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = Fbm::new(FbmParams {
            seed: 1,
            ..Default::default()
        });
        let b = Fbm::new(FbmParams {
            seed: 2,
            ..Default::default()
        });
        let differs = (0..32).any(|i| {
            let t = f64::from(i) * 0.1;
            let p = DVec3::new(t.cos(), t.sin(), 0.3).normalize();
            (a.sample(p) - b.sample(p)).abs() > 1e-9
        });
        assert!(differs, "different seeds should give different fields");
    }

    #[test]
    fn test_normalized_range() {
        let fbm = Fbm::new(FbmParams {
            seed: 7,
            octaves: 8,
            ..Default::default()
        });
        for i in 0..200 {
            let t = f64::from(i) * 0.137;
            let p = DVec3::new(t.sin(), (t * 1.3).cos(), (t * 0.7).sin()).normalize();
            let v = fbm.sample_normalized(p);
            assert!((-1.0..=1.0).contains(&v), "sample {v} out of range");
        }
    }

    #[test]
    fn test_max_amplitude_is_geometric_sum() {
        let fbm = Fbm::new(FbmParams {
            octaves: 3,
            amplitude: 4.0,
            persistence: 0.5,
            ..Default::default()
        });
        assert!((fbm.max_amplitude() - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_octaves_is_flat() {
        let fbm = Fbm::new(FbmParams {
            octaves: 0,
            ..Default::default()
        });
        assert_eq!(fbm.sample_normalized(DVec3::X), 0.0);
    }
}
