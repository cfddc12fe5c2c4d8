//! Per-level split distances.

/// `distances[0]` is the planet radius and every deeper level is
/// `distance_multiplier` times closer. A quad at level `L` splits inside
/// `distances[L]`.
#[derive(Clone, Debug, PartialEq)]
pub struct LodDistances {
    distances: Vec<f64>,
    hysteresis: f64,
}

impl LodDistances {
    /// Table for levels `0..=max_level`.
    #[must_use]
    pub fn new(radius: f64, multiplier: f64, max_level: u8, hysteresis: f64) -> Self {
        let mut distances = Vec::with_capacity(usize::from(max_level) + 1);
        let mut d = radius;
        for _ in 0..=max_level {
            distances.push(d);
            d /= multiplier;
        }
        Self {
            distances,
            hysteresis,
        }
    }

    /// Split distance of `level`; zero past the table.
    #[must_use]
    pub fn split_distance(&self, level: u8) -> f64 {
        self.distances.get(usize::from(level)).copied().unwrap_or(0.0)
    }

    /// Distance beyond which the children of a `level` quad merge.
    #[must_use]
    pub fn merge_distance(&self, level: u8) -> f64 {
        self.split_distance(level) * self.hysteresis
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.distances
    }

    /// Deepest level in the table.
    #[must_use]
    pub fn max_level(&self) -> u8 {
        u8::try_from(self.distances.len().saturating_sub(1)).unwrap_or(u8::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_halves_from_radius() {
        let table = LodDistances::new(1000.0, 2.0, 4, 1.25);
        assert_eq!(table.as_slice(), &[1000.0, 500.0, 250.0, 125.0, 62.5]);
        assert_eq!(table.max_level(), 4);
    }

    #[test]
    fn test_merge_is_farther_than_split() {
        let table = LodDistances::new(6_371_000.0, 3.0, 8, 1.5);
        for level in 0..=8 {
            assert!(table.merge_distance(level) > table.split_distance(level));
        }
        assert_eq!(table.split_distance(9), 0.0);
    }
}
