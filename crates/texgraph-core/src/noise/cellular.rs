//! Cellular (Worley) noise.

use serde::{Deserialize, Serialize};

use super::{Lattice, NoiseField};
use crate::rng::SeedStream;

/// Distance between a sample and a feature point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Euclidean,
    Manhattan,
    Chebyshev,
}

impl Metric {
    fn measure(self, dx: f64, dy: f64) -> f64 {
        match self {
            Metric::Euclidean => dx.hypot(dy),
            Metric::Manhattan => dx.abs() + dy.abs(),
            Metric::Chebyshev => dx.abs().max(dy.abs()),
        }
    }
}

/// Which nearest-point distance the field reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellFeature {
    F1,
    F2,
    /// Bright along cell borders.
    F2MinusF1,
}

/// One jittered feature point per lattice cell.
///
/// The point of a cell is looked up through the lattice hash, so a periodic
/// lattice repeats the whole cell layout.
#[derive(Clone)]
pub struct Cellular {
    lattice: Lattice,
    offsets: Vec<[f64; 2]>,
    jitter: f64,
    metric: Metric,
    feature: CellFeature,
}

impl Cellular {
    pub fn new(seed: u32) -> Self {
        let mut stream = SeedStream::new(seed, "cellular-offsets");
        Self {
            lattice: Lattice::new(seed, "cellular"),
            offsets: (0..256).map(|_| stream.point()).collect(),
            jitter: 1.0,
            metric: Metric::Euclidean,
            feature: CellFeature::F1,
        }
    }

    /// 0 places every point at its cell center.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn feature(mut self, feature: CellFeature) -> Self {
        self.feature = feature;
        self
    }

    pub fn periodic(mut self, px: u32, py: u32) -> Self {
        self.lattice = self.lattice.periodic(px, py);
        self
    }

    fn feature_point(&self, cx: i32, cy: i32) -> [f64; 2] {
        let [ox, oy] = self.offsets[self.lattice.hash(cx, cy) as usize];
        [
            cx as f64 + 0.5 + (ox - 0.5) * self.jitter,
            cy as f64 + 0.5 + (oy - 0.5) * self.jitter,
        ]
    }

    /// Distances to the nearest and second nearest feature points.
    pub fn nearest(&self, x: f64, y: f64) -> (f64, f64) {
        let (cx, cy) = (x.floor() as i32, y.floor() as i32);
        let mut best = (f64::INFINITY, f64::INFINITY);
        for ny in cy - 1..=cy + 1 {
            for nx in cx - 1..=cx + 1 {
                let [px, py] = self.feature_point(nx, ny);
                let d = self.metric.measure(x - px, y - py);
                if d < best.0 {
                    best = (d, best.0);
                } else if d < best.1 {
                    best.1 = d;
                }
            }
        }
        best
    }
}

impl NoiseField for Cellular {
    /// Maps distance `d` to `2d - 1`, so [`NoiseField::unit`] yields `d`
    /// clamped to [0, 1].
    fn signed(&self, x: f64, y: f64) -> f64 {
        let (f1, f2) = self.nearest(x, y);
        let d = match self.feature {
            CellFeature::F1 => f1,
            CellFeature::F2 => f2,
            CellFeature::F2MinusF1 => f2 - f1,
        };
        2.0 * d - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_distance_not_below_first() {
        let noise = Cellular::new(42);
        for i in 0..50 {
            let (f1, f2) = noise.nearest(i as f64 * 0.31, i as f64 * 0.17);
            assert!(f2 >= f1);
        }
    }

    #[test]
    fn zero_jitter_is_a_regular_grid() {
        let noise = Cellular::new(8).jitter(0.0);
        let (f1, _) = noise.nearest(3.5, 7.5);
        assert!(f1.abs() < 1e-12);
    }

    #[test]
    fn period_repeats() {
        let noise = Cellular::new(5).periodic(3, 3);
        assert!((noise.signed(0.4, 1.2) - noise.signed(3.4, 4.2)).abs() < 1e-12);
    }

    #[test]
    fn metrics_differ() {
        let euclid = Cellular::new(2);
        let manhattan = Cellular::new(2).metric(Metric::Manhattan);
        assert!((0..20).any(|i| {
            let p = 0.13 + i as f64 * 0.29;
            euclid.signed(p, p * 1.7) != manhattan.signed(p, p * 1.7)
        }));
    }
}
