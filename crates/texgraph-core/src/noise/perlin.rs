//! Gradient noise.

use std::f64::consts::FRAC_1_SQRT_2;

use super::{fade, Lattice, NoiseField};

/// Eight unit gradients at 45 degree steps.
const GRADIENTS: [[f64; 2]; 8] = [
    [1.0, 0.0],
    [FRAC_1_SQRT_2, FRAC_1_SQRT_2],
    [0.0, 1.0],
    [-FRAC_1_SQRT_2, FRAC_1_SQRT_2],
    [-1.0, 0.0],
    [-FRAC_1_SQRT_2, -FRAC_1_SQRT_2],
    [0.0, -1.0],
    [FRAC_1_SQRT_2, -FRAC_1_SQRT_2],
];

/// Perlin gradient noise over a [`Lattice`].
#[derive(Clone)]
pub struct Perlin {
    lattice: Lattice,
}

impl Perlin {
    pub fn new(seed: u32) -> Self {
        Self {
            lattice: Lattice::new(seed, "perlin"),
        }
    }

    /// Tile every `px` by `py` units.
    pub fn periodic(self, px: u32, py: u32) -> Self {
        Self {
            lattice: self.lattice.periodic(px, py),
        }
    }

    fn corner(&self, cx: i32, cy: i32, dx: f64, dy: f64) -> f64 {
        let [gx, gy] = GRADIENTS[(self.lattice.hash(cx, cy) & 7) as usize];
        gx * dx + gy * dy
    }
}

impl NoiseField for Perlin {
    fn signed(&self, x: f64, y: f64) -> f64 {
        let (cx, cy) = (x.floor(), y.floor());
        let (dx, dy) = (x - cx, y - cy);
        let (cx, cy) = (cx as i32, cy as i32);

        let top = {
            let a = self.corner(cx, cy, dx, dy);
            let b = self.corner(cx + 1, cy, dx - 1.0, dy);
            a + (b - a) * fade(dx)
        };
        let bottom = {
            let a = self.corner(cx, cy + 1, dx, dy - 1.0);
            let b = self.corner(cx + 1, cy + 1, dx - 1.0, dy - 1.0);
            a + (b - a) * fade(dx)
        };
        // Unit gradients peak at sqrt(1/2); rescale to about [-1, 1].
        (top + (bottom - top) * fade(dy)) * std::f64::consts::SQRT_2
    }
}
