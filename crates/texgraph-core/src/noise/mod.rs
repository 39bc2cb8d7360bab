//! Seeded 2D noise fields used by the generator operators.
//!
//! Lattice noises hash integer cells through a shuffled [`Lattice`]. A
//! lattice may wrap with an integer period, which is what makes generated
//! textures tile.

mod cellular;
mod lattice;
mod octaves;
mod perlin;

pub use cellular::{CellFeature, Cellular, Metric};
pub use lattice::Lattice;
pub use octaves::{Fractal, Octaves};
pub use perlin::Perlin;

/// A continuous 2D scalar field.
pub trait NoiseField {
    /// Field value, roughly in [-1, 1].
    fn signed(&self, x: f64, y: f64) -> f64;

    /// Field value remapped and clamped to [0, 1].
    fn unit(&self, x: f64, y: f64) -> f64 {
        (0.5 + 0.5 * self.signed(x, y)).clamp(0.0, 1.0)
    }
}

/// Smootherstep weight used between lattice corners.
#[inline]
pub(crate) fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}
