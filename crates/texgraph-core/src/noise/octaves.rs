//! Fractal sums of a base field.

use super::NoiseField;

/// How octaves are stacked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Octaves {
    pub count: u32,
    /// Amplitude ratio between successive octaves.
    pub persistence: f64,
    /// Frequency ratio between successive octaves. Keep it integral to
    /// preserve a periodic base field's period.
    pub lacunarity: f64,
}

impl Default for Octaves {
    fn default() -> Self {
        Self {
            count: 4,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

/// A base field summed over [`Octaves`], normalized by total amplitude.
#[derive(Clone)]
pub struct Fractal<F> {
    base: F,
    octaves: Octaves,
}

impl<F: NoiseField> Fractal<F> {
    pub fn new(base: F, octaves: Octaves) -> Self {
        Self { base, octaves }
    }
}

impl<F: NoiseField> NoiseField for Fractal<F> {
    fn signed(&self, x: f64, y: f64) -> f64 {
        let Octaves {
            count,
            persistence,
            lacunarity,
        } = self.octaves;

        let (mut sum, mut norm) = (0.0, 0.0);
        let (mut amplitude, mut frequency) = (1.0, 1.0);
        for _ in 0..count.max(1) {
            sum += amplitude * self.base.signed(x * frequency, y * frequency);
            norm += amplitude;
            amplitude *= persistence;
            frequency *= lacunarity;
        }
        if norm > 0.0 {
            sum / norm
        } else {
            0.0
        }
    }
}
