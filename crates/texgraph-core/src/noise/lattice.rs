//! Shuffled permutation table for hashing integer cells.

use crate::rng::SeedStream;

/// Hashes integer lattice points to bytes, optionally wrapping every
/// `period` cells on each axis.
#[derive(Clone)]
pub struct Lattice {
    perm: [u8; 512],
    period: Option<(i32, i32)>,
}

impl Lattice {
    pub fn new(seed: u32, stream: &str) -> Self {
        let mut table: Vec<u8> = (0..=255).collect();
        SeedStream::new(seed, stream).shuffle(&mut table);
        let mut perm = [0u8; 512];
        for (i, slot) in perm.iter_mut().enumerate() {
            *slot = table[i & 255];
        }
        Self { perm, period: None }
    }

    /// Repeat every `px` by `py` cells. Zero is treated as one.
    pub fn periodic(mut self, px: u32, py: u32) -> Self {
        let clamp = |p: u32| i32::try_from(p.max(1)).unwrap_or(i32::MAX);
        self.period = Some((clamp(px), clamp(py)));
        self
    }

    pub fn period(&self) -> Option<(i32, i32)> {
        self.period
    }

    pub fn hash(&self, x: i32, y: i32) -> u8 {
        let (x, y) = match self.period {
            Some((px, py)) => (x.rem_euclid(px), y.rem_euclid(py)),
            None => (x, y),
        };
        let row = self.perm[(y & 255) as usize] as usize;
        self.perm[row + (x & 255) as usize]
    }
}
