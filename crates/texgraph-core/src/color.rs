//! RGBA color values used by color buffers and color parameters.

use serde::{Deserialize, Serialize};

/// Luma weights applied when a color is reduced to one channel.
const LUMA: [f64; 3] = [0.299, 0.587, 0.114];

/// Straight (non-premultiplied) RGBA, nominally in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    #[serde(default = "opaque")]
    pub a: f64,
}

fn opaque() -> f64 {
    1.0
}

impl Color {
    pub const fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque gray.
    pub const fn gray(value: f64) -> Self {
        Self::rgb(value, value, value)
    }

    pub const fn black() -> Self {
        Self::gray(0.0)
    }

    pub const fn white() -> Self {
        Self::gray(1.0)
    }

    /// Component-wise mix toward `other`; `t` is clamped to [0, 1].
    pub fn lerp(&self, other: &Color, t: f64) -> Color {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: f64, b: f64| a + (b - a) * t;
        Color::rgba(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
            mix(self.a, other.a),
        )
    }

    /// Every component clamped to [0, 1].
    pub fn saturate(&self) -> Color {
        let c = |v: f64| v.clamp(0.0, 1.0);
        Color::rgba(c(self.r), c(self.g), c(self.b), c(self.a))
    }

    /// Apply `f` to r, g and b; alpha is kept.
    pub fn map_rgb(&self, f: impl Fn(f64) -> f64) -> Color {
        Color::rgba(f(self.r), f(self.g), f(self.b), self.a)
    }

    pub fn luminance(&self) -> f64 {
        LUMA[0] * self.r + LUMA[1] * self.g + LUMA[2] * self.b
    }

    /// Quantize to 8 bits per channel after clamping.
    pub fn to_rgba8(&self) -> [u8; 4] {
        let c = self.saturate();
        [c.r, c.g, c.b, c.a].map(|v| (v * 255.0).round() as u8)
    }

    pub fn is_finite(&self) -> bool {
        [self.r, self.g, self.b, self.a].iter().all(|v| v.is_finite())
    }

    pub fn hsv(&self) -> Hsv {
        Hsv::from(*self)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::black()
    }
}

/// Hue in degrees [0, 360), saturation and value in [0, 1]. Alpha rides
/// along so round trips through HSV keep it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub h: f64,
    pub s: f64,
    pub v: f64,
    pub a: f64,
}

impl Hsv {
    /// Rotate the hue by `degrees`, wrapping.
    pub fn rotate(self, degrees: f64) -> Hsv {
        Hsv {
            h: (self.h + degrees).rem_euclid(360.0),
            ..self
        }
    }
}

impl From<Color> for Hsv {
    fn from(c: Color) -> Self {
        let max = c.r.max(c.g).max(c.b);
        let chroma = max - c.r.min(c.g).min(c.b);
        if chroma <= 1e-12 || max <= 0.0 {
            return Hsv {
                h: 0.0,
                s: 0.0,
                v: max,
                a: c.a,
            };
        }
        let sector = if max == c.r {
            ((c.g - c.b) / chroma).rem_euclid(6.0)
        } else if max == c.g {
            (c.b - c.r) / chroma + 2.0
        } else {
            (c.r - c.g) / chroma + 4.0
        };
        Hsv {
            h: sector * 60.0,
            s: chroma / max,
            v: max,
            a: c.a,
        }
    }
}

impl From<Hsv> for Color {
    fn from(hsv: Hsv) -> Self {
        let Hsv { h, s, v, a } = hsv;
        let h = h.rem_euclid(360.0) / 60.0;
        // Each channel sits at a fixed offset around the hue circle.
        let channel = |n: f64| {
            let k = (n + h) % 6.0;
            v - v * s * k.min(4.0 - k).clamp(0.0, 1.0)
        };
        Color::rgba(channel(5.0), channel(3.0), channel(1.0), a)
    }
}
