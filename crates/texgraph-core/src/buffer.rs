//! Raster buffers flowing between nodes.
//!
//! Buffers are produced once by an operator and then shared read-only through
//! [`SharedImage`]; a newer result replaces the `Arc`, never the pixels.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::GraphError;

/// Largest accepted edge length for a graph resolution.
pub const MAX_DIMENSION: u32 = 4096;

/// Image buffer shared between a cache slot and its readers.
pub type SharedImage = Arc<ImageBuffer>;

/// Channel-type tag carried by sockets and buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    /// Single channel.
    Grayscale,
    /// RGBA.
    Color,
    /// Tangent-space normal encoded in RGB.
    Normal,
}

impl ChannelType {
    /// Whether a socket of this type accepts data of type `source`.
    ///
    /// Grayscale and normal data promote into color sockets. Nothing is
    /// implicitly narrowed.
    pub fn accepts(self, source: ChannelType) -> bool {
        self == source
            || matches!(
                (self, source),
                (ChannelType::Color, ChannelType::Grayscale)
                    | (ChannelType::Color, ChannelType::Normal)
            )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelType::Grayscale => "grayscale",
            ChannelType::Color => "color",
            ChannelType::Normal => "normal",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check a graph resolution against the supported bounds.
pub fn validate_resolution(width: u32, height: u32) -> Result<(), GraphError> {
    if width == 0 || height == 0 {
        return Err(GraphError::InvalidResolution(format!(
            "resolution must be at least 1x1, got [{}, {}]",
            width, height
        )));
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(GraphError::InvalidResolution(format!(
            "resolution is too large: max is {}x{}, got [{}, {}]",
            MAX_DIMENSION, MAX_DIMENSION, width, height
        )));
    }
    Ok(())
}

/// Pixel values that can be interpolated.
pub trait Texel: Copy {
    fn mix(self, other: Self, t: f64) -> Self;
}

impl Texel for f64 {
    #[inline]
    fn mix(self, other: f64, t: f64) -> f64 {
        self + (other - self) * t
    }
}

impl Texel for Color {
    #[inline]
    fn mix(self, other: Color, t: f64) -> Color {
        self.lerp(&other, t)
    }
}

/// Row-major pixel grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<P> {
    pub width: u32,
    pub height: u32,
    pub data: Vec<P>,
}

/// One channel per pixel.
pub type GrayscaleBuffer = Raster<f64>;

/// Straight RGBA per pixel.
pub type TextureBuffer = Raster<Color>;

impl<P: Texel> Raster<P> {
    pub fn new(width: u32, height: u32, fill: P) -> Self {
        Self {
            width,
            height,
            data: vec![fill; width as usize * height as usize],
        }
    }

    /// Build a buffer by evaluating `f` at every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> P) -> Self {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> P {
        self.data[self.offset(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: P) {
        let i = self.offset(x, y);
        self.data[i] = value;
    }

    /// Pixel lookup with coordinates wrapped onto the torus.
    #[inline]
    pub fn get_wrapped(&self, x: i32, y: i32) -> P {
        let w = i64::from(self.width);
        let h = i64::from(self.height);
        self.get(
            i64::from(x).rem_euclid(w) as u32,
            i64::from(y).rem_euclid(h) as u32,
        )
    }

    /// Same-size buffer with `f` applied to every pixel.
    pub fn map<Q: Texel>(&self, f: impl Fn(P) -> Q) -> Raster<Q> {
        Raster {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&p| f(p)).collect(),
        }
    }

    /// Bilinear sample at pixel-space `(x, y)`, wrapping at every edge.
    pub fn sample_wrapped(&self, x: f64, y: f64) -> P {
        let (xf, yf) = (x.floor(), y.floor());
        let (tx, ty) = (x - xf, y - yf);
        let (x0, y0) = (xf as i32, yf as i32);
        let top = self.get_wrapped(x0, y0).mix(self.get_wrapped(x0 + 1, y0), tx);
        let bottom = self
            .get_wrapped(x0, y0 + 1)
            .mix(self.get_wrapped(x0 + 1, y0 + 1), tx);
        top.mix(bottom, ty)
    }

    /// Bilinear sample at normalized `(u, v)`, clamped to the edges.
    pub fn sample_bilinear(&self, u: f64, v: f64) -> P {
        let max_x = self.width.saturating_sub(1);
        let max_y = self.height.saturating_sub(1);
        let x = u.clamp(0.0, 1.0) * f64::from(max_x);
        let y = v.clamp(0.0, 1.0) * f64::from(max_y);
        let (x0, y0) = (x as u32, y as u32);
        let (x1, y1) = ((x0 + 1).min(max_x), (y0 + 1).min(max_y));
        let (tx, ty) = (x.fract(), y.fract());
        let top = self.get(x0, y0).mix(self.get(x1, y0), tx);
        let bottom = self.get(x0, y1).mix(self.get(x1, y1), tx);
        top.mix(bottom, ty)
    }

    /// Bilinear resize; a matching size is a plain copy.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if (self.width, self.height) == (width, height) {
            return self.clone();
        }
        let axis = |i: u32, n: u32| {
            if n > 1 {
                f64::from(i) / f64::from(n - 1)
            } else {
                0.5
            }
        };
        Self::from_fn(width, height, |x, y| {
            self.sample_bilinear(axis(x, width), axis(y, height))
        })
    }
}

impl GrayscaleBuffer {
    /// Quantized to one byte per pixel after clamping.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect()
    }
}

impl TextureBuffer {
    pub fn to_grayscale(&self) -> GrayscaleBuffer {
        self.map(|c| c.luminance())
    }

    pub fn to_rgba8(&self) -> Vec<u8> {
        self.data.iter().flat_map(|c| c.to_rgba8()).collect()
    }
}

/// A finished raster produced by one operator output.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageBuffer {
    Grayscale(GrayscaleBuffer),
    Color(TextureBuffer),
    /// Normal vectors remapped to [0, 1] in RGB.
    Normal(TextureBuffer),
}

impl ImageBuffer {
    pub fn channel_type(&self) -> ChannelType {
        match self {
            ImageBuffer::Grayscale(_) => ChannelType::Grayscale,
            ImageBuffer::Color(_) => ChannelType::Color,
            ImageBuffer::Normal(_) => ChannelType::Normal,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            ImageBuffer::Grayscale(b) => b.width,
            ImageBuffer::Color(b) | ImageBuffer::Normal(b) => b.width,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            ImageBuffer::Grayscale(b) => b.height,
            ImageBuffer::Color(b) | ImageBuffer::Normal(b) => b.height,
        }
    }

    /// `(width, height)` pair.
    pub fn resolution(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn as_grayscale(&self) -> Option<&GrayscaleBuffer> {
        match self {
            ImageBuffer::Grayscale(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<&TextureBuffer> {
        match self {
            ImageBuffer::Color(b) | ImageBuffer::Normal(b) => Some(b),
            ImageBuffer::Grayscale(_) => None,
        }
    }

    /// Color view of the buffer, expanding grayscale.
    pub fn to_color(&self) -> TextureBuffer {
        match self {
            ImageBuffer::Grayscale(b) => b.map(Color::gray),
            ImageBuffer::Color(b) | ImageBuffer::Normal(b) => b.clone(),
        }
    }

    /// Grayscale view of the buffer, reducing color to luminance.
    pub fn to_grayscale(&self) -> GrayscaleBuffer {
        match self {
            ImageBuffer::Grayscale(b) => b.clone(),
            ImageBuffer::Color(b) | ImageBuffer::Normal(b) => b.to_grayscale(),
        }
    }

    /// 8-bit RGBA bytes, row-major.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.to_color().to_rgba8()
    }

    /// 8-bit gray bytes, row-major.
    pub fn to_gray8(&self) -> Vec<u8> {
        self.to_grayscale().to_bytes()
    }

    /// Reinterpret this buffer for a socket of type `target`.
    ///
    /// Callers check [`ChannelType::accepts`] first; an incompatible request
    /// falls back to the nearest conversion.
    pub fn coerce(&self, target: ChannelType) -> ImageBuffer {
        match (target, self) {
            (ChannelType::Grayscale, ImageBuffer::Grayscale(_))
            | (ChannelType::Color, ImageBuffer::Color(_))
            | (ChannelType::Normal, ImageBuffer::Normal(_)) => self.clone(),
            (ChannelType::Grayscale, _) => ImageBuffer::Grayscale(self.to_grayscale()),
            (ChannelType::Color, _) => ImageBuffer::Color(self.to_color()),
            (ChannelType::Normal, _) => ImageBuffer::Normal(self.to_color()),
        }
    }

    /// Whether every stored value is finite.
    pub fn is_finite(&self) -> bool {
        match self {
            ImageBuffer::Grayscale(b) => b.data.iter().all(|v| v.is_finite()),
            ImageBuffer::Color(b) | ImageBuffer::Normal(b) => b.data.iter().all(Color::is_finite),
        }
    }

    /// Resample to `width` x `height` with bilinear filtering.
    pub fn resample(&self, width: u32, height: u32) -> ImageBuffer {
        match self {
            ImageBuffer::Grayscale(b) => ImageBuffer::Grayscale(b.resized(width, height)),
            ImageBuffer::Color(b) => ImageBuffer::Color(b.resized(width, height)),
            ImageBuffer::Normal(b) => ImageBuffer::Normal(b.resized(width, height)),
        }
    }
}

/// `image` as read by a socket of type `channel` at `width` x `height`.
/// A buffer that already matches is shared, not copied.
pub fn conform(image: &SharedImage, channel: ChannelType, width: u32, height: u32) -> SharedImage {
    let sized = image.resolution() == (width, height);
    match (image.channel_type() == channel, sized) {
        (true, true) => Arc::clone(image),
        (true, false) => Arc::new(image.resample(width, height)),
        (false, true) => Arc::new(image.coerce(channel)),
        (false, false) => Arc::new(image.coerce(channel).resample(width, height)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn texture_buffer_get_set_and_wrapping() {
        let mut buf = TextureBuffer::new(2, 2, Color::black());
        buf.set(0, 0, Color::rgb(1.0, 0.0, 0.0));
        buf.set(1, 0, Color::rgb(0.0, 1.0, 0.0));
        buf.set(0, 1, Color::rgb(0.0, 0.0, 1.0));
        buf.set(1, 1, Color::rgb(1.0, 1.0, 1.0));

        assert_eq!(buf.get_wrapped(-1, -1), Color::rgb(1.0, 1.0, 1.0));
        assert_eq!(buf.get_wrapped(-2, 0), Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(buf.get_wrapped(2, 1), Color::rgb(0.0, 0.0, 1.0));
    }

    #[test]
    fn texture_buffer_sample_bilinear_center_is_average() {
        // 0 1
        // 1 0
        let mut buf = TextureBuffer::new(2, 2, Color::black());
        buf.set(1, 0, Color::gray(1.0));
        buf.set(0, 1, Color::gray(1.0));

        let c = buf.sample_bilinear(0.5, 0.5);
        assert!(approx_eq(c.r, 0.5), "expected 0.5, got {}", c.r);
        assert!(approx_eq(c.a, 1.0));
    }

    #[test]
    fn sample_wrapped_interpolates_across_edge() {
        let mut buf = TextureBuffer::new(2, 1, Color::black());
        buf.set(0, 0, Color::gray(1.0));
        // Halfway between x=1 (black) and x=2 which wraps to x=0 (white).
        let c = buf.sample_wrapped(1.5, 0.0);
        assert!(approx_eq(c.r, 0.5));
    }

    #[test]
    fn grayscale_buffer_wrapping_and_bytes() {
        let mut buf = GrayscaleBuffer::new(2, 2, 0.0);
        buf.set(1, 0, 0.5);
        buf.set(0, 1, 1.0);
        buf.set(1, 1, -1.0);

        assert!(approx_eq(buf.get_wrapped(-1, -1), -1.0));
        assert_eq!(buf.to_bytes(), vec![0, 128, 255, 0]);
    }

    #[test]
    fn channel_compatibility_rules() {
        use ChannelType::*;
        assert!(Grayscale.accepts(Grayscale));
        assert!(Color.accepts(Grayscale));
        assert!(Color.accepts(Normal));
        assert!(Normal.accepts(Normal));
        assert!(!Grayscale.accepts(Color));
        assert!(!Normal.accepts(Color));
        assert!(!Normal.accepts(Grayscale));
    }

    #[test]
    fn coerce_promotes_grayscale_to_color() {
        let gray = ImageBuffer::Grayscale(GrayscaleBuffer::new(1, 1, 0.25));
        let color = gray.coerce(ChannelType::Color);
        assert_eq!(color.channel_type(), ChannelType::Color);
        assert_eq!(color.as_color().unwrap().get(0, 0), Color::gray(0.25));
    }

    #[test]
    fn resample_changes_resolution_and_keeps_constant_values() {
        let img = ImageBuffer::Grayscale(GrayscaleBuffer::new(4, 4, 0.3));
        let out = img.resample(8, 2);
        assert_eq!(out.resolution(), (8, 2));
        assert!(out.as_grayscale().unwrap().data.iter().all(|&v| approx_eq(v, 0.3)));
    }

    #[test]
    fn conform_shares_matching_buffers() {
        let image: SharedImage = Arc::new(ImageBuffer::Grayscale(GrayscaleBuffer::new(4, 4, 0.5)));
        let same = conform(&image, ChannelType::Grayscale, 4, 4);
        assert!(Arc::ptr_eq(&same, &image));

        let promoted = conform(&image, ChannelType::Color, 4, 4);
        assert!(!Arc::ptr_eq(&promoted, &image));
        assert_eq!(promoted.channel_type(), ChannelType::Color);

        let resized = conform(&image, ChannelType::Grayscale, 2, 8);
        assert_eq!(resized.resolution(), (2, 8));
        assert_eq!(resized.channel_type(), ChannelType::Grayscale);
    }

    #[test]
    fn is_finite_detects_nan() {
        let mut buf = GrayscaleBuffer::new(2, 2, 0.0);
        assert!(ImageBuffer::Grayscale(buf.clone()).is_finite());
        buf.set(1, 1, f64::NAN);
        assert!(!ImageBuffer::Grayscale(buf).is_finite());
    }

    #[test]
    fn validate_resolution_bounds() {
        assert!(validate_resolution(1, 1).is_ok());
        assert!(validate_resolution(MAX_DIMENSION, MAX_DIMENSION).is_ok());
        assert!(validate_resolution(0, 16).is_err());
        assert!(validate_resolution(MAX_DIMENSION + 1, 16).is_err());
    }
}
