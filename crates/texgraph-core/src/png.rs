//! PNG export of evaluated buffers.
//!
//! Encoder settings are fixed per [`PngConfig`], so a buffer always encodes
//! to the same bytes and the BLAKE3 digest of those bytes identifies it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use png::{BitDepth, ColorType, Compression, Encoder, FilterType};
use thiserror::Error;

use crate::buffer::ImageBuffer;

#[derive(Debug, Error)]
pub enum PngError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PNG encoding error: {0}")]
    Encoding(#[from] png::EncodingError),

    #[error("cannot encode a {width}x{height} image")]
    InvalidDimensions { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct PngConfig {
    pub compression: Compression,
    pub filter: FilterType,
}

impl Default for PngConfig {
    fn default() -> Self {
        Self {
            compression: Compression::Default,
            filter: FilterType::NoFilter,
        }
    }
}

impl PngConfig {
    /// Smaller files, slower to encode.
    pub fn best_compression() -> Self {
        Self {
            compression: Compression::Best,
            filter: FilterType::Paeth,
        }
    }
}

/// An encoded file and its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPng {
    pub bytes: Vec<u8>,
    /// Lowercase hex BLAKE3 digest of `bytes`.
    pub hash: String,
}

/// Grayscale buffers become 8-bit gray PNGs; color and normal buffers
/// become 8-bit RGBA.
pub fn write_to<W: Write>(
    image: &ImageBuffer,
    writer: W,
    config: &PngConfig,
) -> Result<(), PngError> {
    let (width, height) = image.resolution();
    if width == 0 || height == 0 {
        return Err(PngError::InvalidDimensions { width, height });
    }
    let (color, pixels) = match image {
        ImageBuffer::Grayscale(_) => (ColorType::Grayscale, image.to_gray8()),
        ImageBuffer::Color(_) | ImageBuffer::Normal(_) => (ColorType::Rgba, image.to_rgba8()),
    };

    let mut encoder = Encoder::new(writer, width, height);
    encoder.set_color(color);
    encoder.set_depth(BitDepth::Eight);
    encoder.set_compression(config.compression);
    encoder.set_filter(config.filter);
    encoder.write_header()?.write_image_data(&pixels)?;
    Ok(())
}

pub fn write_image(image: &ImageBuffer, path: &Path, config: &PngConfig) -> Result<(), PngError> {
    write_to(image, BufWriter::new(File::create(path)?), config)
}

pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Encode in memory.
pub fn encode(image: &ImageBuffer, config: &PngConfig) -> Result<EncodedPng, PngError> {
    let mut bytes = Vec::new();
    write_to(image, &mut bytes, config)?;
    let hash = content_hash(&bytes);
    Ok(EncodedPng { bytes, hash })
}
