//! Render surfaces the preview thread can drive.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::{validate_resolution, TextureBuffer};
use crate::color::Color;

use super::{PreviewError, PreviewFrame};

/// A presentable target owned by the render thread.
///
/// `init` runs once before the first frame, `teardown` once after the last.
pub trait RenderSurface: Send {
    fn init(&mut self) -> Result<(), PreviewError>;

    fn present(&mut self, frame: &PreviewFrame) -> Result<(), PreviewError>;

    fn teardown(&mut self);
}

/// How [`PixelSurface`] shows alpha.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Raw RGBA.
    Color,
    /// Composited over a gray checkerboard.
    #[default]
    Checker,
    /// Alpha channel as gray.
    Alpha,
}

impl DisplayMode {
    pub const ALL: [DisplayMode; 3] = [DisplayMode::Color, DisplayMode::Checker, DisplayMode::Alpha];

    pub fn as_str(self) -> &'static str {
        match self {
            DisplayMode::Color => "color",
            DisplayMode::Checker => "checker",
            DisplayMode::Alpha => "alpha",
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DisplayMode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown display mode '{s}' (expected color, checker or alpha)"))
    }
}

/// Checkerboard cell edge in pixels.
const CHECKER_CELL: u32 = 8;
const CHECKER_LIGHT: f64 = 1.0;
const CHECKER_DARK: f64 = 0.75;

/// CPU surface that keeps the last presented frame as a square RGBA image.
#[derive(Debug, Clone)]
pub struct PixelSurface {
    size: u32,
    mode: DisplayMode,
    initialized: bool,
    pixels: Option<TextureBuffer>,
    last_epoch: Option<u64>,
    presented: usize,
}

impl PixelSurface {
    pub fn new(size: u32, mode: DisplayMode) -> Self {
        Self {
            size,
            mode,
            initialized: false,
            pixels: None,
            last_epoch: None,
            presented: 0,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The last presented image, after scaling and display mode.
    pub fn pixels(&self) -> Option<&TextureBuffer> {
        self.pixels.as_ref()
    }

    pub fn last_epoch(&self) -> Option<u64> {
        self.last_epoch
    }

    /// Number of frames presented since `init`.
    pub fn presented(&self) -> usize {
        self.presented
    }

    fn display(&self, source: &TextureBuffer) -> TextureBuffer {
        TextureBuffer::from_fn(self.size, self.size, |x, y| {
            let c = source.get(x, y);
            match self.mode {
                DisplayMode::Color => c,
                DisplayMode::Checker => {
                    let bg = if ((x / CHECKER_CELL) + (y / CHECKER_CELL)) % 2 == 0 {
                        CHECKER_LIGHT
                    } else {
                        CHECKER_DARK
                    };
                    let a = c.a.clamp(0.0, 1.0);
                    Color::rgb(
                        c.r * a + bg * (1.0 - a),
                        c.g * a + bg * (1.0 - a),
                        c.b * a + bg * (1.0 - a),
                    )
                }
                DisplayMode::Alpha => Color::gray(c.a),
            }
        })
    }
}

impl RenderSurface for PixelSurface {
    fn init(&mut self) -> Result<(), PreviewError> {
        validate_resolution(self.size, self.size).map_err(|e| PreviewError::Init(e.to_string()))?;
        self.initialized = true;
        self.presented = 0;
        debug!(size = self.size, mode = %self.mode, "pixel surface initialized");
        Ok(())
    }

    fn present(&mut self, frame: &PreviewFrame) -> Result<(), PreviewError> {
        if !self.initialized {
            return Err(PreviewError::Present("surface not initialized".into()));
        }
        let scaled = frame.image.resample(self.size, self.size).to_color();
        self.pixels = Some(self.display(&scaled));
        self.last_epoch = Some(frame.epoch);
        self.presented += 1;
        Ok(())
    }

    fn teardown(&mut self) {
        self.initialized = false;
    }
}
