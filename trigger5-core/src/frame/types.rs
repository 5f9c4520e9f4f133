//! Source surfaces handed to the frame encoder.

use crate::error::Trigger5Error;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes per pixel, little-endian `0xXXRRGGBB`: B, G, R, padding.
    Xrgb8888,
    /// 3 bytes per pixel, little-endian `0xRRGGBB`: B, G, R.
    Rgb888,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Xrgb8888 => 4,
            PixelFormat::Rgb888 => 3,
        }
    }
}

// ── Rect ─────────────────────────────────────────────────────────

/// A damaged region of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge in pixels.
    pub x: u16,
    /// Top edge in pixels.
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// ── FrameSurface ─────────────────────────────────────────────────

/// A rendered frame from the display framework.
///
/// The `data` buffer holds `height` rows of `stride` bytes each; the
/// last row may stop right after its final pixel.
#[derive(Debug, Clone)]
pub struct FrameSurface {
    /// Frame width in pixels.
    pub width: u16,
    /// Frame height in pixels.
    pub height: u16,
    /// Row pitch in **bytes** (may exceed `width * bpp`).
    pub stride: usize,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Raw pixel data.
    pub data: Vec<u8>,
}

impl FrameSurface {
    /// A tightly packed XRGB8888 surface filled with zeros.
    pub fn xrgb8888(width: u16, height: u16) -> Self {
        let stride = usize::from(width) * 4;
        Self {
            width,
            height,
            stride,
            format: PixelFormat::Xrgb8888,
            data: vec![0; stride * usize::from(height)],
        }
    }

    /// Bytes of pixel data in one row, excluding padding.
    pub fn row_len(&self) -> usize {
        usize::from(self.width) * self.format.bytes_per_pixel()
    }

    /// Minimum `data` length for this geometry.
    pub fn required_len(&self) -> usize {
        match self.height {
            0 => 0,
            h => self.stride * (usize::from(h) - 1) + self.row_len(),
        }
    }

    /// Check that the surface can be encoded.
    pub fn validate(&self) -> Result<(), Trigger5Error> {
        if self.format != PixelFormat::Xrgb8888 {
            return Err(Trigger5Error::UnsupportedFormat);
        }
        if self.stride < self.row_len() {
            return Err(Trigger5Error::SurfaceTooSmall {
                needed: self.row_len(),
                actual: self.stride,
            });
        }
        let needed = self.required_len();
        if self.data.len() < needed {
            return Err(Trigger5Error::SurfaceTooSmall {
                needed,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Write one pixel as `0x00RRGGBB`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn put_pixel(&mut self, x: u16, y: u16, rgb: u32) {
        let offset = usize::from(y) * self.stride + usize::from(x) * 4;
        self.data[offset..offset + 4].copy_from_slice(&(rgb & 0x00FF_FFFF).to_le_bytes());
    }

    /// Fill the whole surface with `0x00RRGGBB`.
    pub fn fill(&mut self, rgb: u32) {
        for y in 0..self.height {
            for x in 0..self.width {
                self.put_pixel(x, y, rgb);
            }
        }
    }
}

// ── FrameSource ──────────────────────────────────────────────────

/// Supplies the frame buffer currently on screen.
pub trait FrameSource {
    fn current_frame(&mut self) -> Result<FrameSurface, Trigger5Error>;
}
