//! Decoded frame container.
//!
//! Every source hands out `Frame` values holding tightly packed RGB24 pixels.
//! Annotators draw into a copy of the frame and return it wrapped in an
//! `AnnotatedFrame` (see `detect`).

use anyhow::{anyhow, Result};

/// Bytes per RGB24 pixel.
pub const RGB_CHANNELS: usize = 3;

/// One decoded RGB24 frame.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// 1-based position of this frame in its source's stream.
    pub sequence: u64,
}

impl Frame {
    /// Wrap packed RGB24 pixels. Fails when the buffer does not match the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// RGB value at (x, y), or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = self.offset(x, y);
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = self.offset(x, y);
        self.data[offset..offset + RGB_CHANNELS].copy_from_slice(&color);
    }

    /// Draw a rectangle outline with the given stroke width. Coordinates are
    /// clamped to the frame; an inverted rectangle draws nothing.
    pub fn draw_rect(&mut self, x0: u32, y0: u32, x1: u32, y1: u32, stroke: u32, color: [u8; 3]) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let x1 = x1.min(self.width - 1);
        let y1 = y1.min(self.height - 1);
        if x0 > x1 || y0 > y1 {
            return;
        }
        for t in 0..stroke.max(1) {
            for x in x0..=x1 {
                self.set_pixel(x, y0.saturating_add(t).min(y1), color);
                self.set_pixel(x, y1.saturating_sub(t).max(y0), color);
            }
            for y in y0..=y1 {
                self.set_pixel(x0.saturating_add(t).min(x1), y, color);
                self.set_pixel(x1.saturating_sub(t).max(x0), y, color);
            }
        }
    }

    /// BT.601 luma of every pixel, row-major.
    pub fn luma(&self) -> Vec<u8> {
        self.data
            .chunks_exact(RGB_CHANNELS)
            .map(|px| {
                let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                y.round().clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * RGB_CHANNELS
    }
}

/// Packed RGB24 buffer length for the given dimensions.
pub fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGB_CHANNELS))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}
