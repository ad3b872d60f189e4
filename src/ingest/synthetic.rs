//! Synthetic `stub://` frame source for tests and demos.
//!
//! `stub://<name>?frames=N&interval_ms=M&width=W&height=H`
//!
//! Frames show a static gradient with a bright square sweeping across the
//! scene, so frame-difference annotators see motion. When `interval_ms` is set
//! the source paces itself like a camera producing frames at that interval.

use anyhow::{anyhow, Context, Result};
use std::time::{Duration, Instant};
use url::Url;

use super::{FrameSource, SourceStats};
use crate::frame::{rgb_len, Frame};

pub(crate) const STUB_SCHEME: &str = "stub";

const DEFAULT_WIDTH: u32 = 320;
const DEFAULT_HEIGHT: u32 = 240;

pub(crate) fn is_stub(location: &str) -> bool {
    location.starts_with("stub://")
}

/// Parsed `stub://` location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SyntheticSpec {
    pub(crate) name: String,
    pub(crate) frames: Option<u64>,
    pub(crate) interval: Duration,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl SyntheticSpec {
    /// Parse a `stub://` location. `default_frames` applies when `frames` is absent.
    pub(crate) fn parse(location: &str, default_frames: Option<u64>) -> Result<Self> {
        let url = Url::parse(location).with_context(|| format!("parse stub location '{location}'"))?;
        if url.scheme() != STUB_SCHEME {
            return Err(anyhow!("expected a stub:// location, got '{}'", location));
        }
        let mut spec = Self {
            name: url.host_str().unwrap_or("stub").to_string(),
            frames: default_frames,
            interval: Duration::ZERO,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "frames" => spec.frames = Some(parse_number(&key, &value)?),
                "interval_ms" => spec.interval = Duration::from_millis(parse_number(&key, &value)?),
                "width" => spec.width = parse_number(&key, &value)?,
                "height" => spec.height = parse_number(&key, &value)?,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        if spec.width == 0 || spec.height == 0 {
            return Err(anyhow!("stub frame dimensions must be non-zero"));
        }
        rgb_len(spec.width, spec.height)?;
        Ok(spec)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("stub parameter '{}' must be a non-negative integer", key))
}

pub(crate) struct SyntheticSource {
    spec: SyntheticSpec,
    frame_count: u64,
    next_due: Option<Instant>,
}

impl SyntheticSource {
    pub(crate) fn new(spec: SyntheticSpec) -> Self {
        log::info!(
            "SyntheticSource: opened {} ({}x{}, {} frames)",
            spec.name,
            spec.width,
            spec.height,
            spec.frames
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unbounded".to_string())
        );
        Self {
            spec,
            frame_count: 0,
            next_due: None,
        }
    }

    fn pace(&mut self) {
        if self.spec.interval.is_zero() {
            return;
        }
        let now = Instant::now();
        let due = match self.next_due {
            Some(due) if due > now => {
                std::thread::sleep(due - now);
                due
            }
            _ => now,
        };
        self.next_due = Some(due + self.spec.interval);
    }

    fn generate_pixels(&self) -> Result<Vec<u8>> {
        let width = self.spec.width as usize;
        let height = self.spec.height as usize;
        let mut pixels = vec![0u8; rgb_len(self.spec.width, self.spec.height)?];

        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let x = i % width;
            let y = i / width;
            px[0] = ((x * 255) / width.max(1)) as u8;
            px[1] = ((y * 255) / height.max(1)) as u8;
            px[2] = 64;
        }

        // Moving square: side is 1/8 of the shorter edge, advances 4px per frame.
        let side = (width.min(height) / 8).max(1);
        let travel = width.saturating_sub(side).max(1);
        let left = (self.frame_count as usize * 4) % travel;
        let top = height.saturating_sub(side) / 2;
        for y in top..(top + side).min(height) {
            for x in left..(left + side).min(width) {
                let offset = (y * width + x) * 3;
                pixels[offset..offset + 3].copy_from_slice(&[255, 255, 255]);
            }
        }

        Ok(pixels)
    }
}

impl FrameSource for SyntheticSource {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.spec.frames.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        self.pace();
        let pixels = self.generate_pixels()?;
        self.frame_count += 1;
        Frame::new(pixels, self.spec.width, self.spec.height, self.frame_count).map(Some)
    }

    // Frames are generated on demand; nothing is ever queued.
    fn set_buffer_depth(&mut self, _frames: u32) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frame_count,
            label: format!("stub://{}", self.spec.name),
        }
    }
}
