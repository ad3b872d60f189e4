//! Frame ingestion sources.
//!
//! This module provides the sources a run can pull frames from:
//! - Local video files (feature: ingest-file-ffmpeg)
//! - USB/V4L2 capture devices by index (feature: ingest-v4l2)
//! - Raw UDP video transports (feature: ingest-udp-ffmpeg)
//! - Synthetic `stub://` sources (testing, demos)
//!
//! `SourceOpener` turns a source descriptor into a `SourceHandle` or a
//! definitive `SourceUnavailable`. A handle is owned by exactly one run and is
//! released when the run ends, on every exit path.

#[cfg(any(feature = "ingest-file-ffmpeg", feature = "ingest-udp-ffmpeg"))]
pub(crate) mod ffmpeg;
pub mod file;
pub mod network;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod opener;
mod synthetic;
pub mod v4l2;

use anyhow::Result;

use crate::frame::Frame;

pub use file::{list_videos, FileConfig, FileSource, VIDEO_EXTENSIONS};
pub use network::{open_first, sender_hint, udp_candidates, NetworkCandidate, ReceiveHints};
pub use opener::SourceOpener;
pub use v4l2::{DeviceSource, V4l2Config};

/// A sequentially readable frame stream.
pub trait FrameSource: Send {
    /// Read the next frame. `Ok(None)` marks the natural end of the stream.
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Ask the backend to keep at most `frames` decoded frames queued.
    ///
    /// Returns `false` when the backend cannot honour the hint.
    fn set_buffer_depth(&mut self, _frames: u32) -> bool {
        false
    }

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_read: u64,
    pub label: String,
}

/// An open frame source owned by a single run.
pub struct SourceHandle {
    label: String,
    source: Option<Box<dyn FrameSource>>,
}

impl SourceHandle {
    pub fn new(label: impl Into<String>, source: Box<dyn FrameSource>) -> Self {
        Self {
            label: label.into(),
            source: Some(source),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Read the next frame. A released handle reads as exhausted.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        match self.source.as_mut() {
            Some(source) => source.read_frame(),
            None => Ok(None),
        }
    }

    /// Best-effort request for a one-frame internal buffer.
    pub fn request_low_latency(&mut self) {
        if let Some(source) = self.source.as_mut() {
            if !source.set_buffer_depth(1) {
                log::debug!("{}: backend ignored low-latency buffering hint", self.label);
            }
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.source.as_ref().is_some_and(|source| source.is_healthy())
    }

    pub fn stats(&self) -> SourceStats {
        match self.source.as_ref() {
            Some(source) => source.stats(),
            None => SourceStats {
                frames_read: 0,
                label: self.label.clone(),
            },
        }
    }

    pub fn is_released(&self) -> bool {
        self.source.is_none()
    }

    /// Release the underlying device, file or socket. Idempotent.
    pub fn release(&mut self) {
        if let Some(source) = self.source.take() {
            let stats = source.stats();
            drop(source);
            log::info!(
                "{}: released after {} frames",
                self.label,
                stats.frames_read
            );
        }
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingSource {
        remaining: u64,
        read: u64,
        depth: Option<u32>,
    }

    impl FrameSource for CountingSource {
        fn read_frame(&mut self) -> Result<Option<Frame>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            self.read += 1;
            Frame::new(vec![0u8; 12], 2, 2, self.read).map(Some)
        }

        fn set_buffer_depth(&mut self, frames: u32) -> bool {
            self.depth = Some(frames);
            true
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                frames_read: self.read,
                label: "counting".to_string(),
            }
        }
    }

    #[test]
    fn released_handle_reads_as_exhausted() -> Result<()> {
        let mut handle = SourceHandle::new(
            "counting",
            Box::new(CountingSource {
                remaining: 3,
                read: 0,
                depth: None,
            }),
        );
        assert!(handle.read_frame()?.is_some());
        assert_eq!(handle.stats().frames_read, 1);

        handle.release();
        assert!(handle.is_released());
        assert!(handle.read_frame()?.is_none());
        assert!(!handle.is_healthy());

        handle.release();
        Ok(())
    }

    #[test]
    fn handle_reads_until_source_ends() -> Result<()> {
        let mut handle = SourceHandle::new(
            "counting",
            Box::new(CountingSource {
                remaining: 2,
                read: 0,
                depth: None,
            }),
        );
        handle.request_low_latency();
        assert_eq!(handle.read_frame()?.map(|f| f.sequence), Some(1));
        assert_eq!(handle.read_frame()?.map(|f| f.sequence), Some(2));
        assert!(handle.read_frame()?.is_none());
        Ok(())
    }
}
