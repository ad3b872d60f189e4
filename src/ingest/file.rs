//! Local file frame source.
//!
//! This module provides `FileSource` for reading frames sequentially from a
//! local video file, plus the mounted-video listing used by the control
//! surface. Real files are decoded with FFmpeg (feature: ingest-file-ffmpeg);
//! `stub://` paths produce synthetic frames.
//!
//! The file source MUST NOT fetch remote URLs; network input goes through
//! `SourceOpener::open_network`.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::ffmpeg::FfmpegSource;
use super::synthetic::{is_stub, SyntheticSource, SyntheticSpec};
use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Extensions listed as playable videos (compared case-insensitively).
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];

/// Frames produced by a `stub://` file without an explicit `frames` parameter.
const DEFAULT_STUB_FILE_FRAMES: u64 = 300;

/// Configuration for a local file source.
#[derive(Clone, Debug, Default)]
pub struct FileConfig {
    /// Local file path (e.g., "/videos/street.mp4") or a `stub://` location.
    pub path: String,
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegSource),
}

impl FileSource {
    /// Open the file for sequential reads.
    pub fn open(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if is_stub(&config.path) {
            let spec = SyntheticSpec::parse(&config.path, Some(DEFAULT_STUB_FILE_FRAMES))?;
            return Ok(Self {
                backend: FileBackend::Synthetic(SyntheticSource::new(spec)),
            });
        }
        if !Path::new(&config.path).is_file() {
            return Err(anyhow!("'{}' is not a readable file", config.path));
        }
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            let source = FfmpegSource::open(&config.path)?;
            log::info!("FileSource: opened {} (ffmpeg)", config.path);
            Ok(Self {
                backend: FileBackend::Ffmpeg(source),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "file ingestion requires the ingest-file-ffmpeg feature"
            ))
        }
    }
}

impl FrameSource for FileSource {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.read_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.read_frame(),
        }
    }

    fn set_buffer_depth(&mut self, frames: u32) -> bool {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.set_buffer_depth(frames),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.set_buffer_depth(frames),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(source) => source.is_healthy(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

/// List playable videos directly under `dir`, sorted by path.
///
/// A missing directory lists as empty.
pub fn list_videos(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(anyhow!("failed to list {}: {}", dir.display(), err)),
    };
    let mut videos = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && has_video_extension(&path) {
            videos.push(path);
        }
    }
    videos.sort();
    Ok(videos)
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if is_stub(path) {
        return true;
    }
    !path.contains("://")
}
