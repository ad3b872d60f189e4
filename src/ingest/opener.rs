//! Source descriptor → open handle.
//!
//! Every successful open asks the backend for a one-frame queue so the loop
//! reads live frames rather than a backlog. Failures are definitive.

use std::path::Path;

use super::file::{FileConfig, FileSource};
use super::network::{open_first, udp_candidates, NetworkCandidate};
use super::v4l2::{DeviceSource, V4l2Config};
use super::{FrameSource, SourceHandle};
use crate::error::{SourceKind, SourceUnavailable};

/// Opens file, device and network sources.
#[derive(Clone, Debug, Default)]
pub struct SourceOpener {
    device: V4l2Config,
}

impl SourceOpener {
    pub fn new(device: V4l2Config) -> Self {
        Self { device }
    }

    /// Open a local video file (or a `stub://` location).
    pub fn open_file(&self, path: &Path) -> Result<SourceHandle, SourceUnavailable> {
        self.open_local(SourceKind::File, path)
    }

    /// Open a staged upload. Identical to a file, reported as an upload.
    pub fn open_upload(&self, path: &Path) -> Result<SourceHandle, SourceUnavailable> {
        self.open_local(SourceKind::Upload, path)
    }

    /// Open capture device `index`.
    pub fn open_device(&self, index: u32) -> Result<SourceHandle, SourceUnavailable> {
        let source = DeviceSource::open(&self.device, index).map_err(|err| {
            SourceUnavailable::from_chain(SourceKind::Device, self.device.device_path(index), &err)
        })?;
        let label = source.stats().label;
        Ok(ready(label, Box::new(source)))
    }

    /// Open a UDP stream on `port`, trying each candidate address in order.
    ///
    /// Returns the handle and the candidate that opened.
    pub fn open_network(
        &self,
        port: u16,
    ) -> Result<(SourceHandle, NetworkCandidate), SourceUnavailable> {
        let target = format!("udp port {port}");
        let (source, candidate) = open_first(&target, &udp_candidates(port), open_udp)?;
        Ok((ready(candidate.url(), source), candidate))
    }

    fn open_local(
        &self,
        kind: SourceKind,
        path: &Path,
    ) -> Result<SourceHandle, SourceUnavailable> {
        let label = path.display().to_string();
        let source = FileSource::open(FileConfig {
            path: label.clone(),
        })
        .map_err(|err| SourceUnavailable::from_chain(kind, &label, &err))?;
        Ok(ready(label, Box::new(source)))
    }
}

fn ready(label: String, source: Box<dyn FrameSource>) -> SourceHandle {
    let mut handle = SourceHandle::new(label, source);
    handle.request_low_latency();
    handle
}

#[cfg(feature = "ingest-udp-ffmpeg")]
fn open_udp(candidate: &NetworkCandidate) -> anyhow::Result<Box<dyn FrameSource>> {
    let source = super::ffmpeg::FfmpegSource::open(&candidate.url())?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "ingest-udp-ffmpeg"))]
fn open_udp(candidate: &NetworkCandidate) -> anyhow::Result<Box<dyn FrameSource>> {
    Err(anyhow::anyhow!(
        "{} requires the ingest-udp-ffmpeg feature",
        candidate.url()
    ))
}
