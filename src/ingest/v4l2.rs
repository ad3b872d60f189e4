//! V4L2 capture device source.
//!
//! This module provides `DeviceSource` for reading frames from local capture
//! devices addressed by index (index 0 is `/dev/video0`).
//!
//! The device source is responsible for:
//! - Opening the device node and negotiating a capture format
//! - Keeping the driver queue short so frames are live, not backlog
//! - Normalizing YUYV/NV12 captures to packed RGB24
//!
//! A `device_root` starting with `stub://` yields an unbounded synthetic
//! camera instead of a device node.

use anyhow::Result;
#[cfg(feature = "ingest-v4l2")]
use anyhow::Context;
#[cfg(feature = "ingest-v4l2")]
use ouroboros::self_referencing;
#[cfg(feature = "ingest-v4l2")]
use std::time::{Duration, Instant};

#[cfg(feature = "ingest-v4l2")]
use super::normalize::{normalize_to_rgb, PixelFormat};
use super::synthetic::{is_stub, SyntheticSource, SyntheticSpec};
use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Configuration shared by every device a run may open.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Prefix the device index is appended to (e.g., "/dev/video").
    pub device_root: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Requested capture rate; 0 leaves the driver default.
    pub target_fps: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device_root: "/dev/video".to_string(),
            width: 640,
            height: 480,
            target_fps: 0,
        }
    }
}

impl V4l2Config {
    /// Device location for `index`.
    pub fn device_path(&self, index: u32) -> String {
        format!("{}{}", self.device_root, index)
    }
}

/// Capture device frame source.
pub struct DeviceSource {
    backend: DeviceBackend,
}

enum DeviceBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(V4l2Device),
}

impl DeviceSource {
    /// Open capture device `index`.
    pub fn open(config: &V4l2Config, index: u32) -> Result<Self> {
        if is_stub(&config.device_root) {
            let mut spec = SyntheticSpec::parse(&config.device_root, None)?;
            spec.name = format!("{}{}", spec.name, index);
            return Ok(Self {
                backend: DeviceBackend::Synthetic(SyntheticSource::new(spec)),
            });
        }
        #[cfg(feature = "ingest-v4l2")]
        {
            Ok(Self {
                backend: DeviceBackend::Device(V4l2Device::open(config, index)?),
            })
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(anyhow::anyhow!(
                "capture device {} requires the ingest-v4l2 feature",
                config.device_path(index)
            ))
        }
    }
}

impl FrameSource for DeviceSource {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            DeviceBackend::Synthetic(source) => source.read_frame(),
            #[cfg(feature = "ingest-v4l2")]
            DeviceBackend::Device(source) => source.read_frame().map(Some),
        }
    }

    fn set_buffer_depth(&mut self, frames: u32) -> bool {
        match &mut self.backend {
            DeviceBackend::Synthetic(source) => source.set_buffer_depth(frames),
            #[cfg(feature = "ingest-v4l2")]
            DeviceBackend::Device(source) => source.set_buffer_depth(frames),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            DeviceBackend::Synthetic(source) => source.is_healthy(),
            #[cfg(feature = "ingest-v4l2")]
            DeviceBackend::Device(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            DeviceBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            DeviceBackend::Device(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Production V4L2 device using libv4l
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
const DEFAULT_BUFFERS: u32 = 4;

#[cfg(feature = "ingest-v4l2")]
struct V4l2Device {
    path: String,
    target_fps: u32,
    state: Option<V4l2State>,
    format: PixelFormat,
    width: u32,
    height: u32,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
}

#[cfg(feature = "ingest-v4l2")]
#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

/// Build the mmap stream. On failure the device is handed back so the caller
/// can retry with another depth.
#[cfg(feature = "ingest-v4l2")]
fn build_state(
    device: v4l::Device,
    buffers: u32,
) -> std::result::Result<V4l2State, (anyhow::Error, v4l::Device)> {
    V4l2StateTryBuilder {
        device,
        stream_builder: |device| {
            v4l::prelude::MmapStream::with_buffers(device, v4l::buffer::Type::VideoCapture, buffers)
                .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
        },
    }
    .try_build_or_recover()
    .map_err(|(err, heads)| (err, heads.device))
}

/// Outcome of re-queueing a capture stream at a new depth.
#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
enum Requeued<S> {
    /// The requested depth is in effect.
    Applied(S),
    /// The driver refused the depth; the stream runs at the fallback depth.
    Kept(S, anyhow::Error),
    /// Neither depth could be queued.
    Lost(anyhow::Error),
}

/// Rebuild a stream at `frames` buffers, falling back to `fallback` when the
/// driver refuses. The device survives a refused depth.
#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
fn requeue<D, S>(
    device: D,
    frames: u32,
    fallback: u32,
    build: impl Fn(D, u32) -> std::result::Result<S, (anyhow::Error, D)>,
) -> Requeued<S> {
    let (refused, device) = match build(device, frames) {
        Ok(state) => return Requeued::Applied(state),
        Err(failed) => failed,
    };
    match build(device, fallback) {
        Ok(state) => Requeued::Kept(state, refused),
        Err((err, _device)) => Requeued::Lost(err.context(format!("{:#}", refused))),
    }
}

#[cfg(feature = "ingest-v4l2")]
impl V4l2Device {
    fn open(config: &V4l2Config, index: u32) -> Result<Self> {
        use v4l::video::Capture;

        let path = config.device_path(index);
        let device = v4l::Device::with_path(&path)
            .with_context(|| format!("open v4l2 device {}", path))?;
        let mut requested = device.format().context("read v4l2 format")?;
        requested.width = config.width;
        requested.height = config.height;
        requested.fourcc = v4l::FourCC::new(b"YUYV");

        let negotiated = match device.set_format(&requested) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("DeviceSource: failed to set format on {}: {}", path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let format = PixelFormat::from_fourcc(&negotiated.fourcc.repr).with_context(|| {
            format!("{} captures {} frames, which are not supported", path, negotiated.fourcc)
        })?;

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("DeviceSource: failed to set fps on {}: {}", path, err);
            }
        }

        let state = build_state(device, DEFAULT_BUFFERS).map_err(|(err, _device)| err)?;
        log::info!(
            "DeviceSource: opened {} ({}x{} {:?})",
            path,
            negotiated.width,
            negotiated.height,
            format
        );
        Ok(Self {
            path,
            target_fps: config.target_fps,
            state: Some(state),
            format,
            width: negotiated.width,
            height: negotiated.height,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        })
    }

    fn read_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not open")?;
        let (format, width, height) = (self.format, self.width, self.height);
        let converted = state.with_mut(|fields| {
            let (buf, meta) = fields
                .stream
                .next()
                .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))?;
            let used = (meta.bytesused as usize).min(buf.len());
            normalize_to_rgb(&buf[..used], width, height, format)
        });
        let pixels = converted.map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::new(pixels, width, height, self.frame_count)
    }

    /// Re-create the mmap stream with `frames` driver buffers. A refused depth
    /// leaves the device capturing at `DEFAULT_BUFFERS`.
    fn set_buffer_depth(&mut self, frames: u32) -> bool {
        let Some(state) = self.state.take() else {
            return false;
        };
        let device = state.into_heads().device;
        match requeue(device, frames.max(1), DEFAULT_BUFFERS, build_state) {
            Requeued::Applied(state) => {
                self.state = Some(state);
                true
            }
            Requeued::Kept(state, err) => {
                log::warn!("DeviceSource: failed to shrink queue on {}: {:#}", self.path, err);
                self.state = Some(state);
                false
            }
            Requeued::Lost(err) => {
                log::warn!("DeviceSource: lost capture stream on {}: {:#}", self.path, err);
                self.last_error = Some(err.to_string());
                false
            }
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() || self.state.is_none() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frame_count,
            label: self.path.clone(),
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.target_fps == 0 {
            2_000
        } else {
            (1000 / self.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}
