//! FFmpeg-backed decoder shared by the file and UDP sources.
//!
//! Decodes the best video stream of any input FFmpeg can open (local path or
//! `udp://` URL) and converts frames to packed RGB24 in-memory. The scaler is
//! built from the first decoded frame, since network streams only reveal their
//! pixel format once data arrives.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use std::time::{Duration, Instant};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

pub(crate) struct FfmpegSource {
    location: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: Option<ffmpeg::software::scaling::Context>,
    frame_count: u64,
    draining: bool,
    opened_at: Instant,
    last_frame_at: Option<Instant>,
}

impl FfmpegSource {
    pub(crate) fn open(location: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&location)
            .with_context(|| format!("failed to open input '{}' with ffmpeg", location))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("input has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        Ok(Self {
            location: location.to_string(),
            input,
            stream_index,
            decoder,
            scaler: None,
            frame_count: 0,
            draining: false,
            opened_at: Instant::now(),
            last_frame_at: None,
        })
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<Frame> {
        let stale = self.scaler.as_ref().map_or(true, |scaler| {
            let input = scaler.input();
            input.format != decoded.format()
                || input.width != decoded.width()
                || input.height != decoded.height()
        });
        if stale {
            self.scaler = Some(
                ffmpeg::software::scaling::context::Context::get(
                    decoded.format(),
                    decoded.width(),
                    decoded.height(),
                    ffmpeg::util::format::pixel::Pixel::RGB24,
                    decoded.width(),
                    decoded.height(),
                    ffmpeg::software::scaling::flag::Flags::BILINEAR,
                )
                .context("create ffmpeg scaler")?,
            );
        }
        let scaler = self.scaler.as_mut().context("ffmpeg scaler missing")?;

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        scaler
            .run(decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::new(pixels, width, height, self.frame_count)
    }
}

impl FrameSource for FfmpegSource {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded).map(Some);
            }
            if self.draining {
                return Ok(None);
            }

            let mut packet = ffmpeg::Packet::empty();
            let read = packet.read(&mut self.input);
            match packet_outcome(read, &self.location)? {
                PacketRead::Packet if packet.stream() == self.stream_index => {
                    match self.decoder.send_packet(&packet) {
                        Ok(()) => {}
                        // Lost UDP datagrams surface as corrupt packets; skip them.
                        Err(ffmpeg::Error::InvalidData) => {
                            log::debug!("{}: skipped corrupt packet", self.location);
                        }
                        Err(err) => {
                            return Err(anyhow::Error::new(err)
                                .context("send packet to ffmpeg decoder"))
                        }
                    }
                }
                PacketRead::Packet => {}
                PacketRead::End => {
                    self.decoder
                        .send_eof()
                        .context("flush ffmpeg decoder")?;
                    self.draining = true;
                }
            }
        }
    }

    /// FFmpeg demuxers have no per-stream queue depth knob.
    fn set_buffer_depth(&mut self, _frames: u32) -> bool {
        false
    }

    fn is_healthy(&self) -> bool {
        if self.draining {
            return false;
        }
        match self.last_frame_at {
            Some(last) => last.elapsed() <= Duration::from_secs(5),
            None => self.opened_at.elapsed() <= Duration::from_secs(10),
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frame_count,
            label: self.location.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PacketRead {
    Packet,
    End,
}

/// Classify one demuxer read. Only end of input drains the decoder; any other
/// failure (a network timeout, a truncated file) ends the source.
fn packet_outcome(read: Result<(), ffmpeg::Error>, location: &str) -> Result<PacketRead> {
    match read {
        Ok(()) => Ok(PacketRead::Packet),
        Err(ffmpeg::Error::Eof) => Ok(PacketRead::End),
        Err(err) => Err(err).with_context(|| format!("read packet from {}", location)),
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data[..row_bytes * height as usize].to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
