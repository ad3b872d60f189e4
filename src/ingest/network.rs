//! UDP network sources.
//!
//! A raw UDP transport stream (typically MPEG-TS pushed by an encoder) is
//! described by an ordered list of candidate receive addresses. Candidates are
//! tried in order and the first one that opens wins; later candidates are
//! never attempted once one succeeds.

use std::fmt::Write as _;
use std::time::Duration;

use super::FrameSource;
use crate::error::{SourceKind, SourceUnavailable};

/// Receive-side tuning passed to the demuxer as URL options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReceiveHints {
    /// Packets buffered between the socket and the demuxer.
    pub fifo_size: Option<u32>,
    /// Keep going when the fifo overruns instead of failing the read.
    pub overrun_nonfatal: bool,
    /// Socket receive buffer size in bytes.
    pub buffer_size: Option<u32>,
    /// Give up on a read that produced nothing for this long.
    pub timeout: Option<Duration>,
}

impl ReceiveHints {
    fn query(&self) -> String {
        let mut params = Vec::new();
        if let Some(size) = self.fifo_size {
            params.push(format!("fifo_size={size}"));
        }
        if self.overrun_nonfatal {
            params.push("overrun_nonfatal=1".to_string());
        }
        if let Some(size) = self.buffer_size {
            params.push(format!("buffer_size={size}"));
        }
        if let Some(timeout) = self.timeout {
            params.push(format!("timeout={}", timeout.as_micros()));
        }
        params.join("&")
    }
}

/// One way of receiving the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkCandidate {
    pub name: &'static str,
    pub address: String,
    pub hints: ReceiveHints,
}

impl NetworkCandidate {
    /// Demuxer URL for this candidate, hints included.
    pub fn url(&self) -> String {
        let query = self.hints.query();
        let mut url = self.address.clone();
        if !query.is_empty() {
            let _ = write!(url, "?{query}");
        }
        url
    }
}

/// Candidates for a UDP stream on `port`, in attempt order.
///
/// 1. Plain listen on any interface, no tuning.
/// 2. Explicit bind to all interfaces with a large packet fifo, a zero-size
///    socket buffer, non-fatal overruns and a 500 ms read timeout.
pub fn udp_candidates(port: u16) -> Vec<NetworkCandidate> {
    vec![
        NetworkCandidate {
            name: "listen-any",
            address: format!("udp://@:{port}"),
            hints: ReceiveHints::default(),
        },
        NetworkCandidate {
            name: "bind-all-low-latency",
            address: format!("udp://0.0.0.0:{port}"),
            hints: ReceiveHints {
                fifo_size: Some(100_000),
                overrun_nonfatal: true,
                buffer_size: Some(0),
                timeout: Some(Duration::from_millis(500)),
            },
        },
    ]
}

/// Try `candidates` in order and return the first source that opens.
///
/// `target` names the stream in the error when every candidate fails.
pub fn open_first<F>(
    target: &str,
    candidates: &[NetworkCandidate],
    mut attempt: F,
) -> Result<(Box<dyn FrameSource>, NetworkCandidate), SourceUnavailable>
where
    F: FnMut(&NetworkCandidate) -> anyhow::Result<Box<dyn FrameSource>>,
{
    let mut failures = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match attempt(candidate) {
            Ok(source) => {
                log::info!("network source {}: opened via {}", target, candidate.url());
                return Ok((source, candidate.clone()));
            }
            Err(err) => {
                log::debug!("network source {}: {} failed: {:#}", target, candidate.name, err);
                failures.push(format!("{}: {:#}", candidate.name, err));
            }
        }
    }
    let reason = if failures.is_empty() {
        "no candidates to try".to_string()
    } else {
        failures.join("; ")
    };
    Err(SourceUnavailable::new(SourceKind::Network, target, reason))
}

/// Encoder command a sender can run to push a stream to this receiver.
pub fn sender_hint(port: u16) -> String {
    format!(
        "ffmpeg -f v4l2 -thread_queue_size 256 -framerate 30 -video_size 640x480 -i /dev/video0 \
         -pix_fmt yuv420p -c:v libx264 -preset ultrafast -tune zerolatency \
         -x264-params \"repeat-headers=1:keyint=30:min-keyint=30:scenecut=0\" \
         -g 30 -keyint_min 30 -sc_threshold 0 -b:v 2M -maxrate 2M -bufsize 2M \
         -muxpreload 0 -muxdelay 0 -f mpegts udp://RECEIVER_IP:{port}?pkt_size=1316"
    )
}
