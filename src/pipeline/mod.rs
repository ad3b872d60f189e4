//! Frame processing loop.
//!
//! A run pulls frames from one `SourceHandle`, drops frames that arrive
//! faster than the configured rate, annotates the rest, and hands each result
//! plus the freshest telemetry to a `DisplaySink`.
//!
//! `Idle → Running → (Stopped | Exhausted | Failed)`

mod display;
mod runner;
mod throttle;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use display::{DisplaySink, TelemetryView};
pub use runner::FrameLoop;
pub use throttle::{Throttle, ThroughputTracker, THROUGHPUT_REPORT_EVERY};

/// Default confidence threshold.
pub const DEFAULT_CONFIDENCE: f32 = 0.25;
/// Default emission cap in frames per second.
pub const DEFAULT_MAX_FPS: u32 = 60;

/// Cooperative stop flag shared between a run and whoever may end it.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Per-run settings from the control surface.
#[derive(Clone, Debug, PartialEq)]
pub struct RunOptions {
    pub confidence: f32,
    /// Upper bound on emitted frames per second; values below 1 act as 1.
    pub max_fps: u32,
    /// Show the accelerator memory summary after each emitted frame.
    pub show_memory: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            max_fps: DEFAULT_MAX_FPS,
            show_memory: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    /// The stop signal was raised.
    Stopped,
    /// The source ran out of frames.
    Exhausted,
    /// A frame read failed after the source opened.
    Failed,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Stopped | LoopState::Exhausted | LoopState::Failed)
    }
}

/// Outcome of a run that did not fail fatally.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub state: LoopState,
    /// Read failure that ended the run, when `state` is `Failed`.
    pub failure: Option<String>,
    pub source_label: String,
    pub frames_read: u64,
    pub frames_emitted: u64,
    pub frames_dropped: u64,
    /// Most recent throughput report, if any.
    pub last_fps: Option<f64>,
}
