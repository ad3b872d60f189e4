use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::anyhow;

use super::display::{DisplaySink, TelemetryView};
use super::throttle::{Throttle, ThroughputTracker};
use super::{LoopState, RunOptions, RunReport, StopSignal};
use crate::detect::Annotator;
use crate::device::DeviceInfo;
use crate::error::RunError;
use crate::ingest::SourceHandle;
use crate::telemetry::TelemetryCollector;

/// One frame processing loop: source → throttle → annotator → display.
///
/// The loop only reads the telemetry collector; it never starts or stops it.
pub struct FrameLoop<'a> {
    annotator: Arc<Mutex<dyn Annotator>>,
    device: &'a DeviceInfo,
    telemetry: Option<&'a TelemetryCollector>,
    display: &'a mut dyn DisplaySink,
    stop: StopSignal,
    state: LoopState,
}

#[derive(Default)]
struct Counters {
    read: u64,
    dropped: u64,
}

impl<'a> FrameLoop<'a> {
    pub fn new(
        annotator: Arc<Mutex<dyn Annotator>>,
        device: &'a DeviceInfo,
        display: &'a mut dyn DisplaySink,
    ) -> Self {
        Self {
            annotator,
            device,
            telemetry: None,
            display,
            stop: StopSignal::new(),
            state: LoopState::Idle,
        }
    }

    /// Read telemetry from `collector` after every emitted frame.
    pub fn with_telemetry(mut self, collector: Option<&'a TelemetryCollector>) -> Self {
        self.telemetry = collector;
        self
    }

    /// End the run when `stop` is raised.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until the source ends, the stop signal is raised, or a read fails.
    ///
    /// The source is released before this returns, on every path. A read
    /// failure ends the run with a `Failed` report; an annotator or display
    /// failure is returned as an error.
    pub fn run(
        &mut self,
        mut source: SourceHandle,
        options: &RunOptions,
    ) -> Result<RunReport, RunError> {
        self.state = LoopState::Running;
        let mut throttle = Throttle::new(options.max_fps);
        let mut tracker = ThroughputTracker::new();
        let mut counters = Counters::default();

        let outcome = self.drive(&mut source, options, &mut throttle, &mut tracker, &mut counters);
        let stats = source.stats();
        source.release();

        match outcome {
            Ok((state, failure)) => {
                self.state = state;
                Ok(RunReport {
                    state,
                    failure,
                    source_label: source.label().to_string(),
                    frames_read: counters.read.max(stats.frames_read),
                    frames_emitted: tracker.emitted(),
                    frames_dropped: counters.dropped,
                    last_fps: tracker.last_reported(),
                })
            }
            Err(err) => {
                self.state = LoopState::Failed;
                Err(err)
            }
        }
    }

    fn drive(
        &mut self,
        source: &mut SourceHandle,
        options: &RunOptions,
        throttle: &mut Throttle,
        tracker: &mut ThroughputTracker,
        counters: &mut Counters,
    ) -> Result<(LoopState, Option<String>), RunError> {
        loop {
            if self.stop.is_raised() {
                return Ok((LoopState::Stopped, None));
            }

            let frame = match source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok((LoopState::Exhausted, None)),
                Err(err) => {
                    log::warn!("{}: frame read failed: {:#}", source.label(), err);
                    return Ok((LoopState::Failed, Some(format!("{err:#}"))));
                }
            };
            counters.read += 1;

            if !throttle.admit(Instant::now()) {
                counters.dropped += 1;
                continue;
            }

            let started = Instant::now();
            let annotated = {
                let mut annotator = self.annotator.lock().map_err(|_| RunError::Inference {
                    sequence: frame.sequence,
                    source: anyhow!("annotator lock poisoned"),
                })?;
                annotator
                    .annotate(&frame, options.confidence, self.device.hint())
                    .map_err(|source| RunError::Inference {
                        sequence: frame.sequence,
                        source,
                    })?
            };
            let elapsed = started.elapsed();

            if let Some(fps) = tracker.record(elapsed) {
                self.display
                    .show_throughput(fps)
                    .map_err(RunError::Display)?;
            }
            self.display
                .show_frame(&annotated)
                .map_err(RunError::Display)?;
            self.render_side_panels(options)?;
        }
    }

    fn render_side_panels(&mut self, options: &RunOptions) -> Result<(), RunError> {
        let latest = self
            .telemetry
            .map(TelemetryCollector::latest)
            .unwrap_or_default();
        self.display
            .show_telemetry(&TelemetryView::from_latest(latest))
            .map_err(RunError::Display)?;

        if options.show_memory {
            if let Some(summary) = self.device.memory_summary() {
                self.display
                    .show_memory_summary(&summary)
                    .map_err(RunError::Display)?;
            }
        }
        Ok(())
    }
}
