//! Control-surface boundary.
//!
//! A `Session` owns everything that outlives a single run: the source opener,
//! the device info, the shared telemetry collector and the running flag. Each
//! `start` opens a fresh source, drives one `FrameLoop` to completion and
//! releases the source again.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::detect::Annotator;
use crate::device::DeviceInfo;
use crate::error::{RunError, SessionError, SourceKind, SourceUnavailable};
use crate::ingest::{SourceHandle, SourceOpener};
use crate::pipeline::{DisplaySink, FrameLoop, LoopState, RunOptions, RunReport, StopSignal};
use crate::telemetry::TelemetryCollector;

/// Where a run takes its frames from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSelection {
    /// A video already on disk (e.g. under the mounted videos directory).
    Mounted(PathBuf),
    /// A user-supplied file, copied to the upload path before opening.
    Upload(PathBuf),
    /// Capture device by index.
    Device(u32),
    /// Raw UDP stream on a local port.
    Network(u16),
}

pub struct Session {
    opener: SourceOpener,
    device: DeviceInfo,
    telemetry: Arc<TelemetryCollector>,
    telemetry_enabled: AtomicBool,
    upload_path: PathBuf,
    running: AtomicBool,
    stop: StopSignal,
}

/// Clears the stop signal and the running flag when a run ends, however it
/// ends. A stop raised before or during a run is honored by that run.
struct RunningGuard<'a> {
    running: &'a AtomicBool,
    stop: &'a StopSignal,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.stop.reset();
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Session {
    pub fn new(
        opener: SourceOpener,
        device: DeviceInfo,
        telemetry: Arc<TelemetryCollector>,
        upload_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            opener,
            device,
            telemetry,
            telemetry_enabled: AtomicBool::new(false),
            upload_path: upload_path.into(),
            running: AtomicBool::new(false),
            stop: StopSignal::new(),
        }
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn upload_path(&self) -> &Path {
        &self.upload_path
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry_enabled.load(Ordering::SeqCst)
    }

    /// Turn telemetry on (starts the collector) or off (stops it).
    pub fn set_telemetry_enabled(&self, enabled: bool) {
        self.telemetry_enabled.store(enabled, Ordering::SeqCst);
        if enabled {
            self.telemetry.start();
        } else {
            self.telemetry.stop();
        }
    }

    /// Signal that ends the active run. Safe to raise from another thread;
    /// raised while idle, it ends the next run before its first frame.
    pub fn stop_handle(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Ask the active run to stop. Returns `false` when nothing is running.
    pub fn stop(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.stop.raise();
        true
    }

    /// Open `selection` and run it to completion. Blocks for the whole run.
    pub fn start(
        &self,
        selection: &SourceSelection,
        annotator: Arc<Mutex<dyn Annotator>>,
        options: &RunOptions,
        display: &mut dyn DisplaySink,
    ) -> Result<RunReport, SessionError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::Busy);
        }
        let _guard = RunningGuard {
            running: &self.running,
            stop: &self.stop,
        };

        let source = self.open(selection, display)?;
        log::info!("session: running {}", source.label());

        let telemetry = self.telemetry_enabled().then_some(&*self.telemetry);
        let report = FrameLoop::new(annotator, &self.device, &mut *display)
            .with_telemetry(telemetry)
            .with_stop_signal(self.stop.clone())
            .run(source, options)?;

        let status = match (&report.state, &report.failure) {
            (LoopState::Failed, Some(reason)) => format!("Source failed: {reason}"),
            _ => "Finished.".to_string(),
        };
        display.show_status(&status).map_err(RunError::Display)?;
        Ok(report)
    }

    fn open(
        &self,
        selection: &SourceSelection,
        display: &mut dyn DisplaySink,
    ) -> Result<SourceHandle, SessionError> {
        let handle = match selection {
            SourceSelection::Mounted(path) => self.opener.open_file(path)?,
            SourceSelection::Upload(path) => {
                self.stage_upload(path)?;
                self.opener.open_upload(&self.upload_path)?
            }
            SourceSelection::Device(index) => self.opener.open_device(*index)?,
            SourceSelection::Network(port) => {
                display
                    .show_status(&format!("Listening on UDP port {port}"))
                    .map_err(RunError::Display)?;
                let (handle, candidate) = self.opener.open_network(*port)?;
                display
                    .show_status(&format!("opened via {}", candidate.url()))
                    .map_err(RunError::Display)?;
                handle
            }
        };
        Ok(handle)
    }

    /// Copy an uploaded file to the fixed upload path.
    fn stage_upload(&self, path: &Path) -> Result<(), SourceUnavailable> {
        if path == self.upload_path {
            return Ok(());
        }
        let bytes = std::fs::copy(path, &self.upload_path).map_err(|err| {
            SourceUnavailable::new(
                SourceKind::Upload,
                path.display().to_string(),
                format!("cannot stage to {}: {}", self.upload_path.display(), err),
            )
        })?;
        log::debug!(
            "session: staged {} ({} bytes) at {}",
            path.display(),
            bytes,
            self.upload_path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{AnnotatedFrame, StubAnnotator};
    use crate::ingest::V4l2Config;
    use crate::pipeline::TelemetryView;
    use crate::telemetry::TelemetryConfig;
    use anyhow::Result;

    #[derive(Default)]
    struct Statuses(Vec<String>);

    impl DisplaySink for Statuses {
        fn show_frame(&mut self, _: &AnnotatedFrame) -> Result<()> {
            Ok(())
        }

        fn show_throughput(&mut self, _: f64) -> Result<()> {
            Ok(())
        }

        fn show_telemetry(&mut self, _: &TelemetryView) -> Result<()> {
            Ok(())
        }

        fn show_memory_summary(&mut self, _: &str) -> Result<()> {
            Ok(())
        }

        fn show_status(&mut self, message: &str) -> Result<()> {
            self.0.push(message.to_string());
            Ok(())
        }
    }

    fn session(upload_path: &Path) -> Session {
        let opener = SourceOpener::new(V4l2Config {
            device_root: "stub://camera?frames=4&width=8&height=8".to_string(),
            ..V4l2Config::default()
        });
        let telemetry = TelemetryCollector::new(TelemetryConfig {
            executable: Some(PathBuf::from("/nonexistent/tegrastats")),
            ..TelemetryConfig::default()
        });
        Session::new(opener, DeviceInfo::cpu(), Arc::new(telemetry), upload_path)
    }

    fn stub() -> Arc<Mutex<dyn Annotator>> {
        Arc::new(Mutex::new(StubAnnotator))
    }

    #[test]
    fn mounted_run_finishes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let session = session(&dir.path().join("input.mp4"));
        let mut display = Statuses::default();
        let selection = SourceSelection::Mounted(PathBuf::from("stub://clip?frames=3&width=8&height=8"));

        let report = session.start(&selection, stub(), &RunOptions::default(), &mut display)?;
        assert_eq!(report.state, LoopState::Exhausted);
        assert_eq!(display.0, vec!["Finished.".to_string()]);
        assert!(!session.is_running());
        assert!(!session.stop());
        Ok(())
    }

    #[test]
    fn device_run_uses_configured_root() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let session = session(&dir.path().join("input.mp4"));
        let mut display = Statuses::default();
        let report = session.start(&SourceSelection::Device(0), stub(), &RunOptions::default(), &mut display)?;
        assert_eq!(report.frames_read, 4);
        Ok(())
    }

    #[test]
    fn upload_is_staged_before_opening() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let upload_path = dir.path().join("input.mp4");
        let uploaded = dir.path().join("clip.mp4");
        std::fs::write(&uploaded, b"not really a video")?;

        let session = session(&upload_path);
        let mut display = Statuses::default();
        let result = session.start(
            &SourceSelection::Upload(uploaded),
            stub(),
            &RunOptions::default(),
            &mut display,
        );
        assert!(matches!(
            result,
            Err(SessionError::Source(SourceUnavailable { kind: SourceKind::Upload, .. }))
        ));
        assert_eq!(std::fs::read(&upload_path)?, b"not really a video");
        assert!(!session.is_running());
        Ok(())
    }

    #[test]
    fn missing_upload_is_unavailable() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let session = session(&dir.path().join("input.mp4"));
        let mut display = Statuses::default();
        let result = session.start(
            &SourceSelection::Upload(dir.path().join("missing.mp4")),
            stub(),
            &RunOptions::default(),
            &mut display,
        );
        assert!(matches!(result, Err(SessionError::Source(_))));
        Ok(())
    }

    #[test]
    fn second_start_while_running_is_busy() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let session = Arc::new(session(&dir.path().join("input.mp4")));

        let runner = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || {
                let mut display = Statuses::default();
                let selection = SourceSelection::Mounted(PathBuf::from(
                    "stub://live?interval_ms=10&width=8&height=8",
                ));
                session.start(&selection, stub(), &RunOptions::default(), &mut display)
            })
        };
        while !session.is_running() {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let mut display = Statuses::default();
        let second = session.start(&SourceSelection::Device(0), stub(), &RunOptions::default(), &mut display);
        assert!(matches!(second, Err(SessionError::Busy)));

        assert!(session.stop());
        let report = runner
            .join()
            .map_err(|_| anyhow::anyhow!("runner panicked"))??;
        assert_eq!(report.state, LoopState::Stopped);
        Ok(())
    }

    #[test]
    fn stop_raised_before_start_ends_that_run() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let session = session(&dir.path().join("input.mp4"));
        let selection = SourceSelection::Mounted(PathBuf::from("stub://clip?frames=3&width=8&height=8"));

        // e.g. Ctrl-C while the annotator is still warming up.
        session.stop_handle().raise();
        let mut display = Statuses::default();
        let report = session.start(&selection, stub(), &RunOptions::default(), &mut display)?;
        assert_eq!(report.state, LoopState::Stopped);
        assert_eq!(report.frames_read, 0);
        assert!(!session.stop_handle().is_raised());

        let report = session.start(&selection, stub(), &RunOptions::default(), &mut display)?;
        assert_eq!(report.state, LoopState::Exhausted);
        assert_eq!(report.frames_read, 3);
        Ok(())
    }

    #[test]
    fn telemetry_toggle_tracks_flag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session(&dir.path().join("input.mp4"));
        assert!(!session.telemetry_enabled());
        session.set_telemetry_enabled(true);
        assert!(session.telemetry_enabled());
        session.set_telemetry_enabled(false);
        assert!(!session.telemetry_enabled());
    }
}
