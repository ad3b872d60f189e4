use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;

use edge_annotator::detect::{AnnotatedFrame, Annotator, MotionAnnotator};
use edge_annotator::ingest::{open_first, udp_candidates, FrameSource, V4l2Config};
use edge_annotator::{
    DeviceHint, DeviceInfo, DisplaySink, Frame, FrameLoop, LoopState, RunOptions, Session,
    SessionError, SourceKind, SourceOpener, SourceSelection, TelemetryCollector, TelemetryConfig,
    TelemetryView,
};

/// Counts every frame it is asked to annotate.
struct CountingAnnotator(Arc<AtomicU64>);

impl Annotator for CountingAnnotator {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn annotate(
        &mut self,
        frame: &Frame,
        _confidence: f32,
        _device: DeviceHint,
    ) -> Result<AnnotatedFrame> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(AnnotatedFrame::unannotated(frame.clone()))
    }
}

#[derive(Default)]
struct Collected {
    frames: Vec<u64>,
    detections: usize,
    throughput: Vec<f64>,
    telemetry: Vec<TelemetryView>,
    statuses: Vec<String>,
}

impl DisplaySink for Collected {
    fn show_frame(&mut self, frame: &AnnotatedFrame) -> Result<()> {
        self.frames.push(frame.frame.sequence);
        self.detections += frame.detections.len();
        Ok(())
    }

    fn show_throughput(&mut self, fps: f64) -> Result<()> {
        self.throughput.push(fps);
        Ok(())
    }

    fn show_telemetry(&mut self, view: &TelemetryView) -> Result<()> {
        self.telemetry.push(view.clone());
        Ok(())
    }

    fn show_memory_summary(&mut self, _summary: &str) -> Result<()> {
        Ok(())
    }

    fn show_status(&mut self, message: &str) -> Result<()> {
        self.statuses.push(message.to_string());
        Ok(())
    }
}

fn absent_telemetry() -> TelemetryCollector {
    TelemetryCollector::new(TelemetryConfig {
        executable: Some(PathBuf::from("/nonexistent/tegrastats")),
        ..TelemetryConfig::default()
    })
}

fn session(upload_path: &Path) -> Session {
    Session::new(
        SourceOpener::new(V4l2Config::default()),
        DeviceInfo::cpu(),
        Arc::new(absent_telemetry()),
        upload_path,
    )
}

#[test]
fn paced_source_is_throttled_to_max_fps() -> Result<()> {
    let calls = Arc::new(AtomicU64::new(0));
    let annotator: Arc<Mutex<dyn Annotator>> =
        Arc::new(Mutex::new(CountingAnnotator(Arc::clone(&calls))));
    let opener = SourceOpener::default();
    let source = opener.open_file(Path::new(
        "stub://clip?frames=10&interval_ms=100&width=32&height=32",
    ))?;

    let device = DeviceInfo::cpu();
    let mut display = Collected::default();
    let options = RunOptions {
        max_fps: 5,
        ..RunOptions::default()
    };
    let report = FrameLoop::new(annotator, &device, &mut display).run(source, &options)?;

    assert_eq!(report.state, LoopState::Exhausted);
    assert_eq!(report.frames_read, 10);
    assert!(
        (2..=5).contains(&report.frames_emitted),
        "emitted {} frames",
        report.frames_emitted
    );
    assert_eq!(report.frames_emitted + report.frames_dropped, 10);
    assert_eq!(calls.load(Ordering::SeqCst), report.frames_emitted);
    assert_eq!(display.frames.len() as u64, report.frames_emitted);
    Ok(())
}

#[test]
fn motion_annotator_sees_the_moving_square() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let session = session(&dir.path().join("input.mp4"));
    let annotator: Arc<Mutex<dyn Annotator>> = Arc::new(Mutex::new(MotionAnnotator::new()));
    let mut display = Collected::default();
    // 40ms apart, well above the 120 fps admission interval.
    let selection = SourceSelection::Mounted(PathBuf::from(
        "stub://street?frames=12&interval_ms=40&width=64&height=64",
    ));
    let options = RunOptions {
        confidence: 0.1,
        max_fps: 120,
        show_memory: false,
    };

    let report = session.start(&selection, annotator, &options, &mut display)?;

    assert_eq!(report.state, LoopState::Exhausted);
    assert_eq!(report.frames_emitted, 12);
    assert!(display.detections > 0);
    // Every 5th emitted frame reports throughput.
    assert_eq!(display.throughput.len(), 2);
    assert_eq!(display.statuses.last().map(String::as_str), Some("Finished."));
    Ok(())
}

#[test]
fn absent_telemetry_shows_placeholder_every_frame() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let session = session(&dir.path().join("input.mp4"));
    session.set_telemetry_enabled(true);

    let annotator: Arc<Mutex<dyn Annotator>> =
        Arc::new(Mutex::new(CountingAnnotator(Arc::new(AtomicU64::new(0)))));
    let mut display = Collected::default();
    let selection = SourceSelection::Mounted(PathBuf::from(
        "stub://clip?frames=3&interval_ms=40&width=8&height=8",
    ));
    let report = session.start(&selection, annotator, &RunOptions::default(), &mut display)?;

    assert_eq!(report.frames_emitted, 3);
    assert_eq!(display.telemetry, vec![TelemetryView::Waiting; 3]);
    assert_eq!(
        display.telemetry[0].to_string(),
        "Waiting for tegrastats..."
    );
    session.set_telemetry_enabled(false);
    Ok(())
}

#[test]
fn failing_candidates_never_start_a_loop() {
    let candidates = udp_candidates(5000);
    let mut tried = Vec::new();
    let result = open_first("udp port 5000", &candidates, |candidate| {
        tried.push(candidate.name);
        Err::<Box<dyn FrameSource>, _>(anyhow::anyhow!("bind failed"))
    });

    let Err(err) = result else {
        panic!("every candidate failed, open must fail");
    };
    assert_eq!(err.kind, SourceKind::Network);
    assert_eq!(tried, vec!["listen-any", "bind-all-low-latency"]);
    assert!(err.reason.contains("listen-any: bind failed"));
    assert!(err.reason.contains("bind-all-low-latency: bind failed"));
}

#[cfg(not(feature = "ingest-udp-ffmpeg"))]
#[test]
fn network_session_reports_listening_then_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let session = session(&dir.path().join("input.mp4"));
    let calls = Arc::new(AtomicU64::new(0));
    let annotator: Arc<Mutex<dyn Annotator>> =
        Arc::new(Mutex::new(CountingAnnotator(Arc::clone(&calls))));
    let mut display = Collected::default();

    let result = session.start(
        &SourceSelection::Network(5000),
        annotator,
        &RunOptions::default(),
        &mut display,
    );

    assert!(matches!(result, Err(SessionError::Source(_))));
    assert_eq!(display.statuses, vec!["Listening on UDP port 5000".to_string()]);
    assert!(display.frames.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!session.is_running());
    Ok(())
}
