#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use edge_annotator::{TelemetryCollector, TelemetryConfig, TelemetrySample, TelemetryView};

static SCRIPT_LOCK: Mutex<()> = Mutex::new(());

const XAVIER_LINE: &str = "RAM 1878/3956MB (lfb 93x4MB) SWAP 0/1978MB (cached 0MB) \
CPU [12%@1479,3%@1479] EMC_FREQ 4%@1600 GR3D_FREQ 17%@921 APE 25 CPU@33.5C GPU@31.5C";

const ORIN_LINE: &str = "RAM 2848/7620MB (lfb 1x2MB) SWAP 0/3810MB (cached 0MB) \
CPU [1%@729,2%@729] EMC_FREQ 0%@2133 GR3D_FREQ 0%@[305,305] CPU@45.5C GPU@44.2C";

/// Writes a fake tegrastats that records its arguments, prints `line` and
/// then idles until terminated.
fn fake_tegrastats(dir: &Path, line: &str) -> PathBuf {
    let args_file = dir.join("args");
    write_script(
        dir,
        &format!(
            "echo \"$@\" > '{}'\necho '{}'\nexec sleep 30\n",
            args_file.display(),
            line
        ),
    )
}

/// Writes a fake tegrastats that prints `line`, then idles in short sleeps so
/// its TERM trap runs promptly.
fn trapping_tegrastats(dir: &Path, line: &str, on_term: &str) -> PathBuf {
    write_script(
        dir,
        &format!(
            "trap '{}' TERM\necho '{}'\nwhile true; do sleep 0.05; done\n",
            on_term, line
        ),
    )
}

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let script = dir.join("tegrastats");
    std::fs::write(&script, format!("#!/bin/sh\n{body}")).expect("write script");
    let mut perms = std::fs::metadata(&script).expect("stat script").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script, perms).expect("chmod script");
    script
}

fn collector(executable: PathBuf, interval: Duration) -> TelemetryCollector {
    TelemetryCollector::new(TelemetryConfig {
        executable: Some(executable),
        interval,
        ..TelemetryConfig::default()
    })
}

fn wait_for<T>(mut poll: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Some(value) = poll() {
            return Some(value);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    None
}

fn wait_stopped(collector: &TelemetryCollector) -> bool {
    wait_for(|| (!collector.is_running()).then_some(())).is_some()
}

#[test]
fn parsed_sample_reaches_the_slot_once() {
    let _guard = SCRIPT_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().expect("tempdir");
    let collector = collector(fake_tegrastats(dir.path(), XAVIER_LINE), Duration::from_millis(1000));
    collector.start();

    let sample: TelemetrySample = wait_for(|| collector.latest().0).expect("sample arrives");
    assert_eq!(sample.gr3d_pct, 17);
    assert_eq!(sample.gr3d_mhz, 921);
    assert_eq!(sample.gpu_temp_c, 31.5);

    // Consumed: the next read sees only the raw line.
    let (again, raw) = collector.latest();
    assert_eq!(again, None);
    assert_eq!(raw, XAVIER_LINE);

    collector.stop();
    assert!(wait_stopped(&collector));
}

#[test]
fn unparsed_line_is_shown_raw() {
    let _guard = SCRIPT_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().expect("tempdir");
    let collector = collector(fake_tegrastats(dir.path(), ORIN_LINE), Duration::from_millis(1000));
    collector.start();

    let raw = wait_for(|| {
        let (_, raw) = collector.latest();
        (!raw.is_empty()).then_some(raw)
    })
    .expect("raw line arrives");
    assert_eq!(raw, ORIN_LINE);

    let view = TelemetryView::from_latest(collector.latest());
    assert_eq!(view.to_string(), format!("tegrastats (raw): {ORIN_LINE}"));
    assert!(view.cards().is_empty());

    collector.stop();
    assert!(wait_stopped(&collector));
}

#[test]
fn interval_is_passed_in_milliseconds() {
    let _guard = SCRIPT_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().expect("tempdir");
    let collector = collector(fake_tegrastats(dir.path(), XAVIER_LINE), Duration::from_millis(250));
    collector.start();

    let args_file = dir.path().join("args");
    let args = wait_for(|| {
        std::fs::read_to_string(&args_file)
            .ok()
            .filter(|args| args.ends_with('\n'))
    })
    .expect("script recorded its arguments");
    assert_eq!(args.trim(), "--interval 250");

    collector.stop();
    assert!(wait_stopped(&collector));
}

#[test]
fn collector_restarts_after_stop() {
    let _guard = SCRIPT_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().expect("tempdir");
    let collector = collector(fake_tegrastats(dir.path(), XAVIER_LINE), Duration::from_millis(1000));

    collector.start();
    assert!(wait_for(|| collector.latest().0).is_some());
    collector.stop();
    assert!(wait_stopped(&collector));

    collector.start();
    assert!(collector.is_running());
    assert!(wait_for(|| collector.latest().0).is_some());
    collector.stop();
    assert!(wait_stopped(&collector));
}

#[test]
fn restart_does_not_wait_for_a_slow_shutdown() {
    let _guard = SCRIPT_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().expect("tempdir");
    let script = trapping_tegrastats(dir.path(), XAVIER_LINE, "sleep 2; exit 0");
    let collector = collector(script, Duration::from_millis(1000));

    collector.start();
    assert!(wait_for(|| collector.latest().0).is_some());
    collector.stop();

    let started = Instant::now();
    collector.start();
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "start took {:?}",
        started.elapsed()
    );
    assert!(collector.is_running());
    assert!(wait_for(|| collector.latest().0).is_some());

    collector.stop();
    assert!(wait_stopped(&collector));
}

#[test]
fn stopped_collector_publishes_nothing_while_the_tool_winds_down() {
    let _guard = SCRIPT_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().expect("tempdir");
    let farewell = format!(
        "i=0; while [ $i -lt 10 ]; do echo \"{XAVIER_LINE}\"; sleep 0.05; i=$((i+1)); done; exit 0"
    );
    let script = trapping_tegrastats(dir.path(), XAVIER_LINE, &farewell);
    let collector = collector(script, Duration::from_millis(1000));

    collector.start();
    assert!(wait_for(|| collector.latest().0).is_some());
    collector.stop();
    std::thread::sleep(Duration::from_millis(100));
    let _ = collector.latest();

    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(collector.latest().0, None);
    assert!(wait_stopped(&collector));
}
