//! Background tegrastats reader.
//!
//! The collector owns the diagnostic subprocess and a reader thread. The
//! reader is the only writer of the freshness slot and the last raw line;
//! the frame loop only ever reads them through `latest()`.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{parse_line, FreshnessSlot, TelemetrySample};

/// How to find and launch the diagnostic tool.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Explicit executable. When set, no other location is tried.
    pub executable: Option<PathBuf>,
    /// Name looked up on `PATH`.
    pub program: String,
    /// Location tried when the `PATH` lookup finds nothing.
    pub fallback_path: PathBuf,
    /// Sampling interval passed as `--interval <ms>`.
    pub interval: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            executable: None,
            program: "tegrastats".to_string(),
            fallback_path: PathBuf::from("/usr/bin/tegrastats"),
            interval: Duration::from_millis(1000),
        }
    }
}

impl TelemetryConfig {
    /// Resolve the executable, or `None` when the tool is absent.
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = &self.executable {
            return path.is_file().then(|| path.clone());
        }
        if let Some(found) = search_path(&self.program) {
            return Some(found);
        }
        self.fallback_path
            .is_file()
            .then(|| self.fallback_path.clone())
    }
}

fn search_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[derive(Default)]
struct Shared {
    slot: FreshnessSlot<TelemetrySample>,
    last_raw: Mutex<String>,
    /// Bumped by every start and stop. A reader only publishes while its own
    /// generation is current.
    generation: AtomicU64,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

/// One launched reader and the tool it reads from.
struct Reader {
    generation: u64,
    child: Arc<Mutex<Option<Child>>>,
    handle: JoinHandle<()>,
}

/// Process-scoped telemetry collector.
///
/// Created once by the composition root and shared by reference across runs.
pub struct TelemetryCollector {
    config: TelemetryConfig,
    shared: Arc<Shared>,
    reader: Mutex<Option<Reader>>,
}

impl TelemetryCollector {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
            reader: Mutex::new(None),
        }
    }

    /// Launch the reader unless one is already active. Never fails and never
    /// waits on a previous tool that is still shutting down.
    pub fn start(&self) {
        let mut reader = lock(&self.reader);
        if let Some(active) = reader.as_ref() {
            if !active.handle.is_finished() && self.shared.is_current(active.generation) {
                return;
            }
        }
        // A retired reader keeps draining its own tool and reaps it on exit.
        *reader = None;

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let child = Arc::new(Mutex::new(None));
        let config = self.config.clone();
        let shared = Arc::clone(&self.shared);
        let owned = Arc::clone(&child);
        let spawned = std::thread::Builder::new()
            .name("telemetry-reader".to_string())
            .spawn(move || {
                if let Err(err) = read_telemetry(&config, &shared, generation, &owned) {
                    log::debug!("telemetry reader exited: {:#}", err);
                }
                reap(&owned);
            });
        match spawned {
            Ok(handle) => {
                *reader = Some(Reader {
                    generation,
                    child,
                    handle,
                })
            }
            Err(err) => log::debug!("telemetry reader not started: {}", err),
        }
    }

    /// Ask the tool to terminate. Best effort; failures are swallowed. The
    /// reader stops publishing immediately, whatever the tool does.
    pub fn stop(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(active) = lock(&self.reader).as_ref() {
            if let Some(child) = lock(&active.child).as_mut() {
                terminate(child);
            }
        }
    }

    /// Whether the current reader thread is alive.
    pub fn is_running(&self) -> bool {
        lock(&self.reader)
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Freshest unread sample (if any) and the last raw line. Non-blocking
    /// beyond two short critical sections; the sample is consumed.
    pub fn latest(&self) -> (Option<TelemetrySample>, String) {
        let sample = self.shared.slot.take();
        let raw = lock(&self.shared.last_raw).clone();
        (sample, raw)
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(TelemetryConfig::default())
    }
}

impl Drop for TelemetryCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_telemetry(
    config: &TelemetryConfig,
    shared: &Shared,
    generation: u64,
    owned: &Mutex<Option<Child>>,
) -> Result<()> {
    let Some(path) = config.locate() else {
        log::debug!("telemetry: {} not found; telemetry disabled", config.program);
        return Ok(());
    };
    let mut child = spawn_tool(&path, config.interval)?;
    let stdout = child
        .stdout
        .take()
        .context("tegrastats stdout was not captured")?;
    {
        let mut slot = lock(owned);
        if !shared.is_current(generation) {
            terminate(&mut child);
        }
        *slot = Some(child);
    }
    log::debug!("telemetry: reading {}", path.display());

    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .context("read tegrastats output")?;
        if read == 0 {
            return Ok(());
        }
        // Retired: keep draining so the tool can exit, publish nothing.
        if !shared.is_current(generation) {
            continue;
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim();
        *lock(&shared.last_raw) = line.to_string();
        if let Some(sample) = parse_line(line) {
            shared.slot.put(sample);
        }
    }
}

fn spawn_tool(path: &Path, interval: Duration) -> Result<Child> {
    Command::new(path)
        .arg("--interval")
        .arg(interval.as_millis().to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("spawn {}", path.display()))
}

fn reap(owned: &Mutex<Option<Child>>) {
    if let Some(mut child) = lock(owned).take() {
        if let Ok(None) = child.try_wait() {
            let _ = child.kill();
        }
        let _ = child.wait();
    }
}

fn terminate(child: &mut Child) {
    if !matches!(child.try_wait(), Ok(None)) {
        return;
    }
    #[cfg(target_os = "linux")]
    {
        let Ok(pid) = libc::pid_t::try_from(child.id()) else {
            return;
        };
        // SAFETY: signals the child we spawned and have not yet reaped.
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = child.kill();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
