use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use edge_annotator::detect::AnnotatedFrame;
use edge_annotator::pipeline::{DisplaySink, TelemetryView};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = spinner(Duration::from_millis(120));
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Terminal sink for one run.
    pub fn display(&self, snapshots: Option<FrameSnapshots>) -> TerminalDisplay {
        let status = self.use_pretty().then(|| spinner(Duration::from_millis(250)));
        TerminalDisplay {
            status,
            snapshots,
            frames_shown: 0,
            fps: None,
            telemetry: String::new(),
            memory: String::new(),
        }
    }
}

fn spinner(tick: Duration) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr());
    spinner.enable_steady_tick(tick);
    let style = ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Writes every `every`-th shown frame to `<dir>/latest.jpg`.
#[derive(Clone, Debug)]
pub struct FrameSnapshots {
    dir: PathBuf,
    every: u64,
}

impl FrameSnapshots {
    pub fn new(dir: PathBuf, every: u64) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create snapshot directory {}", dir.display()))?;
        Ok(Self {
            dir,
            every: every.max(1),
        })
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join("latest.jpg")
    }

    fn write(&self, frame: &AnnotatedFrame) -> Result<()> {
        let image = image::RgbImage::from_raw(
            frame.frame.width,
            frame.frame.height,
            frame.frame.pixels().to_vec(),
        )
        .context("frame buffer does not match its dimensions")?;
        let partial = self.dir.join("latest.jpg.partial");
        image
            .save_with_format(&partial, image::ImageFormat::Jpeg)
            .with_context(|| format!("write snapshot {}", partial.display()))?;
        let latest = self.latest_path();
        std::fs::rename(&partial, &latest)
            .with_context(|| format!("move snapshot to {}", latest.display()))
    }
}

/// Status-line display: a spinner in pretty mode, change-only stderr lines
/// in plain mode.
pub struct TerminalDisplay {
    status: Option<ProgressBar>,
    snapshots: Option<FrameSnapshots>,
    frames_shown: u64,
    fps: Option<f64>,
    telemetry: String,
    memory: String,
}

impl TerminalDisplay {
    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }

    fn refresh(&self) {
        if let Some(status) = &self.status {
            let fps = self
                .fps
                .map(|fps| format!("Pipeline FPS: {fps:.1}"))
                .unwrap_or_else(|| "Pipeline FPS: –".to_string());
            status.set_message(format!(
                "frame {} | {} | {}",
                self.frames_shown, fps, self.telemetry
            ));
        }
    }

    fn println(&self, line: &str) {
        match &self.status {
            Some(status) => status.println(line),
            None => eprintln!("{line}"),
        }
    }
}

impl DisplaySink for TerminalDisplay {
    fn show_frame(&mut self, frame: &AnnotatedFrame) -> Result<()> {
        self.frames_shown += 1;
        if let Some(snapshots) = &self.snapshots {
            if self.frames_shown % snapshots.every == 0 {
                snapshots.write(frame)?;
            }
        }
        if !frame.detections.is_empty() {
            log::debug!(
                "frame {}: {} detections",
                frame.frame.sequence,
                frame.detections.len()
            );
        }
        self.refresh();
        Ok(())
    }

    fn show_throughput(&mut self, fps: f64) -> Result<()> {
        self.fps = Some(fps);
        if self.status.is_none() {
            eprintln!("Pipeline FPS: {fps:.1}");
        }
        self.refresh();
        Ok(())
    }

    fn show_telemetry(&mut self, view: &TelemetryView) -> Result<()> {
        let text = view.to_string();
        if text != self.telemetry {
            if self.status.is_none() {
                eprintln!("{text}");
            }
            self.telemetry = text;
        }
        Ok(())
    }

    fn show_memory_summary(&mut self, summary: &str) -> Result<()> {
        if summary != self.memory {
            self.println(summary);
            self.memory = summary.to_string();
        }
        Ok(())
    }

    fn show_status(&mut self, message: &str) -> Result<()> {
        self.println(message);
        Ok(())
    }
}

impl Drop for TerminalDisplay {
    fn drop(&mut self) {
        if let Some(status) = self.status.take() {
            status.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_annotator::frame::Frame;

    fn plain() -> Ui {
        Ui::from_args(Some("plain"), true, false)
    }

    #[test]
    fn pretty_requires_a_terminal() {
        assert!(!Ui::from_args(Some("pretty"), false, false).use_pretty());
        assert!(Ui::from_args(Some("pretty"), true, true).use_pretty());
        assert!(!Ui::from_args(Some("auto"), true, true).use_pretty());
        assert!(!plain().use_pretty());
    }

    #[test]
    fn snapshots_write_every_nth_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let snapshots = FrameSnapshots::new(dir.path().join("frames"), 2)?;
        let latest = snapshots.latest_path();
        let mut display = plain().display(Some(snapshots));

        let frame = AnnotatedFrame::unannotated(Frame::new(vec![90u8; 16 * 8 * 3], 16, 8, 1)?);
        display.show_frame(&frame)?;
        assert!(!latest.exists());
        display.show_frame(&frame)?;
        assert!(latest.exists());
        assert_eq!(display.frames_shown(), 2);
        Ok(())
    }

    #[test]
    fn telemetry_text_tracks_latest_view() -> Result<()> {
        let mut display = plain().display(None);
        display.show_telemetry(&TelemetryView::Waiting)?;
        assert_eq!(display.telemetry, "Waiting for tegrastats...");
        display.show_telemetry(&TelemetryView::Raw("line".to_string()))?;
        assert_eq!(display.telemetry, "tegrastats (raw): line");
        Ok(())
    }
}
