use anyhow::Result;
use std::fmt;

use crate::detect::AnnotatedFrame;
use crate::telemetry::TelemetrySample;

/// Where a run sends its output.
pub trait DisplaySink {
    fn show_frame(&mut self, frame: &AnnotatedFrame) -> Result<()>;

    fn show_throughput(&mut self, fps: f64) -> Result<()>;

    fn show_telemetry(&mut self, view: &TelemetryView) -> Result<()>;

    fn show_memory_summary(&mut self, summary: &str) -> Result<()>;

    /// One-off status message (source opened, run finished).
    fn show_status(&mut self, message: &str) -> Result<()> {
        log::info!("{}", message);
        Ok(())
    }
}

/// What the telemetry panel shows after an emitted frame.
#[derive(Clone, Debug, PartialEq)]
pub enum TelemetryView {
    Sample(TelemetrySample),
    /// Last raw line when it did not parse.
    Raw(String),
    Waiting,
}

impl TelemetryView {
    /// Parsed sample first, then the raw line, then the placeholder.
    pub fn from_latest(latest: (Option<TelemetrySample>, String)) -> Self {
        match latest {
            (Some(sample), _) => TelemetryView::Sample(sample),
            (None, raw) if !raw.is_empty() => TelemetryView::Raw(raw),
            _ => TelemetryView::Waiting,
        }
    }

    /// Metric cards as (title, value) pairs. Empty unless a sample parsed.
    pub fn cards(&self) -> Vec<(&'static str, String)> {
        let TelemetryView::Sample(sample) = self else {
            return Vec::new();
        };
        vec![
            ("GPU Util", format!("{}%", sample.gr3d_pct)),
            ("GPU Clock", format!("{} MHz", sample.gr3d_mhz)),
            (
                "RAM Used",
                format!("{}/{} MB", sample.ram_used_mb, sample.ram_total_mb),
            ),
            (
                "EMC",
                format!("{}% @ {} MHz", sample.emc_pct, sample.emc_mhz),
            ),
            ("GPU Temp", format!("{} °C", sample.gpu_temp_c)),
        ]
    }
}

impl fmt::Display for TelemetryView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryView::Sample(_) => {
                let cards: Vec<String> = self
                    .cards()
                    .into_iter()
                    .map(|(title, value)| format!("{title}: {value}"))
                    .collect();
                f.write_str(&cards.join(" | "))
            }
            TelemetryView::Raw(raw) => write!(f, "tegrastats (raw): {raw}"),
            TelemetryView::Waiting => f.write_str("Waiting for tegrastats..."),
        }
    }
}
