//! Hardware telemetry scraped from `tegrastats`.
//!
//! `TelemetryCollector` runs the tool in the background and keeps only the
//! freshest parsed sample. A missing tool is normal: the collector then
//! reports nothing and the display falls back to a placeholder.

mod collector;
mod parser;
mod sample;
mod slot;

pub use collector::{TelemetryCollector, TelemetryConfig};
pub use parser::parse_line;
pub use sample::TelemetrySample;
pub use slot::FreshnessSlot;
