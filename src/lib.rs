//! Edge Annotator
//!
//! Real-time video annotation for edge devices with live hardware telemetry.
//!
//! # Architecture
//!
//! Two flows run concurrently:
//!
//! 1. **Frame loop**: pulls frames from one source, drops frames arriving faster
//!    than the configured rate, annotates the rest and hands them to a display.
//! 2. **Telemetry reader**: a background thread parsing `tegrastats` output into
//!    a single-slot buffer that only ever holds the freshest sample.
//!
//! The loop owns its source and only reads the collector. The collector lives
//! for the whole session, independent of any single run.
//!
//! # Module Structure
//!
//! - `ingest`: Frame sources (local files, capture devices, UDP streams)
//! - `telemetry`: tegrastats parser, freshness slot and collector
//! - `pipeline`: Frame loop, rate limiter, throughput and display sink
//! - `detect`: Annotator trait and built-in annotators
//! - `session`: Control-surface boundary (start/stop, telemetry toggle, uploads)

pub mod config;
pub mod detect;
pub mod device;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod session;
pub mod telemetry;

pub use config::AnnotatorConfig;
pub use detect::{AnnotatedFrame, Annotator, AnnotatorRegistry, Detection};
pub use device::{DeviceHint, DeviceInfo};
pub use error::{RunError, SessionError, SourceKind, SourceUnavailable};
pub use frame::Frame;
pub use ingest::{list_videos, SourceHandle, SourceOpener};
pub use pipeline::{
    DisplaySink, FrameLoop, LoopState, RunOptions, RunReport, StopSignal, TelemetryView,
};
pub use session::{Session, SourceSelection};
pub use telemetry::{TelemetryCollector, TelemetryConfig, TelemetrySample};
