//! Error taxonomy at the public boundaries.
//!
//! Opening a source fails with `SourceUnavailable`. A running loop fails with
//! `RunError`. Read failures after a successful open end the run normally and
//! are carried in the run report instead. Telemetry never produces an error.
//! `SessionError` wraps both for callers of `Session::start`.

use std::fmt;

use thiserror::Error;

/// Kind of frame source a caller asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Upload,
    Device,
    Network,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceKind::File => "file",
            SourceKind::Upload => "upload",
            SourceKind::Device => "device",
            SourceKind::Network => "network",
        };
        f.write_str(label)
    }
}

/// A source could not be opened. Definitive: nothing is retried.
#[derive(Debug, Error)]
#[error("cannot open {kind} source {target}: {reason}")]
pub struct SourceUnavailable {
    pub kind: SourceKind,
    pub target: String,
    pub reason: String,
}

impl SourceUnavailable {
    pub fn new(kind: SourceKind, target: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            kind,
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Build from an `anyhow` chain, keeping every context layer in the reason.
    pub fn from_chain(kind: SourceKind, target: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::new(kind, target, format!("{err:#}"))
    }
}

/// Fatal failure of a running frame loop.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("inference failed on frame {sequence}")]
    Inference {
        sequence: u64,
        #[source]
        source: anyhow::Error,
    },
    #[error("display sink failed")]
    Display(#[source] anyhow::Error),
}

/// Failure of a session start request.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a run is already active; stop it first")]
    Busy,
    #[error(transparent)]
    Source(#[from] SourceUnavailable),
    #[error(transparent)]
    Run(#[from] RunError),
}
