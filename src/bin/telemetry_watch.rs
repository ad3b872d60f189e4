//! telemetry_watch - print tegrastats telemetry without running a pipeline.
//!
//! Starts the collector and, once per interval, prints the freshest sample
//! (as metric cards or JSON), the raw line when it does not parse, or the
//! waiting placeholder. Useful to check telemetry on a new board.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use edge_annotator::{TelemetryCollector, TelemetryConfig, TelemetryView};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Explicit tegrastats executable (skips the PATH lookup).
    #[arg(long, env = "ANNOTATOR_TEGRASTATS_PATH")]
    executable: Option<PathBuf>,

    /// Sampling interval in milliseconds.
    #[arg(long, env = "ANNOTATOR_TELEMETRY_INTERVAL_MS", default_value_t = 1000)]
    interval_ms: u64,

    /// Stop after this many reports (0 = until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    count: u64,

    /// Print parsed samples as JSON lines.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let interval = Duration::from_millis(args.interval_ms.max(1));
    let collector = TelemetryCollector::new(TelemetryConfig {
        executable: args.executable.clone(),
        interval,
        ..TelemetryConfig::default()
    });
    match collector.config().locate() {
        Some(path) => log::info!("telemetry_watch: using {}", path.display()),
        None => log::warn!("telemetry_watch: tegrastats not found; only the placeholder will show"),
    }
    collector.start();

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    let mut reports = 0u64;
    loop {
        match rx.recv_timeout(interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            _ => break,
        }
        let view = TelemetryView::from_latest(collector.latest());
        print_view(&view, args.json)?;
        reports += 1;
        if args.count > 0 && reports >= args.count {
            break;
        }
    }

    log::info!("telemetry_watch: stopping after {} reports", reports);
    collector.stop();
    Ok(())
}

fn print_view(view: &TelemetryView, json: bool) -> Result<()> {
    match view {
        TelemetryView::Sample(sample) if json => {
            println!("{}", serde_json::to_string(sample)?);
        }
        TelemetryView::Sample(_) => {
            for (title, value) in view.cards() {
                println!("{title:>9}: {value}");
            }
            println!();
        }
        _ => println!("{view}"),
    }
    Ok(())
}
