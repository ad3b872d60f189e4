//! annotate - run the annotation loop on one source with live telemetry.
//!
//! Opens a mounted video, an uploaded file, a capture device or a UDP stream,
//! annotates frames at up to `--max-fps` and reports throughput, tegrastats
//! telemetry and accelerator memory on stderr. Ctrl-C ends the run cleanly.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use edge_annotator::ingest::sender_hint;
use edge_annotator::{
    list_videos, AnnotatorConfig, AnnotatorRegistry, DeviceInfo, LoopState, RunReport, Session,
    SourceOpener, SourceSelection, TelemetryCollector,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SourceArg {
    /// A video under the mounted videos directory.
    Mounted,
    /// A local file staged to the upload path first.
    Upload,
    /// A capture device (/dev/videoN).
    Device,
    /// A raw UDP stream (e.g. MPEG-TS from ffmpeg).
    Network,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Where frames come from.
    #[arg(long, value_enum, default_value = "mounted")]
    source: SourceArg,

    /// Video to play (mounted/upload). Relative mounted names resolve
    /// against the videos directory; defaults to the first listed video.
    #[arg(long)]
    path: Option<PathBuf>,

    /// Capture device index (device source).
    #[arg(long, env = "ANNOTATOR_DEVICE_INDEX", default_value_t = 0)]
    device_index: u32,

    /// UDP port (network source). Overrides the configured port.
    #[arg(long)]
    port: Option<u16>,

    /// Confidence threshold (0.1..=0.9).
    #[arg(long)]
    confidence: Option<f32>,

    /// Maximum emitted frames per second (5..=120).
    #[arg(long)]
    max_fps: Option<u32>,

    /// Annotator to run (see --list-annotators).
    #[arg(long)]
    annotator: Option<String>,

    /// Do not start the tegrastats collector.
    #[arg(long)]
    no_telemetry: bool,

    /// Do not print the accelerator memory summary.
    #[arg(long)]
    no_memory: bool,

    /// List playable videos in the videos directory and exit.
    #[arg(long)]
    list_videos: bool,

    /// List available annotators and exit.
    #[arg(long)]
    list_annotators: bool,

    /// Write annotated frames to DIR/latest.jpg.
    #[arg(long, value_name = "DIR")]
    save_frames: Option<PathBuf>,

    /// With --save-frames, write every Nth shown frame.
    #[arg(long, default_value_t = 1)]
    save_every: u64,

    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = AnnotatorConfig::load()?;
    apply_overrides(&mut cfg, &args);
    cfg.validate()?;

    if args.list_videos {
        for video in list_videos(&cfg.videos_dir)? {
            println!("{}", video.display());
        }
        return Ok(());
    }
    let registry = AnnotatorRegistry::with_builtin();
    if args.list_annotators {
        for name in registry.list() {
            println!("{name}");
        }
        return Ok(());
    }

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let selection = select_source(&args, &cfg)?;
    let device = {
        let _stage = ui.stage("Probe device");
        DeviceInfo::probe()
    };
    eprintln!("{}", device.sidebar_summary());

    let annotator = {
        let _stage = ui.stage("Load annotator");
        let annotator = registry.select(&cfg.annotator)?;
        annotator
            .lock()
            .map_err(|_| anyhow!("annotator lock poisoned"))?
            .warm_up()
            .with_context(|| format!("warm up annotator {}", cfg.annotator))?;
        annotator
    };

    let session = Session::new(
        SourceOpener::new(cfg.v4l2_config()),
        device,
        Arc::new(TelemetryCollector::new(cfg.telemetry_config())),
        cfg.upload_path.clone(),
    );
    session.set_telemetry_enabled(cfg.telemetry.enabled);

    let stop = session.stop_handle();
    ctrlc::set_handler(move || stop.raise()).context("error setting Ctrl-C handler")?;

    if let SourceSelection::Network(port) = &selection {
        eprintln!("Send a stream with:\n  {}", sender_hint(*port));
    }

    let snapshots = args
        .save_frames
        .clone()
        .map(|dir| ui::FrameSnapshots::new(dir, args.save_every))
        .transpose()?;
    let mut display = ui.display(snapshots);
    let result = session.start(&selection, annotator, &cfg.run_options(), &mut display);
    let shown = display.frames_shown();
    drop(display);
    session.set_telemetry_enabled(false);

    let report = result?;
    print_report(&report, shown);
    match (report.state, report.failure) {
        (LoopState::Failed, Some(reason)) => Err(anyhow!("source failed: {reason}")),
        _ => Ok(()),
    }
}

fn apply_overrides(cfg: &mut AnnotatorConfig, args: &Args) {
    if let Some(confidence) = args.confidence {
        cfg.controls.confidence = confidence;
    }
    if let Some(max_fps) = args.max_fps {
        cfg.controls.max_fps = max_fps;
    }
    if let Some(port) = args.port {
        cfg.controls.udp_port = port;
    }
    if let Some(name) = &args.annotator {
        cfg.annotator = name.clone();
    }
    if args.no_telemetry {
        cfg.telemetry.enabled = false;
    }
    if args.no_memory {
        cfg.controls.show_memory = false;
    }
}

fn select_source(args: &Args, cfg: &AnnotatorConfig) -> Result<SourceSelection> {
    let selection = match args.source {
        SourceArg::Mounted => SourceSelection::Mounted(mounted_video(
            &cfg.videos_dir,
            args.path.as_deref(),
        )?),
        SourceArg::Upload => {
            let path = args
                .path
                .clone()
                .ok_or_else(|| anyhow!("--source upload requires --path"))?;
            SourceSelection::Upload(path)
        }
        SourceArg::Device => SourceSelection::Device(args.device_index),
        SourceArg::Network => SourceSelection::Network(cfg.controls.udp_port),
    };
    Ok(selection)
}

fn mounted_video(videos_dir: &Path, requested: Option<&Path>) -> Result<PathBuf> {
    match requested {
        Some(path) if is_bare_name(path) => Ok(videos_dir.join(path)),
        Some(path) => Ok(path.to_path_buf()),
        None => list_videos(videos_dir)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no videos found in {}", videos_dir.display())),
    }
}

fn is_bare_name(path: &Path) -> bool {
    let scheme = path.to_str().is_some_and(|p| p.contains("://"));
    !scheme && path.is_relative() && !path.exists()
}

fn print_report(report: &RunReport, shown: u64) {
    let fps = report
        .last_fps
        .map(|fps| format!("{fps:.1}"))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{}: {:?} after {} frames read, {} emitted, {} dropped, {} shown, last fps {}",
        report.source_label,
        report.state,
        report.frames_read,
        report.frames_emitted,
        report.frames_dropped,
        shown,
        fps
    );
}
