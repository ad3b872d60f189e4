use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::V4l2Config;
use crate::pipeline::{RunOptions, DEFAULT_CONFIDENCE, DEFAULT_MAX_FPS};
use crate::telemetry::TelemetryConfig;

const DEFAULT_VIDEOS_DIR: &str = "/videos";
const DEFAULT_UPLOAD_PATH: &str = "input.mp4";
const DEFAULT_ANNOTATOR: &str = "motion";
const DEFAULT_UDP_PORT: u16 = 5000;
const DEFAULT_TELEMETRY_INTERVAL_MS: u64 = 1000;
const DEFAULT_DEVICE_ROOT: &str = "/dev/video";
const DEFAULT_DEVICE_WIDTH: u32 = 640;
const DEFAULT_DEVICE_HEIGHT: u32 = 480;

pub const CONFIDENCE_RANGE: RangeInclusive<f32> = 0.1..=0.9;
pub const MAX_FPS_RANGE: RangeInclusive<u32> = 5..=120;
pub const UDP_PORT_RANGE: RangeInclusive<u16> = 1024..=65535;

#[derive(Debug, Deserialize, Default)]
struct AnnotatorConfigFile {
    videos_dir: Option<PathBuf>,
    upload_path: Option<PathBuf>,
    annotator: Option<String>,
    controls: Option<ControlsConfigFile>,
    telemetry: Option<TelemetryConfigFile>,
    device: Option<DeviceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ControlsConfigFile {
    confidence: Option<f32>,
    max_fps: Option<u32>,
    udp_port: Option<u16>,
    show_memory: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct TelemetryConfigFile {
    enabled: Option<bool>,
    tegrastats_path: Option<PathBuf>,
    interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DeviceConfigFile {
    root: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AnnotatorConfig {
    pub videos_dir: PathBuf,
    pub upload_path: PathBuf,
    pub annotator: String,
    pub controls: ControlSettings,
    pub telemetry: TelemetrySettings,
    pub device: DeviceSettings,
}

/// Control-surface values and their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSettings {
    pub confidence: f32,
    pub max_fps: u32,
    pub udp_port: u16,
    pub show_memory: bool,
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub enabled: bool,
    pub tegrastats_path: Option<PathBuf>,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub root: String,
    pub width: u32,
    pub height: u32,
}

impl AnnotatorConfig {
    /// Defaults, then the file named by `ANNOTATOR_CONFIG`, then environment
    /// overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ANNOTATOR_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AnnotatorConfigFile) -> Self {
        let controls = file.controls.unwrap_or_default();
        let telemetry = file.telemetry.unwrap_or_default();
        let device = file.device.unwrap_or_default();
        Self {
            videos_dir: file
                .videos_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_VIDEOS_DIR)),
            upload_path: file
                .upload_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_PATH)),
            annotator: file
                .annotator
                .unwrap_or_else(|| DEFAULT_ANNOTATOR.to_string()),
            controls: ControlSettings {
                confidence: controls.confidence.unwrap_or(DEFAULT_CONFIDENCE),
                max_fps: controls.max_fps.unwrap_or(DEFAULT_MAX_FPS),
                udp_port: controls.udp_port.unwrap_or(DEFAULT_UDP_PORT),
                show_memory: controls.show_memory.unwrap_or(true),
            },
            telemetry: TelemetrySettings {
                enabled: telemetry.enabled.unwrap_or(true),
                tegrastats_path: telemetry.tegrastats_path,
                interval: Duration::from_millis(
                    telemetry
                        .interval_ms
                        .unwrap_or(DEFAULT_TELEMETRY_INTERVAL_MS),
                ),
            },
            device: DeviceSettings {
                root: device
                    .root
                    .unwrap_or_else(|| DEFAULT_DEVICE_ROOT.to_string()),
                width: device.width.unwrap_or(DEFAULT_DEVICE_WIDTH),
                height: device.height.unwrap_or(DEFAULT_DEVICE_HEIGHT),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("ANNOTATOR_VIDEOS_DIR") {
            if !dir.trim().is_empty() {
                self.videos_dir = PathBuf::from(dir);
            }
        }
        if let Ok(path) = std::env::var("ANNOTATOR_UPLOAD_PATH") {
            if !path.trim().is_empty() {
                self.upload_path = PathBuf::from(path);
            }
        }
        if let Ok(port) = std::env::var("ANNOTATOR_UDP_PORT") {
            self.controls.udp_port = port
                .trim()
                .parse()
                .map_err(|_| anyhow!("ANNOTATOR_UDP_PORT must be a port number"))?;
        }
        if let Ok(confidence) = std::env::var("ANNOTATOR_CONFIDENCE") {
            self.controls.confidence = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("ANNOTATOR_CONFIDENCE must be a number"))?;
        }
        if let Ok(max_fps) = std::env::var("ANNOTATOR_MAX_FPS") {
            self.controls.max_fps = max_fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("ANNOTATOR_MAX_FPS must be an integer"))?;
        }
        if let Ok(enabled) = std::env::var("ANNOTATOR_TELEMETRY") {
            self.telemetry.enabled = parse_flag(&enabled)
                .ok_or_else(|| anyhow!("ANNOTATOR_TELEMETRY must be on/off, true/false or 1/0"))?;
        }
        if let Ok(path) = std::env::var("ANNOTATOR_TEGRASTATS_PATH") {
            if !path.trim().is_empty() {
                self.telemetry.tegrastats_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(interval) = std::env::var("ANNOTATOR_TELEMETRY_INTERVAL_MS") {
            let millis: u64 = interval.trim().parse().map_err(|_| {
                anyhow!("ANNOTATOR_TELEMETRY_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.telemetry.interval = Duration::from_millis(millis);
        }
        Ok(())
    }

    /// Check control values against the control-surface bounds.
    pub fn validate(&self) -> Result<()> {
        let controls = &self.controls;
        if !CONFIDENCE_RANGE.contains(&controls.confidence) {
            return Err(anyhow!(
                "confidence {} is outside {:?}",
                controls.confidence,
                CONFIDENCE_RANGE
            ));
        }
        if !MAX_FPS_RANGE.contains(&controls.max_fps) {
            return Err(anyhow!(
                "max fps {} is outside {:?}",
                controls.max_fps,
                MAX_FPS_RANGE
            ));
        }
        if !UDP_PORT_RANGE.contains(&controls.udp_port) {
            return Err(anyhow!(
                "udp port {} is outside {:?}",
                controls.udp_port,
                UDP_PORT_RANGE
            ));
        }
        if self.telemetry.interval.is_zero() {
            return Err(anyhow!("telemetry interval must be greater than zero"));
        }
        if self.annotator.trim().is_empty() {
            return Err(anyhow!("annotator name must not be empty"));
        }
        Ok(())
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            confidence: self.controls.confidence,
            max_fps: self.controls.max_fps,
            show_memory: self.controls.show_memory,
        }
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            executable: self.telemetry.tegrastats_path.clone(),
            interval: self.telemetry.interval,
            ..TelemetryConfig::default()
        }
    }

    pub fn v4l2_config(&self) -> V4l2Config {
        V4l2Config {
            device_root: self.device.root.clone(),
            width: self.device.width,
            height: self.device.height,
            ..V4l2Config::default()
        }
    }
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self::from_file(AnnotatorConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<AnnotatorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_control_surface() -> Result<()> {
        let cfg = AnnotatorConfig::default();
        cfg.validate()?;
        assert_eq!(cfg.videos_dir, PathBuf::from("/videos"));
        assert_eq!(cfg.upload_path, PathBuf::from("input.mp4"));
        assert_eq!(
            cfg.controls,
            ControlSettings {
                confidence: 0.25,
                max_fps: 60,
                udp_port: 5000,
                show_memory: true,
            }
        );
        assert!(cfg.telemetry.enabled);
        assert_eq!(cfg.telemetry.interval, Duration::from_millis(1000));
        assert_eq!(cfg.run_options(), RunOptions::default());
        Ok(())
    }

    #[test]
    fn bounds_are_enforced() {
        let mut cfg = AnnotatorConfig::default();
        cfg.controls.confidence = 0.95;
        assert!(cfg.validate().is_err());

        let mut cfg = AnnotatorConfig::default();
        cfg.controls.max_fps = 4;
        assert!(cfg.validate().is_err());

        let mut cfg = AnnotatorConfig::default();
        cfg.controls.udp_port = 80;
        assert!(cfg.validate().is_err());

        let mut cfg = AnnotatorConfig::default();
        cfg.controls.max_fps = 120;
        cfg.controls.confidence = 0.9;
        cfg.controls.udp_port = 65535;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("ON"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
