//! Accelerator capability and memory reporting.

use std::fmt;
use std::path::{Path, PathBuf};

const TEGRA_RELEASE: &str = "/etc/nv_tegra_release";
const NVIDIA_DRIVER_VERSION: &str = "/proc/driver/nvidia/version";
const DEVICE_TREE_MODEL: &str = "/proc/device-tree/model";
const MEMINFO: &str = "/proc/meminfo";

/// Which inference path an annotator should take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceHint {
    Accelerated,
    Default,
}

/// Accelerator presence plus a device name, probed once per process.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    accelerated: bool,
    name: String,
    meminfo_path: PathBuf,
}

impl DeviceInfo {
    pub fn new(accelerated: bool, name: impl Into<String>) -> Self {
        Self {
            accelerated,
            name: name.into(),
            meminfo_path: PathBuf::from(MEMINFO),
        }
    }

    /// Plain CPU host.
    pub fn cpu() -> Self {
        Self::new(false, "CPU")
    }

    /// Detect a Jetson/NVIDIA accelerator from driver files.
    pub fn probe() -> Self {
        let accelerated =
            Path::new(TEGRA_RELEASE).exists() || Path::new(NVIDIA_DRIVER_VERSION).exists();
        if !accelerated {
            return Self::cpu();
        }
        let name = std::fs::read_to_string(DEVICE_TREE_MODEL)
            .ok()
            .map(|model| model.trim_end_matches('\0').trim().to_string())
            .filter(|model| !model.is_empty())
            .unwrap_or_else(|| "NVIDIA GPU".to_string());
        log::info!("device: accelerator detected ({})", name);
        Self::new(true, name)
    }

    /// Read memory counters from `path` instead of `/proc/meminfo`.
    pub fn with_meminfo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.meminfo_path = path.into();
        self
    }

    pub fn is_accelerated(&self) -> bool {
        self.accelerated
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hint(&self) -> DeviceHint {
        if self.accelerated {
            DeviceHint::Accelerated
        } else {
            DeviceHint::Default
        }
    }

    pub fn sidebar_summary(&self) -> String {
        format!(
            "CUDA: {} | Device: {}",
            if self.accelerated { "ON" } else { "OFF" },
            self.name
        )
    }

    /// Memory usage line, or `None` without an accelerator or when the
    /// counters cannot be read.
    pub fn memory_summary(&self) -> Option<String> {
        if !self.accelerated {
            return None;
        }
        let meminfo = std::fs::read_to_string(&self.meminfo_path).ok()?;
        MemoryUsage::parse(&meminfo).map(|usage| usage.to_string())
    }
}

/// Unified memory counters in kB.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct MemoryUsage {
    total_kb: u64,
    available_kb: u64,
}

impl MemoryUsage {
    fn parse(meminfo: &str) -> Option<Self> {
        let mut total_kb = None;
        let mut available_kb = None;
        for line in meminfo.lines() {
            let mut fields = line.split_whitespace();
            let slot = match fields.next() {
                Some("MemTotal:") => &mut total_kb,
                Some("MemAvailable:") => &mut available_kb,
                _ => continue,
            };
            *slot = fields.next().and_then(|value| value.parse::<u64>().ok());
        }
        let total_kb = total_kb?;
        let available_kb = available_kb?;
        (available_kb <= total_kb).then_some(Self {
            total_kb,
            available_kb,
        })
    }
}

impl fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mb = |kb: u64| kb as f64 / 1024.0;
        write!(
            f,
            "Memory → Used: {:.1} MB | Available: {:.1} MB | Total: {:.0} MB",
            mb(self.total_kb - self.available_kb),
            mb(self.available_kb),
            mb(self.total_kb)
        )
    }
}
