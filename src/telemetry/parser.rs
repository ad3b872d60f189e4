//! Tegrastats line parser.

use regex::{Captures, Regex, RegexBuilder};
use std::str::FromStr;
use std::sync::OnceLock;

use super::TelemetrySample;

// Accepts `EMC_FREQ`/`EMC FREQ` and `GR3D_FREQ`/`GR3D FREQ` spellings.
const TEGRASTATS_PATTERN: &str = concat!(
    r"RAM\s+(?P<ram_used>\d+)/(?P<ram_total>\d+)MB.*?",
    r"CPU\s+\[(?P<cpu>.+?)\].*?",
    r"EMC[_ ]FREQ\s+(?P<emc_pct>\d+)%@(?P<emc_mhz>\d+).*?",
    r"GR3D[_ ]FREQ\s+(?P<gr3d_pct>\d+)%@(?P<gr3d_mhz>\d+).*?",
    r".*?GPU@(?P<gpu_temp>[\d.]+)C",
);

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        RegexBuilder::new(TEGRASTATS_PATTERN)
            .case_insensitive(true)
            .build()
            .unwrap()
    })
}

/// Parse one tegrastats line. Returns `None` unless every field matched and
/// converted.
pub fn parse_line(line: &str) -> Option<TelemetrySample> {
    let caps = pattern().captures(line)?;
    let gpu_temp_c: f32 = field(&caps, "gpu_temp")?;
    if !gpu_temp_c.is_finite() {
        return None;
    }
    Some(TelemetrySample {
        ram_used_mb: field(&caps, "ram_used")?,
        ram_total_mb: field(&caps, "ram_total")?,
        cpu: caps.name("cpu")?.as_str().to_string(),
        emc_pct: field(&caps, "emc_pct")?,
        emc_mhz: field(&caps, "emc_mhz")?,
        gr3d_pct: field(&caps, "gr3d_pct")?,
        gr3d_mhz: field(&caps, "gr3d_mhz")?,
        gpu_temp_c,
    })
}

fn field<T: FromStr>(caps: &Captures<'_>, name: &str) -> Option<T> {
    caps.name(name)?.as_str().parse().ok()
}
