use serde::Serialize;

/// One fully parsed diagnostic reading. Every field is present or the sample
/// does not exist.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub ram_used_mb: u32,
    pub ram_total_mb: u32,
    /// Per-core utilization as printed by the tool, e.g. `12%@1479,3%@1479`.
    pub cpu: String,
    pub emc_pct: u8,
    pub emc_mhz: u32,
    pub gr3d_pct: u8,
    pub gr3d_mhz: u32,
    pub gpu_temp_c: f32,
}
