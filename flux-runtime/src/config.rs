//! Static TOML-loaded configuration (§6.3), ambient per SPEC_FULL §2: the
//! scheduling engine itself treats configuration parsing as an external
//! collaborator, but something has to parse `config_tbl`'s fields before a
//! `TickDriver` can boot workers, so that lands here.
//!
//! Field names and the device-model sentinels (`"fake"`, `"default"`) follow
//! `cfg.c`'s `config_tbl`/`parse_nvme_device_model`/`parse_scheduler_mode`;
//! the shape itself (derive `Deserialize`, load with `toml`) follows
//! `abitofhelp-adaptive_pipeline`'s config module rather than the source's
//! `libconfig` calls.

use std::path::Path;

use flux_engine::{CostModel, DeviceModel, SchedulerMode};
use serde::Deserialize;

use crate::error::ConfigError;

/// One `token_limits[]` entry from a named device model (§6.3): a
/// calibration point mapping a committed p95 latency target to the token
/// rate the device can sustain at that target.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CalibrationPoint {
    pub p95_latency_limit: u32,
    pub max_token_rate: f64,
    #[serde(default)]
    pub max_rdonly_token_rate: Option<f64>,
}

/// `nvme_device_model` (§6.3): either the `"fake"`/`"default"` sentinels or
/// a named, fully calibrated table.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceModelConfig {
    /// `"fake"`: `read_cost_4KB=100, write_cost_4KB=2000`, no rate limit.
    Fake,
    /// `"default"`: no calibration, no limit.
    Default,
    /// A named model: explicit costs plus a `token_limits` table.
    Named {
        read_cost_4kb: u64,
        write_cost_4kb: u64,
        token_limits: Vec<CalibrationPoint>,
    },
}

impl DeviceModelConfig {
    pub fn cost_model(&self) -> CostModel {
        match self {
            Self::Fake => CostModel::fake(),
            Self::Default => CostModel::fake(),
            Self::Named {
                read_cost_4kb,
                write_cost_4kb,
                ..
            } => CostModel::new(*read_cost_4kb, *write_cost_4kb),
        }
    }

    pub fn device_model(&self, name: &str) -> Result<DeviceModel, ConfigError> {
        match self {
            Self::Fake | Self::Default => Ok(DeviceModel::unlimited()),
            Self::Named { token_limits, .. } => {
                if token_limits.is_empty() {
                    return Err(ConfigError::MissingCalibration(name.to_string()));
                }
                let points = token_limits
                    .iter()
                    .map(|p| {
                        (
                            p.p95_latency_limit,
                            p.max_token_rate,
                            p.max_rdonly_token_rate.unwrap_or(p.max_token_rate),
                        )
                    })
                    .collect();
                Ok(DeviceModel::from_points(points))
            }
        }
    }
}

fn default_scheduler() -> SchedulerModeConfig {
    SchedulerModeConfig::LessV0
}

/// Mirrors `parse_scheduler_mode`'s string table (`"reflex"`, `"reflexrr"`,
/// `"wfq"`, `"wdrr"`, `"lessv0"`, `"lessv1"`, `"lessv2"`) plus `"off"`, which
/// the source maps to `NO_SCHED` with the default flash device; we keep
/// `"off"` as its own variant so a deployment can say "no admission control,
/// no scheduling" explicitly rather than silently picking `LessV0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerModeConfig {
    Reflex,
    Reflexrr,
    Wfq,
    Wdrr,
    Lessv0,
    Lessv1,
    Lessv2,
    Off,
}

impl SchedulerModeConfig {
    /// `None` for `Off` — a `TickDriver` built against `Off` should skip
    /// scheduling entirely rather than construct a `Scheduler` it never
    /// calls, matching the source's `NO_SCHED` short-circuit.
    pub fn to_scheduler_mode(self) -> Option<SchedulerMode> {
        match self {
            Self::Reflex => Some(SchedulerMode::Reflex),
            Self::Reflexrr => Some(SchedulerMode::ReflexRr),
            Self::Wfq => Some(SchedulerMode::Wfq),
            Self::Wdrr => Some(SchedulerMode::Wdrr),
            Self::Lessv0 => Some(SchedulerMode::LessV0),
            Self::Lessv1 => Some(SchedulerMode::LessV1),
            Self::Lessv2 => Some(SchedulerMode::LessV2),
            Self::Off => None,
        }
    }
}

/// One physical NVMe device (§6.3's `devices`/`nvme_devices`/`ns_sizes`
/// triple, collapsed into one entry per device).
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub path: String,
    pub ns_size_bytes: u64,
}

/// Top-level runtime configuration (§6.3), loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Pinned OS thread per entry (`parse_cpu`'s single-int-or-array form
    /// collapses to "always a list" here — a one-element list is the
    /// single-int case).
    pub cpu: Vec<usize>,
    pub devices: Vec<DeviceConfig>,
    pub nvme_device_model: DeviceModelConfig,
    #[serde(default = "default_scheduler")]
    pub scheduler: SchedulerModeConfig,
    /// Listen address for the network front-end (ambient — not in §6.3's
    /// device/scheduler fields, but `host_addr`/`port` are config_tbl
    /// entries too).
    pub host_addr: String,
    pub port: u16,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_device_model_parses_and_is_unlimited() {
        let toml = r#"
            cpu = [0, 1]
            host_addr = "0.0.0.0"
            port = 4444
            scheduler = "lessv0"

            [[devices]]
            path = "/dev/nvme0n1"
            ns_size_bytes = 1073741824

            [nvme_device_model]
            kind = "fake"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cpu, vec![0, 1]);
        let device = config.nvme_device_model.device_model("fake").unwrap();
        assert!(matches!(device.lookup(500, false), flux_engine::TokenRate::Unlimited));
    }

    #[test]
    fn named_model_without_calibration_points_is_rejected() {
        let toml = r#"
            cpu = [0]
            host_addr = "0.0.0.0"
            port = 4444

            [[devices]]
            path = "/dev/nvme0n1"
            ns_size_bytes = 1073741824

            [nvme_device_model]
            kind = "named"
            read_cost_4kb = 100
            write_cost_4kb = 2000
            token_limits = []
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.nvme_device_model.device_model("calibrated").is_err());
    }

    #[test]
    fn off_scheduler_mode_maps_to_none() {
        assert_eq!(SchedulerModeConfig::Off.to_scheduler_mode(), None);
        assert_eq!(
            SchedulerModeConfig::Lessv0.to_scheduler_mode(),
            Some(SchedulerMode::LessV0)
        );
    }
}
