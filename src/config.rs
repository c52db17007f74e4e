use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Shell out to `nvidia-smi`
    Smi,
    /// Query the NVIDIA management library directly
    Nvml,
}

/// GPU usage dashboard with per-process owner attribution
#[derive(Parser, Debug, Clone)]
#[command(name = "gpu-dashboard", version, about)]
pub struct Args {
    /// Telemetry backend
    #[arg(long, value_enum, default_value_t = Backend::Smi)]
    pub backend: Backend,

    /// Path to the nvidia-smi binary
    #[arg(long, default_value = "nvidia-smi")]
    pub nvidia_smi: String,

    /// Path to the ps binary
    #[arg(long, default_value = "ps")]
    pub ps: String,

    /// Upper bound for every external tool invocation
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: u64,

    /// Seconds between refreshes
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_secs: u64,

    /// Collect a single snapshot, print it and exit
    #[arg(long)]
    pub once: bool,

    /// Print the snapshot as JSON (with --once)
    #[arg(long, requires = "once")]
    pub json: bool,
}

impl Args {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// UI settings persisted across sessions through eframe storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    pub refresh_secs: u64,
    pub show_charts: bool,
}

impl DashboardSettings {
    pub const KEY: &'static str = "gpu-dashboard-settings";
    pub const MIN_REFRESH_SECS: u64 = 1;
    pub const MAX_REFRESH_SECS: u64 = 300;

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(
            self.refresh_secs
                .clamp(Self::MIN_REFRESH_SECS, Self::MAX_REFRESH_SECS),
        )
    }
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            refresh_secs: 5,
            show_charts: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["gpu-dashboard"]).unwrap();
        assert_eq!(args.backend, Backend::Smi);
        assert_eq!(args.nvidia_smi, "nvidia-smi");
        assert_eq!(args.timeout(), Duration::from_secs(3));
        assert_eq!(args.interval_secs, 5);
        assert!(!args.once);
    }

    #[test]
    fn rejects_zero_timeout_and_json_without_once() {
        assert!(Args::try_parse_from(["gpu-dashboard", "--timeout-secs", "0"]).is_err());
        assert!(Args::try_parse_from(["gpu-dashboard", "--json"]).is_err());
        let args = Args::try_parse_from([
            "gpu-dashboard",
            "--once",
            "--json",
            "--backend",
            "nvml",
        ])
        .unwrap();
        assert!(args.json);
        assert_eq!(args.backend, Backend::Nvml);
    }

    #[test]
    fn settings_fill_missing_fields_and_clamp() {
        let settings: DashboardSettings = serde_json::from_str(r#"{"refresh_secs": 0}"#).unwrap();
        assert!(settings.show_charts);
        assert_eq!(settings.refresh_interval(), Duration::from_secs(1));
    }
}
