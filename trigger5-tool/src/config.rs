//! Configuration for the adapter tool.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use trigger5_core::mode::PRESETS;
use trigger5_core::transport::sim::{default_edid, standard_catalog};
use trigger5_core::{
    BulkBehavior, ClockSearchSpace, DeviceConfig, DeviceMode, DisplayTiming, MatchPolicy,
    ModeCatalog, SimulatedAdapter,
};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Device core tunables.
    pub device: DeviceSection,
    /// Behaviour of the simulated adapter.
    pub simulation: SimulationConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Device core tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    /// "exact" or "fallback-to-last".
    pub match_policy: MatchPolicy,
    /// Bulk transfer deadline in milliseconds.
    pub bulk_deadline_ms: u64,
    /// Wait for the previous frame, in milliseconds.
    pub completion_wait_ms: u64,
    pub bulk_endpoint: u8,
    /// Largest accepted pixel clock error.
    pub max_clock_error_ppm: u64,
    pub pll: PllConfig,
}

/// Bounds of the PLL search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PllConfig {
    pub prediv_max: u8,
    pub mul_max: u8,
    pub div1_max: u8,
    pub div2_min: u8,
    pub div2_max: u8,
}

/// Simulated adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Presets the adapter reports, in catalog order.
    pub modes: Vec<String>,
    /// Time the adapter takes to accept one frame.
    pub bulk_latency_ms: u64,
    /// Hold every bulk transfer until it times out.
    pub stall_bulk: bool,
    /// Interface count; above one the connector is HDMI.
    pub interfaces: u8,
    pub connected: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DeviceSection {
    fn default() -> Self {
        let core = DeviceConfig::default();
        Self {
            match_policy: core.match_policy,
            bulk_deadline_ms: core.bulk_deadline.as_millis() as u64,
            completion_wait_ms: core.completion_wait.as_millis() as u64,
            bulk_endpoint: core.bulk_endpoint,
            max_clock_error_ppm: core.max_clock_error_ppm,
            pll: PllConfig::default(),
        }
    }
}

impl Default for PllConfig {
    fn default() -> Self {
        Self {
            prediv_max: 16,
            mul_max: 50,
            div1_max: 50,
            div2_min: 2,
            div2_max: 16,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            modes: PRESETS.iter().map(|(name, _)| (*name).to_string()).collect(),
            bulk_latency_ms: 16,
            stall_bulk: false,
            interfaces: 1,
            connected: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ToolConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Convert the `[device]` section into a core `DeviceConfig`.
    pub fn to_device_config(&self) -> DeviceConfig {
        let d = &self.device;
        DeviceConfig {
            match_policy: d.match_policy,
            bulk_deadline: Duration::from_millis(d.bulk_deadline_ms.clamp(1, 60_000)),
            completion_wait: Duration::from_millis(d.completion_wait_ms.clamp(1, 60_000)),
            bulk_endpoint: d.bulk_endpoint,
            max_clock_error_ppm: d.max_clock_error_ppm.min(1_000_000),
            search_space: ClockSearchSpace::new(
                d.pll.prediv_max,
                d.pll.mul_max,
                d.pll.div1_max,
                d.pll.div2_min,
                d.pll.div2_max,
            ),
        }
    }
}

impl SimulationConfig {
    /// The catalog the simulated adapter reports. Unknown preset names
    /// are skipped; an empty list gives the standard catalog.
    pub fn catalog(&self) -> ModeCatalog {
        if self.modes.is_empty() {
            return standard_catalog();
        }
        let timings: Vec<DisplayTiming> = self
            .modes
            .iter()
            .filter_map(|name| {
                let timing = DisplayTiming::preset(name);
                if timing.is_none() {
                    tracing::warn!("unknown preset {name:?} in simulation.modes");
                }
                timing
            })
            .collect();
        ModeCatalog::from_modes(
            timings
                .iter()
                .enumerate()
                .map(|(i, t)| DeviceMode::from_timing(i as u8 + 1, t)),
        )
    }

    pub fn build_adapter(&self) -> SimulatedAdapter {
        let bulk = if self.stall_bulk {
            BulkBehavior::NeverComplete
        } else {
            BulkBehavior::Complete {
                latency: Duration::from_millis(self.bulk_latency_ms),
            }
        };
        let sim = SimulatedAdapter::new(self.catalog())
            .with_interfaces(self.interfaces)
            .with_bulk(bulk);
        sim.set_connected(self.connected);
        sim.set_edid(default_edid());
        sim
    }
}

// ── Tests ────────────────────────────────────────────────────────
