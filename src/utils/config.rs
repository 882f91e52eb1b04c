//! Panel catalogue and session configuration.
//!
//! Each dashboard panel polls one fixed endpoint with its own default cadence
//! and normalizes the payload through a fixed set of sensor families.

use std::{fmt, num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use clap::ValueEnum;
use thiserror::Error;

use crate::polling::poll_loop::{PollConfig, PollError};
use crate::polling::transport::DEFAULT_REQUEST_TIMEOUT;
use crate::sensing::{family::SensorFamily, normalizer::SensorNormalizer};
use crate::utils::series::DEFAULT_CAPACITY;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_WEB_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum Panel {
    Sensors,
    Cooling,
    Status,
    Telemetry,
    Teency,
    Voltage,
    CurrentArray,
}

impl Panel {
    pub const ALL: [Panel; 7] = [
        Panel::Sensors,
        Panel::Cooling,
        Panel::Status,
        Panel::Telemetry,
        Panel::Teency,
        Panel::Voltage,
        Panel::CurrentArray,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Panel::Sensors => "sensors",
            Panel::Cooling => "cooling",
            Panel::Status => "status",
            Panel::Telemetry => "telemetry",
            Panel::Teency => "teency",
            Panel::Voltage => "voltage",
            Panel::CurrentArray => "current_array",
        }
    }

    pub fn endpoint(self) -> &'static str {
        match self {
            Panel::Sensors | Panel::Cooling => "/api/sensors",
            Panel::Status => "/api/status",
            Panel::Telemetry => "/api/telemetry",
            Panel::Teency => "/api/teency",
            Panel::Voltage => "/api/ina219",
            Panel::CurrentArray => "/api/ina219?all=1",
        }
    }

    pub fn default_interval_ms(self) -> u64 {
        match self {
            Panel::Sensors | Panel::Voltage | Panel::CurrentArray => 250,
            Panel::Teency => 500,
            Panel::Cooling | Panel::Status | Panel::Telemetry => 1000,
        }
    }

    /// Families this panel shows, bound the way its endpoint reports them.
    pub fn normalizer(self) -> SensorNormalizer {
        let n = SensorNormalizer::new();
        match self {
            Panel::Sensors => n.keyed(SensorFamily::Probe).keyed(SensorFamily::PowerMonitor),
            Panel::Cooling => n.keyed(SensorFamily::humidity_group()),
            Panel::Status => n.root(SensorFamily::CoolingStatus),
            Panel::Telemetry => n.root(SensorFamily::HostTelemetry),
            Panel::Teency => n.root(SensorFamily::teensy_board()),
            Panel::Voltage => n.root(SensorFamily::PowerMonitor),
            Panel::CurrentArray => n.root(SensorFamily::current_sense_array()),
        }
    }
}

impl fmt::Display for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown panel '{0}'")]
    UnknownPanel(String),
    #[error("expected <panel>=<ms>, got '{0}'")]
    MalformedOverride(String),
    #[error("invalid interval '{0}'")]
    InvalidInterval(String),
}

impl FromStr for Panel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_ascii_lowercase();
        Panel::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownPanel(s.to_string()))
    }
}

/// Parses a millisecond interval given by the operator. Zero is rejected.
pub fn parse_interval_ms(raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(ms),
        _ => Err(ConfigError::InvalidInterval(raw.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelConfig {
    pub panel: Panel,
    pub interval_ms: u64,
}

impl PanelConfig {
    pub fn new(panel: Panel) -> Self {
        Self {
            panel,
            interval_ms: panel.default_interval_ms(),
        }
    }

    /// Parses `<panel>=<ms>`.
    pub fn parse_override(raw: &str) -> Result<Self, ConfigError> {
        let (name, ms) = raw
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedOverride(raw.to_string()))?;
        Ok(Self {
            panel: name.parse()?,
            interval_ms: parse_interval_ms(ms)?,
        })
    }

    pub fn poll_config(&self) -> Result<PollConfig, PollError> {
        PollConfig::new(self.interval_ms, self.panel.endpoint())
    }
}

/// Everything one dashboard session needs.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub series_capacity: NonZeroUsize,
    pub panels: Vec<PanelConfig>,
    pub web_addr: Option<String>,
    pub events_csv: Option<PathBuf>,
    pub demo: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            series_capacity: DEFAULT_CAPACITY,
            panels: Panel::ALL.into_iter().map(PanelConfig::new).collect(),
            web_addr: Some(DEFAULT_WEB_ADDR.to_string()),
            events_csv: None,
            demo: false,
        }
    }
}

impl DashboardConfig {
    /// Restricts the session to `panels` (all when empty) and applies interval overrides.
    pub fn select(mut self, panels: &[Panel], overrides: &[PanelConfig]) -> Self {
        if !panels.is_empty() {
            self.panels.retain(|pc| panels.contains(&pc.panel));
        }
        for ov in overrides {
            match self.panels.iter_mut().find(|pc| pc.panel == ov.panel) {
                Some(pc) => pc.interval_ms = ov.interval_ms,
                None => self.panels.push(*ov),
            }
        }
        self
    }

    pub fn panel(&self, panel: Panel) -> Option<&PanelConfig> {
        self.panels.iter().find(|pc| pc.panel == panel)
    }
}
