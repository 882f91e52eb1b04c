//! Operator control channel.
//!
//! Commands arrive as text lines (stdin) or from the web `/interval` route and are
//! applied by a single `Controller` task that owns every panel's `PollLoop`.
//!
//! ```text
//! interval <panel> <ms>   change cadence (history is kept)
//! stop <panel>            cancel the panel's timer
//! start <panel>           resume with one immediate fetch
//! clear                   empty every chart buffer
//! quit                    stop everything and exit
//! ```

use std::{collections::BTreeMap, str::FromStr, sync::Arc};

use log::{error, info, warn};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::advanced::dashboard::DashboardState;
use crate::polling::{
    poll_loop::{PollError, PollLoop},
    sink::DisplaySink,
    transport::TransportClient,
};
use crate::utils::{
    config::{ConfigError, DashboardConfig, Panel, PanelConfig, parse_interval_ms},
    recorder::CycleRecorder,
    series::SharedSeries,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    SetInterval { panel: Panel, ms: u64 },
    Stop(Panel),
    Start(Panel),
    Clear,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}' (try: interval, stop, start, clear, quit)")]
    Unknown(String),
    #[error("'{0}' is missing its {1} argument")]
    MissingArgument(&'static str, &'static str),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error("panel '{0}' is not part of this session")]
    InactivePanel(Panel),
}

impl FromStr for ControlCommand {
    type Err = ControlError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or(ControlError::Empty)?;
        let mut panel = |verb: &'static str| -> Result<Panel, ControlError> {
            Ok(words.next().ok_or(ControlError::MissingArgument(verb, "panel"))?.parse()?)
        };

        match verb.to_ascii_lowercase().as_str() {
            "interval" => {
                let panel = panel("interval")?;
                let ms = words
                    .next()
                    .ok_or(ControlError::MissingArgument("interval", "ms"))?;
                Ok(ControlCommand::SetInterval {
                    panel,
                    ms: parse_interval_ms(ms)?,
                })
            }
            "stop" => Ok(ControlCommand::Stop(panel("stop")?)),
            "start" => Ok(ControlCommand::Start(panel("start")?)),
            "clear" => Ok(ControlCommand::Clear),
            "quit" | "exit" => Ok(ControlCommand::Quit),
            other => Err(ControlError::Unknown(other.to_string())),
        }
    }
}

/// Owns one `PollLoop` per configured panel.
pub struct Controller {
    loops: BTreeMap<Panel, PollLoop>,
    panels: BTreeMap<Panel, PanelConfig>,
    series: SharedSeries,
    dashboard: Option<Arc<DashboardState>>,
}

impl Controller {
    pub fn new(
        config: &DashboardConfig,
        transport: Arc<dyn TransportClient>,
        sink: Arc<dyn DisplaySink>,
        series: SharedSeries,
        recorder: Option<CycleRecorder>,
    ) -> Self {
        let mut loops = BTreeMap::new();
        let mut panels = BTreeMap::new();
        for pc in &config.panels {
            let poll_loop = PollLoop::new(
                pc.panel.name(),
                transport.clone(),
                Arc::new(pc.panel.normalizer()),
                series.clone(),
                sink.clone(),
                recorder.clone(),
            );
            loops.insert(pc.panel, poll_loop);
            panels.insert(pc.panel, *pc);
        }
        Self {
            loops,
            panels,
            series,
            dashboard: None,
        }
    }

    /// Dashboard whose chart view is reset together with the buffers on `clear`.
    pub fn with_dashboard(mut self, dashboard: Arc<DashboardState>) -> Self {
        self.dashboard = Some(dashboard);
        self
    }

    pub fn poll_loop(&self, panel: Panel) -> Option<&PollLoop> {
        self.loops.get(&panel)
    }

    pub fn interval_ms(&self, panel: Panel) -> Option<u64> {
        self.panels.get(&panel).map(|pc| pc.interval_ms)
    }

    pub fn start_all(&mut self) -> Result<(), PollError> {
        for (panel, poll_loop) in self.loops.iter_mut() {
            if let Some(pc) = self.panels.get(panel) {
                poll_loop.start(pc.poll_config()?)?;
            }
        }
        Ok(())
    }

    pub fn stop_all(&mut self) {
        for poll_loop in self.loops.values_mut() {
            poll_loop.stop();
        }
    }

    /// Applies one command. Returns `false` once the session should end.
    pub fn apply(&mut self, cmd: ControlCommand) -> Result<bool, ControlError> {
        match cmd {
            ControlCommand::SetInterval { panel, ms } => {
                let poll_loop = self.loops.get_mut(&panel).ok_or(ControlError::InactivePanel(panel))?;
                // A stopped panel keeps the new cadence for its next start.
                if poll_loop.is_running() {
                    poll_loop.reconfigure(ms)?;
                }
                if let Some(pc) = self.panels.get_mut(&panel) {
                    pc.interval_ms = ms;
                }
            }
            ControlCommand::Stop(panel) => {
                self.loops
                    .get_mut(&panel)
                    .ok_or(ControlError::InactivePanel(panel))?
                    .stop();
            }
            ControlCommand::Start(panel) => {
                let pc = self.panels.get(&panel).ok_or(ControlError::InactivePanel(panel))?;
                let config = pc.poll_config()?;
                if let Some(poll_loop) = self.loops.get_mut(&panel) {
                    poll_loop.start(config)?;
                }
            }
            ControlCommand::Clear => {
                self.series.lock().clear_all();
                if let Some(dashboard) = &self.dashboard {
                    dashboard.clear_series();
                }
                info!("chart buffers cleared");
            }
            ControlCommand::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Applies commands until `quit` or until every sender is gone, then stops all loops.
    pub async fn run(mut self, mut rx: UnboundedReceiver<ControlCommand>) -> Self {
        while let Some(cmd) = rx.recv().await {
            info!("control: {:?}", cmd);
            match self.apply(cmd) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e @ ControlError::InactivePanel(_)) => warn!("control: {}", e),
                Err(e) => error!("control: {}", e),
            }
        }
        self.stop_all();
        info!("controller stopped all panels");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operator_lines() {
        assert_eq!(
            "interval telemetry 500".parse::<ControlCommand>(),
            Ok(ControlCommand::SetInterval { panel: Panel::Telemetry, ms: 500 })
        );
        assert_eq!("  STOP teency ".parse::<ControlCommand>(), Ok(ControlCommand::Stop(Panel::Teency)));
        assert_eq!("start current_array".parse::<ControlCommand>(), Ok(ControlCommand::Start(Panel::CurrentArray)));
        assert_eq!("clear".parse::<ControlCommand>(), Ok(ControlCommand::Clear));
        assert_eq!("quit".parse::<ControlCommand>(), Ok(ControlCommand::Quit));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!("".parse::<ControlCommand>(), Err(ControlError::Empty));
        assert_eq!(
            "interval telemetry".parse::<ControlCommand>(),
            Err(ControlError::MissingArgument("interval", "ms"))
        );
        assert_eq!(
            "interval telemetry 0".parse::<ControlCommand>(),
            Err(ControlError::Config(ConfigError::InvalidInterval("0".into())))
        );
        assert!(matches!("reboot".parse::<ControlCommand>(), Err(ControlError::Unknown(_))));
        assert!(matches!("stop fans".parse::<ControlCommand>(), Err(ControlError::Config(_))));
    }
}
