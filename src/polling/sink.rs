//! sink.rs
//! Display side of a poll cycle: receives normalized readings and series snapshots.
//! Called synchronously from the dispatch path, once per successful cycle per panel.

use std::sync::Arc;

use crate::sensing::reading::SensorReading;
use crate::utils::series::SeriesPoint;

pub trait DisplaySink: Send + Sync {
    /// All readings of one panel for one cycle (every known metric, including unavailable ones).
    fn render(&self, panel: &str, readings: &[SensorReading]);

    /// Current window of one chartable series, keyed `<panel>/<metric>`.
    fn render_series(&self, metric: &str, snapshot: &[SeriesPoint]);
}

/// Fans one cycle out to several sinks (console + web view).
#[derive(Clone, Default)]
pub struct SinkFanout {
    sinks: Vec<Arc<dyn DisplaySink>>,
}

impl SinkFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn DisplaySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl DisplaySink for SinkFanout {
    fn render(&self, panel: &str, readings: &[SensorReading]) {
        for sink in &self.sinks {
            sink.render(panel, readings);
        }
    }

    fn render_series(&self, metric: &str, snapshot: &[SeriesPoint]) {
        for sink in &self.sinks {
            sink.render_series(metric, snapshot);
        }
    }
}
