//! Log-based display sink.
//! One `info!` line per panel per cycle; readings the backend flags as `error` get their own `error!` banner.

use log::{debug, error, info};

use crate::polling::sink::DisplaySink;
use crate::sensing::reading::{SensorReading, SensorStatus};
use crate::utils::series::{SeriesPoint, calculate_stats};

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    /// Also log a min/mean/max summary per chartable series.
    pub series_summary: bool,
}

impl ConsoleSink {
    pub fn new(series_summary: bool) -> Self {
        Self { series_summary }
    }

    /// `metric=value` pairs, `--` for unavailable ones.
    pub fn format_line(readings: &[SensorReading]) -> String {
        readings
            .iter()
            .map(|r| format!("{}={}", r.metric, r.display_text()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl DisplaySink for ConsoleSink {
    fn render(&self, panel: &str, readings: &[SensorReading]) {
        info!("[{}] {}", panel, Self::format_line(readings));

        for r in readings.iter().filter(|r| r.status == SensorStatus::Error) {
            error!("[{}] !!! {} reports ERROR (value {}) !!!", panel, r.metric, r.value);
        }
    }

    fn render_series(&self, metric: &str, snapshot: &[SeriesPoint]) {
        if !self.series_summary {
            return;
        }
        if let Some(stats) = calculate_stats(snapshot) {
            debug!(
                "{} n={} min={:.3} mean={:.3} max={:.3}",
                metric, stats.count, stats.min, stats.mean, stats.max
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensing::reading::ReadingValue;

    #[test]
    fn line_uses_placeholder_for_missing_values() {
        let readings = vec![
            SensorReading::new("ina219.bus_voltage", ReadingValue::Number(5.into()), SensorStatus::Ok, 3),
            SensorReading::off("ina219.current", 3),
        ];
        assert_eq!(
            ConsoleSink::format_line(&readings),
            "ina219.bus_voltage=5 ina219.current=--"
        );
    }
}
