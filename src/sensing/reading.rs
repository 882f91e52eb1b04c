//! reading.rs
//! Normalized sensor reading: one metric, one value, one health status, one sample stamp.
//! - `ReadingValue::Unavailable` is the only "no data" marker; `0`, `false` and `""` are real values
//! - status is what the sensor reported, not whether a value arrived

use std::fmt;

use serde::Serialize;
use serde_json::{Number, Value};

/// Placeholder shown wherever a value is `Unavailable`.
pub const UNAVAILABLE_PLACEHOLDER: &str = "--";

/// Sensor-reported health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    Ok,
    Off,
    Error,
}

impl SensorStatus {
    /// Parses a backend status string ("ok", "on", "off", "error", ...).
    /// Unknown words are treated as an error report so they stay visible.
    pub fn from_report(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ok" | "on" | "true" | "online" => SensorStatus::Ok,
            "off" | "false" | "offline" | "" => SensorStatus::Off,
            _ => SensorStatus::Error,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SensorStatus::Ok => "ok",
            SensorStatus::Off => "off",
            SensorStatus::Error => "error",
        }
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of one reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ReadingValue {
    /// Number exactly as received (integer stays integer).
    Number(Number),
    Text(String),
    Flag(bool),
    /// Field not present in this cycle's payload.
    Unavailable,
}

impl ReadingValue {
    /// Maps one JSON field to a value. `None` and `null` are absent.
    pub fn from_json(raw: Option<&Value>) -> Self {
        match raw {
            None | Some(Value::Null) => ReadingValue::Unavailable,
            Some(Value::Number(n)) => ReadingValue::Number(n.clone()),
            Some(Value::String(s)) => ReadingValue::Text(s.clone()),
            Some(Value::Bool(b)) => ReadingValue::Flag(*b),
            // Nested shapes where a scalar belongs: keep them visible verbatim.
            Some(other) => ReadingValue::Text(other.to_string()),
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, ReadingValue::Unavailable)
    }

    /// Numeric view used for charting.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ReadingValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Number(n) => write!(f, "{}", n),
            ReadingValue::Text(s) => f.write_str(s),
            ReadingValue::Flag(b) => write!(f, "{}", b),
            ReadingValue::Unavailable => f.write_str(UNAVAILABLE_PLACEHOLDER),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub metric: String,
    pub value: ReadingValue,
    pub status: SensorStatus,
    /// Sequence number assigned by the poll loop when the fetch was started.
    pub sampled_at: u64,
    /// Whether this metric feeds a series buffer.
    #[serde(skip)]
    pub chartable: bool,
}

impl SensorReading {
    pub fn new(metric: impl Into<String>, value: ReadingValue, status: SensorStatus, sampled_at: u64) -> Self {
        Self {
            metric: metric.into(),
            value,
            status,
            sampled_at,
            chartable: false,
        }
    }

    /// Reading for a sensor that is not reporting at all.
    pub fn off(metric: impl Into<String>, sampled_at: u64) -> Self {
        Self::new(metric, ReadingValue::Unavailable, SensorStatus::Off, sampled_at)
    }

    pub fn charted(mut self, chartable: bool) -> Self {
        self.chartable = chartable;
        self
    }

    /// Display text: value, placeholder, or an explicit error marker.
    pub fn display_text(&self) -> String {
        match self.status {
            SensorStatus::Error => format!("{} [ERROR]", self.value),
            _ => self.value.to_string(),
        }
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.metric, self.value, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_false_and_empty_string_are_values() {
        assert_eq!(ReadingValue::from_json(Some(&json!(0))), ReadingValue::Number(0.into()));
        assert_eq!(ReadingValue::from_json(Some(&json!(false))), ReadingValue::Flag(false));
        assert_eq!(ReadingValue::from_json(Some(&json!(""))), ReadingValue::Text(String::new()));
        assert!(ReadingValue::from_json(Some(&json!(0))).is_available());
    }

    #[test]
    fn null_and_missing_are_unavailable() {
        assert_eq!(ReadingValue::from_json(None), ReadingValue::Unavailable);
        assert_eq!(ReadingValue::from_json(Some(&Value::Null)), ReadingValue::Unavailable);
    }

    #[test]
    fn numbers_render_as_received() {
        assert_eq!(ReadingValue::from_json(Some(&json!(40))).to_string(), "40");
        assert_eq!(ReadingValue::from_json(Some(&json!(5.1))).to_string(), "5.1");
        assert_eq!(ReadingValue::Unavailable.to_string(), UNAVAILABLE_PLACEHOLDER);
    }

    #[test]
    fn status_words() {
        assert_eq!(SensorStatus::from_report("on"), SensorStatus::Ok);
        assert_eq!(SensorStatus::from_report("OK"), SensorStatus::Ok);
        assert_eq!(SensorStatus::from_report("off"), SensorStatus::Off);
        assert_eq!(SensorStatus::from_report("error"), SensorStatus::Error);
        assert_eq!(SensorStatus::from_report("overheated"), SensorStatus::Error);
    }

    #[test]
    fn error_reading_renders_marker() {
        let r = SensorReading::new("teency.status", ReadingValue::Text("error".into()), SensorStatus::Error, 3);
        assert_eq!(r.display_text(), "error [ERROR]");
        let off = SensorReading::off("aht20[1].humidity", 3);
        assert_eq!(off.display_text(), "--");
    }

    #[test]
    fn unavailable_serializes_distinctly() {
        let v = serde_json::to_value(ReadingValue::Unavailable).unwrap();
        assert_eq!(v, json!({"kind": "unavailable"}));
        let n = serde_json::to_value(ReadingValue::Number(0.into())).unwrap();
        assert_eq!(n, json!({"kind": "number", "value": 0}));
    }
}
