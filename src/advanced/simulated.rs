//! Synthetic backend for `--demo` runs without hardware.
//!
//! Every endpoint the dashboard polls returns a plausible payload: base value plus uniform noise,
//! with members randomly missing (probe unplugged) or reporting `off`/`error`, and the occasional
//! transport failure so the skip-and-continue path shows up in the logs.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::polling::transport::{FetchError, TransportClient};
use crate::sensing::family::{DEFAULT_CURRENT_ADDRESSES, DEFAULT_HUMIDITY_INDICES};

/// One simulated measurement: base value plus uniform noise.
#[derive(Debug, Clone, Copy)]
struct Signal {
    base: f64,
    noise: f64,
}

impl Signal {
    const fn new(base: f64, noise: f64) -> Self {
        Self { base, noise }
    }

    fn sample(self) -> f64 {
        let raw = self.base + rand::random_range(-self.noise..=self.noise);
        (raw * 1000.0).round() / 1000.0
    }
}

const PROBE_TEMP: Signal = Signal::new(24.0, 0.5);
const AHT_TEMP: Signal = Signal::new(26.0, 1.0);
const AHT_HUMIDITY: Signal = Signal::new(45.0, 3.0);
const BUS_VOLTAGE: Signal = Signal::new(5.05, 0.05);
const SHUNT_VOLTAGE: Signal = Signal::new(0.012, 0.002);
const CURRENT_MA: Signal = Signal::new(450.0, 40.0);
const CPU_TEMP: Signal = Signal::new(52.0, 4.0);
const CPU_FREQ: Signal = Signal::new(1500.0, 300.0);
const SUIT_TEMP: Signal = Signal::new(31.0, 1.5);
const TEENSY_VOLTAGE: Signal = Signal::new(12.1, 0.2);
const TEENSY_CURRENT: Signal = Signal::new(1.8, 0.3);

const MEM_TOTAL_MB: u64 = 3_884;
const DISK_TOTAL_GB: u64 = 29;

#[derive(Debug, Clone, Copy)]
pub struct SimulatedTransport {
    /// Probability a whole request fails.
    failure_rate: f64,
    /// Probability an individual member is missing from a payload.
    dropout_rate: f64,
}

/// Maps any input onto a valid probability; NaN counts as never.
fn probability(p: f64) -> f64 {
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self {
            failure_rate: 0.02,
            dropout_rate: 0.05,
        }
    }
}

impl SimulatedTransport {
    pub fn new(failure_rate: f64, dropout_rate: f64) -> Self {
        Self {
            failure_rate: probability(failure_rate),
            dropout_rate: probability(dropout_rate),
        }
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    pub fn dropout_rate(&self) -> f64 {
        self.dropout_rate
    }

    fn present(&self) -> bool {
        !rand::random_bool(self.dropout_rate)
    }

    fn status_word(&self) -> &'static str {
        match rand::random_range(0..100) {
            0 => "error",
            1..=3 => "off",
            _ => "on",
        }
    }

    fn power_monitor(&self) -> Value {
        let bus = BUS_VOLTAGE.sample();
        let current = CURRENT_MA.sample();
        json!({
            "bus_voltage": bus,
            "shunt_voltage": SHUNT_VOLTAGE.sample(),
            "current": current,
            "power": (bus * current).round(),
        })
    }

    fn sensors(&self) -> Value {
        let mut payload = Map::new();
        if self.present() {
            payload.insert("temperature".into(), json!(PROBE_TEMP.sample()));
        }
        if self.present() {
            let mut ina = self.power_monitor();
            ina["status"] = json!(self.status_word());
            payload.insert("ina219".into(), ina);
        }
        let mut aht = Map::new();
        for idx in DEFAULT_HUMIDITY_INDICES {
            if self.present() {
                aht.insert(
                    idx.to_string(),
                    json!({
                        "temperature": AHT_TEMP.sample(),
                        "humidity": AHT_HUMIDITY.sample(),
                        "status": self.status_word(),
                    }),
                );
            }
        }
        payload.insert("aht20".into(), Value::Object(aht));
        Value::Object(payload)
    }

    fn current_array(&self) -> Value {
        let mut payload = Map::new();
        for addr in DEFAULT_CURRENT_ADDRESSES {
            let key = format!("0x{:02x}", addr);
            let member = match self.status_word() {
                "on" => {
                    let mut m = self.power_monitor();
                    m["status"] = json!("on");
                    m
                }
                other => json!({ "status": other }),
            };
            payload.insert(key, member);
        }
        Value::Object(payload)
    }

    fn telemetry(&self) -> Value {
        let mem_used = rand::random_range(900..1_400u64);
        let disk_used = rand::random_range(11..13u64);
        json!({
            "cpu_temp": CPU_TEMP.sample(),
            "cpu_freq": CPU_FREQ.sample().round(),
            "mem_used": mem_used,
            "mem_total": MEM_TOTAL_MB,
            "disk_used": disk_used,
            "disk_total": DISK_TOTAL_GB,
        })
    }

    fn cooling_status(&self) -> Value {
        let fans = rand::random_range(0..=2u8);
        json!({
            "temperature": PROBE_TEMP.sample(),
            "suit_temperature": SUIT_TEMP.sample(),
            "voltage": TEENSY_VOLTAGE.sample(),
            "cooling_status": if fans > 0 { "active" } else { "idle" },
            "fans": fans,
        })
    }

    fn teensy(&self) -> Value {
        let u = TEENSY_VOLTAGE.sample();
        let i = TEENSY_CURRENT.sample();
        json!({
            "ts": rand::random_range(0..u32::MAX),
            "U": u,
            "I": i,
            "P": (u * i * 100.0).round() / 100.0,
            "R": [rand::random_range(0..=1u8), rand::random_range(0..=1u8)],
            "B": rand::random_range(0..=1u8),
            "status": "ok",
        })
    }

    /// Payload for `endpoint`, or `None` if the backend has no such route.
    pub fn payload(&self, endpoint: &str) -> Option<Value> {
        let payload = match endpoint {
            "/api/sensors" => self.sensors(),
            "/api/status" => self.cooling_status(),
            "/api/telemetry" => self.telemetry(),
            "/api/teency" => self.teensy(),
            "/api/ina219" => self.power_monitor(),
            "/api/ina219?all=1" => self.current_array(),
            _ => return None,
        };
        Some(payload)
    }
}

#[async_trait]
impl TransportClient for SimulatedTransport {
    async fn fetch_json(&self, endpoint: &str) -> Result<Value, FetchError> {
        if rand::random_bool(self.failure_rate) {
            return Err(FetchError::Transport("simulated connection reset".into()));
        }
        self.payload(endpoint).ok_or(FetchError::Status(404))
    }
}
