//! family.rs
//! Sensor families: one variant per backend payload shape.
//! - every variant emits its full metric set on every call; absent data becomes `Unavailable`
//! - indexed members (probe index, I2C address, relay number) are looked up by identifier

use serde_json::{Map, Value};

use crate::sensing::reading::{ReadingValue, SensorReading, SensorStatus};

/// One field of a family member. The first key present in the payload wins,
/// which lets two payload spellings map onto one metric.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub keys: &'static [&'static str],
    pub name: &'static str,
    pub chartable: bool,
}

const fn field(key: &'static [&'static str], name: &'static str, chartable: bool) -> Field {
    Field { keys: key, name, chartable }
}

const HUMIDITY_FIELDS: &[Field] = &[
    field(&["temperature"], "temperature", true),
    field(&["humidity"], "humidity", true),
];

const POWER_FIELDS: &[Field] = &[
    field(&["bus_voltage"], "bus_voltage", true),
    field(&["shunt_voltage"], "shunt_voltage", true),
    field(&["current"], "current", true),
    field(&["power"], "power", true),
];

const TELEMETRY_FIELDS: &[Field] = &[
    field(&["cpu_temp"], "cpu_temp", true),
    field(&["cpu_freq"], "cpu_freq", true),
    field(&["mem_used"], "mem_used", true),
    field(&["mem_total"], "mem_total", false),
    field(&["disk_used"], "disk_used", true),
    field(&["disk_total"], "disk_total", false),
];

const COOLING_FIELDS: &[Field] = &[
    field(&["temperature"], "temperature", true),
    field(&["suit_temperature"], "suit_temperature", true),
    field(&["voltage"], "voltage", true),
    field(&["cooling_status"], "cooling_status", false),
    field(&["fans"], "fans", false),
];

const TEENSY_FIELDS: &[Field] = &[
    field(&["ts"], "ts", false),
    field(&["U"], "voltage", true),
    field(&["I"], "current", true),
    field(&["P"], "power", true),
    field(&["B", "button"], "button", false),
];

const RAIL_FIELDS: &[Field] = &[
    field(&["voltage"], "voltage", true),
    field(&["current"], "current", true),
    field(&["power"], "power", true),
];

const TEENSY_RAILS: &[(&str, &str)] = &[
    ("voltageSensorV3", "V3"),
    ("voltageSensorV5", "V5"),
    ("voltageSensorV5PiBrain", "V5PiBrain"),
    ("voltageSensorV24", "V24"),
];

const TEENSY_PROBES: &[(&str, &str)] = &[
    ("temperatureSensor1", "1"),
    ("temperatureSensor2", "2"),
];

pub const DEFAULT_HUMIDITY_INDICES: &[u32] = &[1, 2];
pub const DEFAULT_CURRENT_ADDRESSES: &[u8] = &[0x40, 0x41, 0x42, 0x43, 0x44, 0x45];
pub const DEFAULT_TEENSY_RELAYS: usize = 2;

/// Tagged dispatch over the sensor families a backend can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorFamily {
    /// Single DS18B20 temperature scalar.
    Probe,
    /// AHT20 temperature/humidity probes keyed by index ("1", "2", ...).
    HumidityGroup { indices: Vec<u32> },
    /// One INA219 voltage/current/power monitor.
    PowerMonitor,
    /// INA219 monitors keyed by I2C address ("0x40", ...).
    CurrentSenseArray { addresses: Vec<u8> },
    /// Host CPU/memory/disk telemetry.
    HostTelemetry,
    /// Cooling suit status panel.
    CoolingStatus,
    /// Teensy board: electrical readings, relays, button, voltage rails, probes.
    TeensyBoard { relays: usize },
}

impl SensorFamily {
    pub fn humidity_group() -> Self {
        SensorFamily::HumidityGroup { indices: DEFAULT_HUMIDITY_INDICES.to_vec() }
    }

    pub fn current_sense_array() -> Self {
        SensorFamily::CurrentSenseArray { addresses: DEFAULT_CURRENT_ADDRESSES.to_vec() }
    }

    pub fn teensy_board() -> Self {
        SensorFamily::TeensyBoard { relays: DEFAULT_TEENSY_RELAYS }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SensorFamily::Probe => "probe",
            SensorFamily::HumidityGroup { .. } => "humidity_group",
            SensorFamily::PowerMonitor => "power_monitor",
            SensorFamily::CurrentSenseArray { .. } => "current_sense_array",
            SensorFamily::HostTelemetry => "host_telemetry",
            SensorFamily::CoolingStatus => "cooling_status",
            SensorFamily::TeensyBoard { .. } => "teensy_board",
        }
    }

    /// Key under which the family appears inside a combined payload.
    pub fn payload_key(&self) -> &'static str {
        match self {
            SensorFamily::Probe => "temperature",
            SensorFamily::HumidityGroup { .. } => "aht20",
            SensorFamily::PowerMonitor => "ina219",
            SensorFamily::CurrentSenseArray { .. } => "ina219_all",
            SensorFamily::HostTelemetry => "telemetry",
            SensorFamily::CoolingStatus => "status",
            SensorFamily::TeensyBoard { .. } => "teency",
        }
    }

    /// Normalizes this family's slice of a payload. `None` means the family
    /// is absent and yields every metric as `Unavailable`/`off`.
    pub fn normalize(&self, raw: Option<&Value>, seq: u64, out: &mut Vec<SensorReading>) {
        match self {
            SensorFamily::Probe => {
                let value = ReadingValue::from_json(raw);
                let status = if value.is_available() {
                    SensorStatus::Ok
                } else {
                    SensorStatus::Off
                };
                out.push(SensorReading::new("temperature", value, status, seq).charted(true));
            }
            SensorFamily::HumidityGroup { indices } => {
                let group = raw.and_then(Value::as_object);
                for idx in indices {
                    let member = Member::new(group.and_then(|g| g.get(&idx.to_string())));
                    member.emit(&format!("aht20[{}]", idx), HUMIDITY_FIELDS, true, seq, out);
                }
            }
            SensorFamily::PowerMonitor => {
                Member::new(raw).emit("ina219", POWER_FIELDS, true, seq, out);
            }
            SensorFamily::CurrentSenseArray { addresses } => {
                let group = raw.and_then(Value::as_object);
                for addr in addresses {
                    let key = format!("0x{:02X}", addr);
                    let member = Member::new(group.and_then(|g| lookup_address(g, &key)));
                    member.emit(&format!("ina219[{}]", key), POWER_FIELDS, true, seq, out);
                }
            }
            SensorFamily::HostTelemetry => {
                Member::new(raw).emit("telemetry", TELEMETRY_FIELDS, false, seq, out);
            }
            SensorFamily::CoolingStatus => {
                Member::new(raw).emit("status", COOLING_FIELDS, false, seq, out);
            }
            SensorFamily::TeensyBoard { relays } => {
                let board = Member::new(raw);
                board.emit("teency", TEENSY_FIELDS, true, seq, out);

                // Compact frames carry relays as an array, the rail map as relayN keys.
                let relay_array = board.get("R").and_then(Value::as_array);
                for n in 1..=*relays {
                    let raw_relay = relay_array
                        .and_then(|r| r.get(n - 1))
                        .or_else(|| board.get(&format!("relay{}", n)));
                    let value = ReadingValue::from_json(raw_relay);
                    let status = board.status_for(&value);
                    out.push(SensorReading::new(format!("teency.relay[{}]", n), value, status, seq));
                }

                for (key, label) in TEENSY_RAILS {
                    Member::new(board.get(key)).emit(&format!("teency.rail[{}]", label), RAIL_FIELDS, true, seq, out);
                }
                for (key, label) in TEENSY_PROBES {
                    Member::new(board.get(key)).emit(&format!("teency.probe[{}]", label), HUMIDITY_FIELDS, true, seq, out);
                }
            }
        }
    }

    /// Every metric this family produces, with its chartable flag.
    pub fn catalog(&self) -> Vec<(String, bool)> {
        let mut readings = Vec::new();
        self.normalize(None, 0, &mut readings);
        readings.into_iter().map(|r| (r.metric, r.chartable)).collect()
    }
}

/// Address keys are hex; accept any letter case the backend emits.
fn lookup_address<'a>(group: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    group.get(key).or_else(|| {
        group
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

/// One object-shaped member of a family (a probe, a monitor, a rail).
struct Member<'a> {
    obj: Option<&'a Map<String, Value>>,
    reported: Option<(SensorStatus, ReadingValue)>,
}

impl<'a> Member<'a> {
    fn new(raw: Option<&'a Value>) -> Self {
        let obj = raw.and_then(Value::as_object);
        let reported = obj.and_then(|o| {
            if let Some(Value::String(s)) = o.get("status") {
                Some((SensorStatus::from_report(s), ReadingValue::Text(s.clone())))
            } else if let Some(Value::Bool(b)) = o.get("isAvailable") {
                let status = if *b { SensorStatus::Ok } else { SensorStatus::Off };
                Some((status, ReadingValue::Flag(*b)))
            } else {
                None
            }
        });
        Self { obj, reported }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.obj.and_then(|o| o.get(key))
    }

    fn field(&self, f: &Field) -> ReadingValue {
        if self.obj.is_none() {
            return ReadingValue::Unavailable;
        }
        let raw = f.keys.iter().find_map(|k| self.get(k).filter(|v| !v.is_null()));
        ReadingValue::from_json(raw)
    }

    /// Reported status wins; otherwise presence decides.
    fn status_for(&self, value: &ReadingValue) -> SensorStatus {
        match &self.reported {
            Some((status, _)) if self.obj.is_some() => *status,
            _ if value.is_available() => SensorStatus::Ok,
            _ => SensorStatus::Off,
        }
    }

    fn emit(&self, prefix: &str, fields: &[Field], with_status: bool, seq: u64, out: &mut Vec<SensorReading>) {
        for f in fields {
            let value = self.field(f);
            let status = self.status_for(&value);
            out.push(SensorReading::new(format!("{}.{}", prefix, f.name), value, status, seq).charted(f.chartable));
        }
        if with_status {
            let metric = format!("{}.status", prefix);
            match &self.reported {
                Some((status, raw)) => out.push(SensorReading::new(metric, raw.clone(), *status, seq)),
                None => out.push(SensorReading::off(metric, seq)),
            }
        }
    }
}
