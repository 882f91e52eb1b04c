//! normalizer.rs
//! Turns one raw JSON payload into readings for every registered sensor family.
//! - combined payloads (`/api/sensors`) dispatch by top-level key
//! - single-family endpoints (`/api/telemetry`, `/api/teency`, ...) bind a family to the payload root
//! - never fails: a payload that is not an object counts as "every family absent"

use std::collections::BTreeMap;

use serde_json::Value;

use crate::sensing::{
    family::SensorFamily,
    reading::SensorReading,
};

/// Where a family finds its data inside a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadScope {
    /// Under a top-level key of the payload object.
    Key(String),
    /// The payload itself.
    Root,
}

#[derive(Debug, Clone, Default)]
pub struct SensorNormalizer {
    keyed: BTreeMap<String, SensorFamily>,
    root: Vec<SensorFamily>,
}

impl SensorNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a family under its own payload key.
    pub fn keyed(self, family: SensorFamily) -> Self {
        let key = family.payload_key().to_string();
        self.with_key(key, family)
    }

    /// Registers a family under an explicit payload key.
    pub fn with_key(mut self, key: impl Into<String>, family: SensorFamily) -> Self {
        self.keyed.insert(key.into(), family);
        self
    }

    /// Binds a family to the whole payload.
    pub fn root(mut self, family: SensorFamily) -> Self {
        self.root.push(family);
        self
    }

    /// Family registered under a payload key.
    pub fn family_for_key(&self, key: &str) -> Option<&SensorFamily> {
        self.keyed.get(key)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (PayloadScope, &SensorFamily)> {
        self.root
            .iter()
            .map(|f| (PayloadScope::Root, f))
            .chain(self.keyed.iter().map(|(k, f)| (PayloadScope::Key(k.clone()), f)))
    }

    pub fn normalize(&self, raw: &Value, seq: u64) -> Vec<SensorReading> {
        let obj = raw.as_object();
        if obj.is_none() {
            log::debug!("payload is not an object; all families reported absent");
        }

        let mut out = Vec::new();
        for family in &self.root {
            family.normalize(obj.map(|_| raw), seq, &mut out);
        }
        for (key, family) in &self.keyed {
            family.normalize(obj.and_then(|o| o.get(key)), seq, &mut out);
        }
        out
    }

    /// Every metric the registered families produce, with chartable flags.
    pub fn catalog(&self) -> Vec<(String, bool)> {
        self.normalize(&Value::Null, 0)
            .into_iter()
            .map(|r| (r.metric, r.chartable))
            .collect()
    }

    /// Metrics that get a series buffer.
    pub fn chartable_metrics(&self) -> Vec<String> {
        self.catalog()
            .into_iter()
            .filter_map(|(metric, chartable)| chartable.then_some(metric))
            .collect()
    }
}
