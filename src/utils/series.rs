//! Rolling chart buffers for live dashboard series.
//!
//! - **BoundedSeriesBuffer:** fixed-capacity FIFO window (evict oldest, then append).
//! - **SeriesStore:** one buffer per chartable metric of each panel, created at dashboard init and
//!   owned by the session. Keys are `<panel>/<metric>` (see [`series_key`]) so two panels reading the
//!   same sensor family never share a buffer.
//!
//! Buffers are only cleared on full dashboard reinitialization, never when a poll cadence changes.

use std::{
    collections::{BTreeMap, VecDeque},
    num::NonZeroUsize,
    sync::Arc,
};

use parking_lot::Mutex;
use serde::Serialize;

/// Default window length: one minute of samples at a 1 s cadence.
pub const DEFAULT_CAPACITY: NonZeroUsize = NonZeroUsize::new(60).unwrap();

/// Buffer key for `metric` as charted by `panel`.
pub fn series_key(panel: &str, metric: &str) -> String {
    format!("{}/{}", panel, metric)
}

/// Fixed-capacity rolling window. Insertion order is chronological order.
#[derive(Debug, Clone)]
pub struct BoundedSeriesBuffer<T> {
    capacity: NonZeroUsize,
    samples: VecDeque<T>,
}

impl<T: Clone> BoundedSeriesBuffer<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity.get()),
        }
    }

    /// Appends value; removes oldest first if at capacity (FIFO).
    #[inline]
    pub fn push(&mut self, value: T) {
        if self.samples.len() >= self.capacity.get() {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Ordered copy of the current window, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.samples.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&T> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

/// Chart sample: label is the poll sequence number that produced the value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub seq: u64,
    pub value: f64,
}

/// Statistics summary for one series window.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

/// Computes min, max, mean over a series window.
pub fn calculate_stats(points: &[SeriesPoint]) -> Option<Stats> {
    if points.is_empty() {
        return None;
    }

    let count = points.len();
    let min = points.iter().map(|p| p.value).fold(f64::INFINITY, f64::min);
    let max = points.iter().map(|p| p.value).fold(f64::NEG_INFINITY, f64::max);
    let mean = points.iter().map(|p| p.value).sum::<f64>() / count as f64;

    Some(Stats { min, max, mean, count })
}

/// Per-metric buffers for one dashboard session.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    capacity: NonZeroUsize,
    buffers: BTreeMap<String, BoundedSeriesBuffer<SeriesPoint>>,
}

pub type SharedSeries = Arc<Mutex<SeriesStore>>;

impl SeriesStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            buffers: BTreeMap::new(),
        }
    }

    pub fn shared(capacity: NonZeroUsize) -> SharedSeries {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// Creates buffers for the given metrics; existing buffers keep their history.
    pub fn register<I, S>(&mut self, metrics: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for metric in metrics {
            let capacity = self.capacity;
            self.buffers
                .entry(metric.into())
                .or_insert_with(|| BoundedSeriesBuffer::new(capacity));
        }
    }

    /// Pushes into a registered buffer. Unregistered metrics are ignored.
    pub fn push(&mut self, metric: &str, point: SeriesPoint) -> bool {
        match self.buffers.get_mut(metric) {
            Some(buf) => {
                buf.push(point);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self, metric: &str) -> Option<Vec<SeriesPoint>> {
        self.buffers.get(metric).map(BoundedSeriesBuffer::snapshot)
    }

    pub fn get(&self, metric: &str) -> Option<&BoundedSeriesBuffer<SeriesPoint>> {
        self.buffers.get(metric)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    /// Full dashboard reinitialization: empties every buffer.
    pub fn clear_all(&mut self) {
        for buf in self.buffers.values_mut() {
            buf.clear();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut buf = BoundedSeriesBuffer::new(cap(3));
        for v in [10, 20, 30, 40] {
            buf.push(v);
        }
        assert_eq!(buf.snapshot(), vec![20, 30, 40]);
    }

    #[test]
    fn length_is_min_of_capacity_and_pushes() {
        for c in [1usize, 2, 5, 60] {
            let mut buf = BoundedSeriesBuffer::new(cap(c));
            let mut pushed = Vec::new();
            for n in 0..(c * 2 + 3) {
                buf.push(n);
                pushed.push(n);
                assert_eq!(buf.len(), c.min(n + 1));
                let start = pushed.len().saturating_sub(c);
                assert_eq!(buf.snapshot(), pushed[start..].to_vec());
            }
        }
    }

    #[test]
    fn snapshot_does_not_mutate() {
        let mut buf = BoundedSeriesBuffer::new(cap(2));
        buf.push(1.5);
        let first = buf.snapshot();
        let second = buf.snapshot();
        assert_eq!(first, second);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.latest(), Some(&1.5));
    }

    #[test]
    fn clear_resets_to_empty() {
        let mut buf = BoundedSeriesBuffer::new(cap(4));
        buf.push("a");
        buf.push("b");
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 4);
    }

    #[test]
    fn store_ignores_unregistered_metrics() {
        let mut store = SeriesStore::new(cap(2));
        store.register(["cpu_temp"]);
        assert!(store.push("cpu_temp", SeriesPoint { seq: 1, value: 48.3 }));
        assert!(!store.push("disk_used", SeriesPoint { seq: 1, value: 3.0 }));
        assert_eq!(store.snapshot("cpu_temp").map(|s| s.len()), Some(1));
        assert!(store.snapshot("disk_used").is_none());
    }

    #[test]
    fn register_keeps_existing_history() {
        let mut store = SeriesStore::new(cap(2));
        store.register(["a"]);
        store.push("a", SeriesPoint { seq: 1, value: 1.0 });
        store.register(["a", "b"]);
        assert_eq!(store.snapshot("a").map(|s| s.len()), Some(1));
        store.clear_all();
        assert_eq!(store.snapshot("a"), Some(vec![]));
    }

    #[test]
    fn same_metric_from_two_panels_gets_two_buffers() {
        let mut store = SeriesStore::new(cap(4));
        let sensors = series_key("sensors", "ina219.bus_voltage");
        let voltage = series_key("voltage", "ina219.bus_voltage");
        assert_eq!(voltage, "voltage/ina219.bus_voltage");

        store.register([sensors.clone(), voltage.clone()]);
        store.push(&sensors, SeriesPoint { seq: 0, value: 5.0 });
        store.push(&voltage, SeriesPoint { seq: 0, value: 12.0 });
        store.push(&sensors, SeriesPoint { seq: 1, value: 5.1 });

        assert_eq!(store.snapshot(&sensors).map(|s| s.len()), Some(2));
        assert_eq!(store.snapshot(&voltage), Some(vec![SeriesPoint { seq: 0, value: 12.0 }]));
    }

    #[test]
    fn stats_over_window() {
        let points = [1.0, 4.0, 7.0].map(|v| SeriesPoint { seq: 0, value: v });
        let stats = calculate_stats(&points).unwrap();
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 7.0);
        assert_eq!(stats.mean, 4.0);
        assert!(calculate_stats(&[]).is_none());
    }
}
