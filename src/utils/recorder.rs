//! Poll-cycle event recording for diagnostics.
//!
//! `record()` pushes into a lock-free bounded queue and never blocks a poll cycle;
//! events are silently dropped when the queue is full (dropped count is kept).
//! `export_csv()` drains the queue into a CSV file, one event per row.

use std::{
    fs::File,
    io::BufWriter,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use crossbeam_queue::ArrayQueue;
use csv::Writer;
use serde::Serialize;

const EVENT_QUEUE_CAPACITY: usize = 16_384;

/// Cycle lifecycle: fetch start through dispatch or rejection.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent {
    /// Fetch issued for a sequence number.
    Started { panel: String, seq: u64, ts_ns: u64 },
    /// Payload normalized, buffers updated, sink rendered.
    Dispatched { panel: String, seq: u64, ts_ns: u64, readings: usize },
    /// Fetch or parse failed; cycle skipped.
    Failed { panel: String, seq: u64, ts_ns: u64, reason: String },
    /// Payload arrived for a superseded timer or an older sequence.
    Discarded { panel: String, seq: u64, ts_ns: u64 },
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    seq: u64,
    panel: &'a str,
    event: &'static str,
    ts_ns: u64,
    detail: String,
}

impl CycleEvent {
    fn to_row(&self) -> CsvRow<'_> {
        match self {
            CycleEvent::Started { panel, seq, ts_ns } => CsvRow {
                seq: *seq,
                panel,
                event: "started",
                ts_ns: *ts_ns,
                detail: String::new(),
            },
            CycleEvent::Dispatched { panel, seq, ts_ns, readings } => CsvRow {
                seq: *seq,
                panel,
                event: "dispatched",
                ts_ns: *ts_ns,
                detail: format!("readings={}", readings),
            },
            CycleEvent::Failed { panel, seq, ts_ns, reason } => CsvRow {
                seq: *seq,
                panel,
                event: "failed",
                ts_ns: *ts_ns,
                detail: reason.clone(),
            },
            CycleEvent::Discarded { panel, seq, ts_ns } => CsvRow {
                seq: *seq,
                panel,
                event: "discarded",
                ts_ns: *ts_ns,
                detail: String::new(),
            },
        }
    }
}

/// Non-blocking event recorder shared by every poll loop of a session.
#[derive(Clone)]
pub struct CycleRecorder {
    queue: Arc<ArrayQueue<CycleEvent>>,
    dropped: Arc<AtomicU64>,
    run_start: Instant,
}

impl Default for CycleRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleRecorder {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
            dropped: Arc::new(AtomicU64::new(0)),
            run_start: Instant::now(),
        }
    }

    #[inline]
    pub fn record(&self, event: CycleEvent) {
        if self.queue.push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Nanosecond timestamp since recorder creation.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.run_start.elapsed().as_nanos() as u64
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Removes and returns every queued event, oldest first.
    pub fn drain(&self) -> Vec<CycleEvent> {
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(event) = self.queue.pop() {
            out.push(event);
        }
        out
    }

    /// Drains the queue into a CSV file. Returns the number of rows written.
    pub fn export_csv(&self, path: &Path) -> Result<usize, csv::Error> {
        let file = File::create(path)?;
        let mut wtr = Writer::from_writer(BufWriter::new(file));
        let events = self.drain();
        for event in &events {
            wtr.serialize(event.to_row())?;
        }
        wtr.flush()?;
        log::info!(
            "exported {} cycle events to {} (dropped={})",
            events.len(),
            path.display(),
            self.dropped()
        );
        Ok(events.len())
    }
}
