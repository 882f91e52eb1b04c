//! poll_loop.rs
//! Periodic fetch → normalize → dispatch for one dashboard panel.
//! - one tokio task per loop is the timer; the loop owns its handle exclusively
//! - `start` fetches immediately, `reconfigure` swaps the timer without touching history
//! - cycles never overlap: a tick waits for the previous fetch, missed ticks are skipped
//! - dispatch runs under the control lock and is dropped when its generation or sequence is stale,
//!   so nothing from a superseded timer reaches the buffers once `stop`/`reconfigure` returns

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::polling::{
    sink::DisplaySink,
    transport::{FetchError, TransportClient},
};
use crate::sensing::{normalizer::SensorNormalizer, reading::SensorReading};
use crate::utils::{
    recorder::{CycleEvent, CycleRecorder},
    series::{SeriesPoint, SharedSeries, series_key},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("poll interval must be a positive number of milliseconds, got {0}")]
    InvalidInterval(u64),
    #[error("poll loop must be started from inside a tokio runtime")]
    NoRuntime,
    #[error("poll loop '{0}' has no endpoint yet; call start first")]
    NotStarted(String),
}

/// Outcome of a manual cycle: the loop was not ready, or the fetch failed.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

fn validate_interval(interval_ms: u64) -> Result<Duration, PollError> {
    if interval_ms == 0 {
        return Err(PollError::InvalidInterval(interval_ms));
    }
    Ok(Duration::from_millis(interval_ms))
}

/// Cadence and endpoint of one panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    interval: Duration,
    endpoint: String,
}

impl PollConfig {
    pub fn new(interval_ms: u64, endpoint: impl Into<String>) -> Result<Self, PollError> {
        Ok(Self {
            interval: validate_interval(interval_ms)?,
            endpoint: endpoint.into(),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval.as_millis() as u64
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Sequencing state guarded by the control lock.
#[derive(Debug, Default)]
struct LoopControl {
    generation: u64,
    next_seq: u64,
    last_dispatched: Option<u64>,
}

#[derive(Debug, Default)]
struct PollStats {
    started: AtomicU64,
    dispatched: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

/// Counters since the loop was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStatsSnapshot {
    pub started: u64,
    pub dispatched: u64,
    pub failed: u64,
    pub discarded: u64,
}

/// Everything a cycle needs; shared between the loop handle and its timer task.
struct CycleContext {
    panel: String,
    transport: Arc<dyn TransportClient>,
    normalizer: Arc<SensorNormalizer>,
    series: SharedSeries,
    sink: Arc<dyn DisplaySink>,
    recorder: Option<CycleRecorder>,
    control: Mutex<LoopControl>,
    stats: PollStats,
}

impl CycleContext {
    fn record(&self, event: impl FnOnce(&CycleRecorder) -> CycleEvent) {
        if let Some(rec) = &self.recorder {
            rec.record(event(rec));
        }
    }

    /// Allocates the next sequence number, or `None` if this timer was superseded.
    fn begin_cycle(&self, generation: u64) -> Option<u64> {
        let mut ctl = self.control.lock();
        if ctl.generation != generation {
            return None;
        }
        let seq = ctl.next_seq;
        ctl.next_seq += 1;
        drop(ctl);

        self.stats.started.fetch_add(1, Ordering::Relaxed);
        self.record(|r| CycleEvent::Started {
            panel: self.panel.clone(),
            seq,
            ts_ns: r.now_ns(),
        });
        Some(seq)
    }

    fn finish_cycle(&self, generation: u64, seq: u64, result: &Result<Value, FetchError>) -> Option<Vec<SensorReading>> {
        match result {
            Ok(raw) => self.dispatch(generation, seq, raw),
            Err(e) => {
                self.fail(seq, e);
                None
            }
        }
    }

    /// Skips the cycle. Last-known-good values stay on display and the timer keeps running.
    fn fail(&self, seq: u64, e: &FetchError) {
        self.stats.failed.fetch_add(1, Ordering::Relaxed);
        warn!("[{}] cycle {} skipped: {}", self.panel, seq, e);
        self.record(|r| CycleEvent::Failed {
            panel: self.panel.clone(),
            seq,
            ts_ns: r.now_ns(),
            reason: e.to_string(),
        });
    }

    /// Normalize, push chartable values, render. Atomic with respect to stop/reconfigure.
    fn dispatch(&self, generation: u64, seq: u64, raw: &Value) -> Option<Vec<SensorReading>> {
        let mut ctl = self.control.lock();
        let stale_timer = ctl.generation != generation;
        let out_of_order = ctl.last_dispatched.is_some_and(|last| seq <= last);
        if stale_timer || out_of_order {
            drop(ctl);
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(
                "[{}] discarded cycle {} (stale_timer={}, out_of_order={})",
                self.panel, seq, stale_timer, out_of_order
            );
            self.record(|r| CycleEvent::Discarded {
                panel: self.panel.clone(),
                seq,
                ts_ns: r.now_ns(),
            });
            return None;
        }

        let readings = self.normalizer.normalize(raw, seq);

        let snapshots: Vec<(String, Vec<SeriesPoint>)> = {
            let mut series = self.series.lock();
            let charted: Vec<_> = readings
                .iter()
                .filter(|r| r.chartable)
                .map(|r| (series_key(&self.panel, &r.metric), r.value.as_f64()))
                .collect();
            for (key, value) in &charted {
                if let Some(value) = *value {
                    series.push(key, SeriesPoint { seq, value });
                }
            }
            charted
                .into_iter()
                .filter_map(|(key, _)| series.snapshot(&key).map(|s| (key, s)))
                .collect()
        };

        self.sink.render(&self.panel, &readings);
        for (metric, snapshot) in &snapshots {
            self.sink.render_series(metric, snapshot);
        }

        ctl.last_dispatched = Some(seq);
        drop(ctl);

        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        debug!("[{}] cycle {} dispatched {} readings", self.panel, seq, readings.len());
        self.record(|r| CycleEvent::Dispatched {
            panel: self.panel.clone(),
            seq,
            ts_ns: r.now_ns(),
            readings: readings.len(),
        });
        Some(readings)
    }
}

/// Timer task body. `immediate` makes the first cycle fire at once instead of one period later.
async fn run_timer(ctx: Arc<CycleContext>, endpoint: String, period: Duration, generation: u64, immediate: bool) {
    let first = if immediate { Instant::now() } else { Instant::now() + period };
    let mut ticker = time::interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(seq) = ctx.begin_cycle(generation) else {
            break;
        };
        let result = ctx.transport.fetch_json(&endpoint).await;
        ctx.finish_cycle(generation, seq, &result);
    }

    debug!("[{}] timer generation {} exited", ctx.panel, generation);
}

/// Poller for one dashboard panel.
pub struct PollLoop {
    ctx: Arc<CycleContext>,
    config: Option<PollConfig>,
    task: Option<JoinHandle<()>>,
}

impl PollLoop {
    /// Creates the loop and registers a series buffer, keyed under `panel`, for every chartable
    /// metric of its families. Cycle events go to `recorder` when one is given.
    pub fn new(
        panel: &str,
        transport: Arc<dyn TransportClient>,
        normalizer: Arc<SensorNormalizer>,
        series: SharedSeries,
        sink: Arc<dyn DisplaySink>,
        recorder: Option<CycleRecorder>,
    ) -> Self {
        series.lock().register(
            normalizer
                .chartable_metrics()
                .iter()
                .map(|metric| series_key(panel, metric)),
        );
        Self {
            ctx: Arc::new(CycleContext {
                panel: panel.to_string(),
                transport,
                normalizer,
                series,
                sink,
                recorder,
                control: Mutex::new(LoopControl::default()),
                stats: PollStats::default(),
            }),
            config: None,
            task: None,
        }
    }

    pub fn panel(&self) -> &str {
        &self.ctx.panel
    }

    pub fn config(&self) -> Option<&PollConfig> {
        self.config.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stats(&self) -> PollStatsSnapshot {
        let s = &self.ctx.stats;
        PollStatsSnapshot {
            started: s.started.load(Ordering::Relaxed),
            dispatched: s.dispatched.load(Ordering::Relaxed),
            failed: s.failed.load(Ordering::Relaxed),
            discarded: s.discarded.load(Ordering::Relaxed),
        }
    }

    /// Starts polling with one immediate fetch. Replaces any running timer.
    pub fn start(&mut self, config: PollConfig) -> Result<(), PollError> {
        let handle = Handle::try_current().map_err(|_| PollError::NoRuntime)?;
        info!(
            "[{}] polling {} every {} ms",
            self.ctx.panel,
            config.endpoint(),
            config.interval_ms()
        );
        self.arm(&handle, config, true);
        Ok(())
    }

    /// Swaps the timer for one at `new_interval_ms`. Buffers and sequence numbers carry over;
    /// the first cycle of the new timer fires one new interval from now.
    pub fn reconfigure(&mut self, new_interval_ms: u64) -> Result<(), PollError> {
        let interval = validate_interval(new_interval_ms)?;
        let handle = Handle::try_current().map_err(|_| PollError::NoRuntime)?;
        let mut config = self
            .config
            .clone()
            .ok_or_else(|| PollError::NotStarted(self.ctx.panel.clone()))?;
        config.interval = interval;
        info!("[{}] cadence changed to {} ms", self.ctx.panel, new_interval_ms);
        self.arm(&handle, config, false);
        Ok(())
    }

    /// Cancels the timer. No dispatch from it happens after this returns.
    pub fn stop(&mut self) {
        let was_running = self.task.is_some();
        self.supersede();
        if was_running {
            info!("[{}] polling stopped", self.ctx.panel);
        }
    }

    /// Runs a single cycle outside the timer (used by `once` and manual refresh).
    pub async fn poll_once(&self) -> Result<Vec<SensorReading>, CycleError> {
        let endpoint = self
            .config
            .as_ref()
            .map(|c| c.endpoint.clone())
            .ok_or_else(|| PollError::NotStarted(self.ctx.panel.clone()))?;
        let generation = self.ctx.control.lock().generation;
        let Some(seq) = self.ctx.begin_cycle(generation) else {
            return Ok(Vec::new());
        };
        let raw = self.ctx.transport.fetch_json(&endpoint).await;
        match raw {
            Ok(raw) => Ok(self.ctx.dispatch(generation, seq, &raw).unwrap_or_default()),
            Err(e) => {
                self.ctx.fail(seq, &e);
                Err(e.into())
            }
        }
    }

    /// Sets the endpoint without arming a timer (for `poll_once`).
    pub fn configure(&mut self, config: PollConfig) {
        self.config = Some(config);
    }

    fn arm(&mut self, handle: &Handle, config: PollConfig, immediate: bool) {
        let generation = self.supersede();
        let ctx = self.ctx.clone();
        let endpoint = config.endpoint.clone();
        let period = config.interval;
        self.task = Some(handle.spawn(run_timer(ctx, endpoint, period, generation, immediate)));
        self.config = Some(config);
    }

    /// Invalidates the current timer and returns the new generation.
    fn supersede(&mut self) -> u64 {
        let generation = {
            let mut ctl = self.ctx.control.lock();
            ctl.generation += 1;
            ctl.generation
        };
        if let Some(task) = self.task.take() {
            task.abort();
        }
        generation
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        self.supersede();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensing::family::SensorFamily;
    use crate::sensing::reading::ReadingValue;
    use crate::utils::series::SeriesStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::num::NonZeroUsize;

    /// Replays scripted responses; optional per-call latency.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<Value, FetchError>>>,
        delays: Mutex<VecDeque<Duration>>,
        calls: AtomicU64,
        in_flight: AtomicU64,
        max_in_flight: AtomicU64,
    }

    impl ScriptedTransport {
        fn with_responses(responses: Vec<Result<Value, FetchError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Default::default()
            }
        }

        fn with_delays(self, delays: Vec<Duration>) -> Self {
            *self.delays.lock() = delays.into();
            self
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TransportClient for ScriptedTransport {
        async fn fetch_json(&self, _endpoint: &str) -> Result<Value, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let response = self
                .responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({"cpu_temp": 40 + n, "cpu_freq": 1500})));
            let delay = self.delays.lock().pop_front();
            if let Some(d) = delay {
                time::sleep(d).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            response
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        renders: Mutex<Vec<Vec<SensorReading>>>,
        series_calls: AtomicU64,
    }

    impl RecordingSink {
        fn render_count(&self) -> usize {
            self.renders.lock().len()
        }

        fn rendered_seqs(&self) -> Vec<u64> {
            self.renders.lock().iter().map(|r| r[0].sampled_at).collect()
        }
    }

    impl DisplaySink for RecordingSink {
        fn render(&self, _panel: &str, readings: &[SensorReading]) {
            self.renders.lock().push(readings.to_vec());
        }

        fn render_series(&self, _metric: &str, _snapshot: &[SeriesPoint]) {
            self.series_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn telemetry_loop(transport: Arc<ScriptedTransport>, sink: Arc<RecordingSink>) -> (PollLoop, SharedSeries) {
        let series = SeriesStore::shared(NonZeroUsize::new(60).unwrap());
        let normalizer = Arc::new(SensorNormalizer::new().root(SensorFamily::HostTelemetry));
        let lp = PollLoop::new("telemetry", transport, normalizer, series.clone(), sink, None);
        (lp, series)
    }

    const CPU_KEY: &str = "telemetry/telemetry.cpu_temp";

    fn cpu_len(series: &SharedSeries) -> usize {
        series.lock().snapshot(CPU_KEY).map(|s| s.len()).unwrap_or(0)
    }

    async fn advance_ms(ms: u64) {
        time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_fetches_immediately_then_on_interval() {
        let transport = Arc::new(ScriptedTransport::default());
        let sink = Arc::new(RecordingSink::default());
        let (mut lp, series) = telemetry_loop(transport.clone(), sink.clone());

        lp.start(PollConfig::new(1000, "/api/telemetry").unwrap()).unwrap();
        advance_ms(10).await;
        assert_eq!(transport.calls(), 1);
        assert_eq!(sink.render_count(), 1);
        assert_eq!(cpu_len(&series), 1);

        advance_ms(1000).await;
        assert_eq!(transport.calls(), 2);
        assert_eq!(sink.rendered_seqs(), vec![0, 1]);
        assert!(lp.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_skips_cycle_and_polling_continues() {
        let transport = Arc::new(ScriptedTransport::with_responses(vec![
            Ok(json!({"cpu_temp": 41.5})),
            Err(FetchError::Transport("connection refused".into())),
            Ok(json!({"cpu_temp": 42.0})),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let (mut lp, series) = telemetry_loop(transport.clone(), sink.clone());

        lp.start(PollConfig::new(1000, "/api/telemetry").unwrap()).unwrap();
        advance_ms(10).await;
        assert_eq!(cpu_len(&series), 1);

        advance_ms(1000).await;
        assert_eq!(transport.calls(), 2);
        assert_eq!(cpu_len(&series), 1);
        assert_eq!(sink.render_count(), 1);

        advance_ms(1000).await;
        assert_eq!(transport.calls(), 3);
        assert_eq!(cpu_len(&series), 2);
        assert_eq!(lp.stats().failed, 1);
        assert_eq!(lp.stats().dispatched, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reconfigure_replaces_timer_and_keeps_history() {
        let transport = Arc::new(ScriptedTransport::default());
        let sink = Arc::new(RecordingSink::default());
        let (mut lp, series) = telemetry_loop(transport.clone(), sink.clone());

        lp.start(PollConfig::new(1000, "/api/telemetry").unwrap()).unwrap();
        advance_ms(10).await;
        lp.reconfigure(300).unwrap();
        assert_eq!(cpu_len(&series), 1);

        // new ticks at 310, 610, 910; the old 1000 ms tick must not fire
        advance_ms(995).await;
        assert_eq!(transport.calls(), 4);
        assert_eq!(cpu_len(&series), 4);
        assert_eq!(lp.config().map(PollConfig::interval_ms), Some(300));
        assert_eq!(sink.rendered_seqs(), vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_reconfigure_leaves_exactly_one_timer() {
        let transport = Arc::new(ScriptedTransport::default());
        let sink = Arc::new(RecordingSink::default());
        let (mut lp, _series) = telemetry_loop(transport.clone(), sink);

        lp.start(PollConfig::new(1000, "/api/telemetry").unwrap()).unwrap();
        advance_ms(10).await;
        for _ in 0..5 {
            lp.reconfigure(200).unwrap();
        }

        advance_ms(1005).await;
        // one immediate fetch, then one per 200 ms
        assert_eq!(transport.calls(), 6);
        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_fetch_from_superseded_timer_is_never_dispatched() {
        let transport = Arc::new(
            ScriptedTransport::with_responses(vec![Ok(json!({"cpu_temp": 99}))])
                .with_delays(vec![Duration::from_millis(500)]),
        );
        let sink = Arc::new(RecordingSink::default());
        let (mut lp, series) = telemetry_loop(transport.clone(), sink.clone());

        lp.start(PollConfig::new(1000, "/api/telemetry").unwrap()).unwrap();
        advance_ms(100).await;
        lp.reconfigure(300).unwrap();

        advance_ms(950).await;
        assert_eq!(transport.calls(), 4);
        assert_eq!(lp.stats().dispatched, 3);
        assert!(sink.rendered_seqs().iter().all(|seq| *seq >= 1));
        let values: Vec<f64> = series
            .lock()
            .snapshot(CPU_KEY)
            .unwrap()
            .iter()
            .map(|p| p.value)
            .collect();
        assert!(!values.contains(&99.0));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_and_is_idempotent() {
        let transport = Arc::new(
            ScriptedTransport::default().with_delays(vec![Duration::from_millis(500)]),
        );
        let sink = Arc::new(RecordingSink::default());
        let (mut lp, series) = telemetry_loop(transport.clone(), sink.clone());

        lp.start(PollConfig::new(250, "/api/telemetry").unwrap()).unwrap();
        advance_ms(100).await;
        lp.stop();
        lp.stop();

        advance_ms(2000).await;
        assert_eq!(transport.calls(), 1);
        assert_eq!(sink.render_count(), 0);
        assert_eq!(cpu_len(&series), 0);
        assert!(!lp.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetches_never_overlap() {
        let transport = Arc::new(
            ScriptedTransport::default().with_delays(vec![Duration::from_millis(250); 16]),
        );
        let sink = Arc::new(RecordingSink::default());
        let (mut lp, _series) = telemetry_loop(transport.clone(), sink.clone());

        lp.start(PollConfig::new(100, "/api/telemetry").unwrap()).unwrap();
        advance_ms(1200).await;
        lp.stop();

        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
        let seqs = sink.rendered_seqs();
        assert!(seqs.len() >= 4);
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn zero_interval_fails_fast() {
        assert_eq!(PollConfig::new(0, "/api/status"), Err(PollError::InvalidInterval(0)));

        let transport = Arc::new(ScriptedTransport::default());
        let sink = Arc::new(RecordingSink::default());
        let (mut lp, _series) = telemetry_loop(transport, sink);
        assert_eq!(lp.reconfigure(0), Err(PollError::InvalidInterval(0)));
        assert_eq!(lp.reconfigure(500), Err(PollError::NotStarted("telemetry".into())));
    }

    #[test]
    fn start_outside_runtime_is_rejected() {
        let transport = Arc::new(ScriptedTransport::default());
        let sink = Arc::new(RecordingSink::default());
        let (mut lp, _series) = telemetry_loop(transport, sink);
        let config = PollConfig::new(1000, "/api/telemetry").unwrap();
        assert_eq!(lp.start(config), Err(PollError::NoRuntime));
    }

    #[tokio::test]
    async fn poll_once_dispatches_a_single_cycle() {
        let transport = Arc::new(ScriptedTransport::with_responses(vec![Ok(json!({"cpu_temp": 0, "mem_used": 512}))]));
        let sink = Arc::new(RecordingSink::default());
        let (mut lp, series) = telemetry_loop(transport, sink.clone());
        lp.configure(PollConfig::new(1000, "/api/telemetry").unwrap());

        let readings = lp.poll_once().await.unwrap();
        let cpu = readings.iter().find(|r| r.metric == "telemetry.cpu_temp").unwrap();
        assert_eq!(cpu.value, ReadingValue::Number(0.into()));
        assert_eq!(cpu_len(&series), 1);
        assert_eq!(sink.render_count(), 1);
        assert!(sink.series_calls.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn poll_once_without_endpoint_is_not_started() {
        let transport = Arc::new(ScriptedTransport::default());
        let sink = Arc::new(RecordingSink::default());
        let (lp, series) = telemetry_loop(transport.clone(), sink.clone());

        let err = lp.poll_once().await.unwrap_err();
        assert!(matches!(err, CycleError::Poll(PollError::NotStarted(ref p)) if p == "telemetry"));
        assert_eq!(transport.calls(), 0);
        assert_eq!(lp.stats().started, 0);
        assert_eq!(cpu_len(&series), 0);
    }

    #[tokio::test]
    async fn poll_once_reports_fetch_failure() {
        let transport = Arc::new(ScriptedTransport::with_responses(vec![Err(FetchError::Status(503))]));
        let sink = Arc::new(RecordingSink::default());
        let (mut lp, _series) = telemetry_loop(transport, sink.clone());
        lp.configure(PollConfig::new(1000, "/api/telemetry").unwrap());

        let err = lp.poll_once().await.unwrap_err();
        assert!(matches!(err, CycleError::Fetch(FetchError::Status(503))));
        assert_eq!(lp.stats().failed, 1);
        assert_eq!(sink.render_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recorder_given_at_construction_sees_every_cycle() {
        let transport = Arc::new(ScriptedTransport::with_responses(vec![
            Ok(json!({"cpu_temp": 41})),
            Err(FetchError::Transport("connection reset".into())),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let series = SeriesStore::shared(NonZeroUsize::new(60).unwrap());
        let normalizer = Arc::new(SensorNormalizer::new().root(SensorFamily::HostTelemetry));
        let recorder = CycleRecorder::new();
        let mut lp = PollLoop::new("telemetry", transport, normalizer, series, sink, Some(recorder.clone()));

        lp.start(PollConfig::new(500, "/api/telemetry").unwrap()).unwrap();
        advance_ms(510).await;
        lp.stop();

        let events = recorder.drain();
        let started = events.iter().filter(|e| matches!(e, CycleEvent::Started { .. })).count();
        assert_eq!(started, 2);
        assert!(events.iter().any(|e| matches!(e, CycleEvent::Dispatched { seq: 0, readings, .. } if *readings > 0)));
        assert!(events.iter().any(|e| matches!(e, CycleEvent::Failed { seq: 1, .. })));
    }

    #[test]
    fn series_buffers_are_keyed_by_panel() {
        let transport = Arc::new(ScriptedTransport::default());
        let sink = Arc::new(RecordingSink::default());
        let (_lp, series) = telemetry_loop(transport, sink);

        let store = series.lock();
        assert!(store.get(CPU_KEY).is_some());
        assert!(store.get("telemetry.cpu_temp").is_none());
        assert!(store.metrics().all(|m| m.starts_with("telemetry/")));
    }

    #[tokio::test]
    async fn older_sequence_is_discarded() {
        let transport = Arc::new(ScriptedTransport::default());
        let sink = Arc::new(RecordingSink::default());
        let (lp, _series) = telemetry_loop(transport, sink.clone());

        let generation = lp.ctx.control.lock().generation;
        assert!(lp.ctx.dispatch(generation, 5, &json!({"cpu_temp": 1})).is_some());
        assert!(lp.ctx.dispatch(generation, 4, &json!({"cpu_temp": 2})).is_none());
        assert_eq!(lp.stats().discarded, 1);
        assert_eq!(sink.rendered_seqs(), vec![5]);
    }
}
