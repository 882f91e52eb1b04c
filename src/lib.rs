//! # dash_telemetry
//!
//! Client-side polling and aggregation engine for a hardware-monitoring dashboard.
//!
//! ## Pipeline
//! `PollLoop` → `TransportClient::fetch_json` → `SensorNormalizer::normalize` →
//! `SeriesStore` (chartable metrics) + `DisplaySink::render` (all metrics).
//!
//! ## Layout
//! - **sensing:** readings, sensor families, payload normalization.
//! - **polling:** poll loops, transport, display sink trait, light commands.
//! - **utils:** series buffers, cycle event recorder, panel configuration.
//! - **advanced:** console and web dashboard sinks, operator control, simulated backend.

pub mod advanced;
pub mod polling;
pub mod sensing;
pub mod utils;
