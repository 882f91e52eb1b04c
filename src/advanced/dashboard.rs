//! Live dashboard: keeps last-known-good readings, renders SVG charts, serves them over HTTP.
//!
//! - **DashboardState:** a `DisplaySink`; readings per panel + series snapshots per metric (DashMap).
//! - **SVG:** grid of line charts (one per chartable metric) rendered in memory with plotters.
//! - **Web server:** tiny_http on its own thread serving the HTML page, the SVG, readings JSON,
//!   and the `/interval` control route.
//!
//! The sink is only called on successful cycles, so whatever it holds is the last good state.

use std::{
    collections::BTreeMap,
    io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread,
};

use dashmap::DashMap;
use log::{error, info, warn};
use plotters::{coord::Shift, prelude::*};
use tiny_http::{Header, Method, Response, Server};
use tokio::sync::mpsc::UnboundedSender;

use crate::advanced::control::ControlCommand;
use crate::polling::sink::DisplaySink;
use crate::sensing::reading::{SensorReading, SensorStatus};
use crate::utils::config::{Panel, parse_interval_ms};
use crate::utils::series::SeriesPoint;

const CHART_COLUMNS: usize = 3;
const CHART_WIDTH: u32 = 420;
const CHART_HEIGHT: u32 = 240;
const STATUS_BAR_HEIGHT: u32 = 60;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="2">
<title>Telemetry dashboard</title>
<style>body{font-family:sans-serif;margin:16px}img{max-width:100%}</style>
</head>
<body>
<h1>Telemetry dashboard</h1>
<p><a href="/readings.json">readings.json</a> · change cadence with <code>/interval?panel=telemetry&amp;ms=500</code></p>
<img src="/dashboard.svg" alt="live charts">
</body>
</html>
"#;

type DrawResult = Result<(), DrawingAreaErrorKind<io::Error>>;

#[derive(Default)]
pub struct DashboardState {
    readings: DashMap<String, Vec<SensorReading>>,
    series: DashMap<String, Vec<SeriesPoint>>,
    cycles: AtomicU64,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful panel cycles rendered so far.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Last rendered readings of one panel.
    pub fn panel_readings(&self, panel: &str) -> Option<Vec<SensorReading>> {
        self.readings.get(panel).map(|r| r.value().clone())
    }

    pub fn series(&self, metric: &str) -> Option<Vec<SeriesPoint>> {
        self.series.get(metric).map(|s| s.value().clone())
    }

    /// Full reinitialization of the chart view.
    pub fn clear_series(&self) {
        self.series.clear();
    }

    /// Readings grouped by panel, panels in name order.
    pub fn readings_json(&self) -> Result<String, serde_json::Error> {
        let ordered: BTreeMap<String, Vec<SensorReading>> = self
            .readings
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        serde_json::to_string(&ordered)
    }

    fn error_count(&self) -> usize {
        self.readings
            .iter()
            .map(|e| e.value().iter().filter(|r| r.status == SensorStatus::Error).count())
            .sum()
    }

    /// Renders every series into one SVG document.
    pub fn render_svg(&self) -> Result<String, DrawingAreaErrorKind<io::Error>> {
        let charts: BTreeMap<String, Vec<SeriesPoint>> = self
            .series
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let rows = charts.len().div_ceil(CHART_COLUMNS).max(1);
        let width = CHART_WIDTH * CHART_COLUMNS as u32;
        let height = CHART_HEIGHT * rows as u32 + STATUS_BAR_HEIGHT;

        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
            root.fill(&WHITE)?;

            let (chart_area, status_area) = root.split_vertically((height - STATUS_BAR_HEIGHT) as i32);
            let areas = chart_area.split_evenly((rows, CHART_COLUMNS));
            for (area, (metric, points)) in areas.iter().zip(charts.iter()) {
                plot_series(area, metric, points)?;
            }

            let status_text = format!(
                "Cycles: {} | Series: {} | Readings in error: {}",
                self.cycles(),
                charts.len(),
                self.error_count()
            );
            let font = ("sans-serif", 18).into_font().color(&BLACK);
            status_area.draw(&Text::new(status_text, (20, 20), font))?;
            root.present()?;
        }
        Ok(svg)
    }
}

impl DisplaySink for DashboardState {
    fn render(&self, panel: &str, readings: &[SensorReading]) {
        self.readings.insert(panel.to_string(), readings.to_vec());
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    fn render_series(&self, metric: &str, snapshot: &[SeriesPoint]) {
        self.series.insert(metric.to_string(), snapshot.to_vec());
    }
}

/// Line chart of one series (X: sequence number, Y: value).
fn plot_series(area: &DrawingArea<SVGBackend, Shift>, title: &str, points: &[SeriesPoint]) -> DrawResult {
    let (min_y, max_y) = if points.is_empty() {
        (0.0, 1.0)
    } else {
        let min = points.iter().map(|p| p.value).fold(f64::INFINITY, f64::min);
        let max = points.iter().map(|p| p.value).fold(f64::NEG_INFINITY, f64::max);
        (min, max.max(min + 1e-6))
    };
    let first = points.first().map_or(0, |p| p.seq);
    let last = points.last().map_or(1, |p| p.seq).max(first + 1);

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 16))
        .margin(10)
        .x_label_area_size(20)
        .y_label_area_size(50)
        .build_cartesian_2d(first..last, min_y..max_y)?;
    chart.configure_mesh().disable_mesh().draw()?;
    chart.draw_series(LineSeries::new(points.iter().map(|p| (p.seq, p.value)), &BLUE))?;
    Ok(())
}

/// Response parts for one request.
#[derive(Debug, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    fn new(status: u16, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, "text/plain; charset=utf-8", body)
    }
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// Routes one GET request.
pub fn route(url: &str, state: &DashboardState, control: &UnboundedSender<ControlCommand>) -> Reply {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    match path {
        "/" => Reply::new(200, "text/html; charset=utf-8", INDEX_HTML),
        "/dashboard.svg" => match state.render_svg() {
            Ok(svg) => Reply::new(200, "image/svg+xml", svg),
            Err(e) => {
                error!("dashboard render failed: {}", e);
                Reply::text(500, "render failed")
            }
        },
        "/readings.json" => match state.readings_json() {
            Ok(json) => Reply::new(200, "application/json", json),
            Err(e) => Reply::text(500, e.to_string()),
        },
        "/interval" => {
            let panel = query_param(query, "panel").map(str::parse::<Panel>);
            let ms = query_param(query, "ms").map(parse_interval_ms);
            match (panel, ms) {
                (Some(Ok(panel)), Some(Ok(ms))) => match control.send(ControlCommand::SetInterval { panel, ms }) {
                    Ok(()) => Reply::text(202, format!("{} -> {} ms", panel, ms)),
                    Err(_) => Reply::text(503, "controller is not running"),
                },
                (Some(Err(e)), _) | (_, Some(Err(e))) => Reply::text(400, e.to_string()),
                _ => Reply::text(400, "usage: /interval?panel=<name>&ms=<n>"),
            }
        }
        _ => Reply::text(404, "not found"),
    }
}

/// Handle to the running web thread.
pub struct WebServer {
    server: Arc<Server>,
    handle: Option<thread::JoinHandle<()>>,
}

impl WebServer {
    pub fn shutdown(mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        info!("web server stopped");
    }
}

/// Binds `addr` and serves the dashboard from a dedicated thread.
pub fn start_web_server(
    addr: &str,
    state: Arc<DashboardState>,
    control: UnboundedSender<ControlCommand>,
) -> io::Result<WebServer> {
    let server = Arc::new(Server::http(addr).map_err(|e| io::Error::other(e.to_string()))?);
    info!("Dashboard available at http://{}", addr);

    let srv = server.clone();
    let handle = thread::spawn(move || {
        for request in srv.incoming_requests() {
            let reply = if *request.method() == Method::Get {
                route(request.url(), &state, &control)
            } else {
                Reply::text(405, "method not allowed")
            };

            let mut response = Response::from_string(reply.body).with_status_code(reply.status);
            if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], reply.content_type.as_bytes()) {
                response = response.with_header(header);
            }
            if let Err(e) = request.respond(response) {
                warn!("web response failed: {}", e);
            }
        }
        info!("web server exiting accept loop");
    });

    Ok(WebServer {
        server,
        handle: Some(handle),
    })
}
