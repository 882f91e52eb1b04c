//! # Dashboard Telemetry Entry Point
//!
//! Polls the dashboard backend and keeps per-panel readings and chart series live.
//!
//! ## Modes
//! - **watch:** every selected panel polls on its own cadence; console log + web dashboard;
//!   cadence, start/stop and chart reset are driven from stdin or `/interval`.
//! - **once:** fetch each selected panel a single time and print the readings.
//! - **command:** send one light command (color, off, brightness, animation).
//!
//! ## Outputs
//! - Console: one log line per panel per cycle (`RUST_LOG=info`).
//! - Dashboard: `http://127.0.0.1:8080` (SVG charts, readings JSON).
//! - `--events-csv <path>`: cycle events (started/dispatched/failed/discarded) written on exit.

use std::{error::Error, num::NonZeroUsize, path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc::{self, UnboundedSender},
};

use dash_telemetry::advanced::{
    console::ConsoleSink,
    control::{ControlCommand, Controller},
    dashboard::{DashboardState, start_web_server},
    simulated::SimulatedTransport,
};
use dash_telemetry::polling::{
    commands::LightCommand,
    poll_loop::{PollConfig, PollLoop},
    sink::SinkFanout,
    transport::{HttpTransport, TransportClient},
};
use dash_telemetry::utils::{
    config::{DEFAULT_BASE_URL, DEFAULT_WEB_ADDR, DashboardConfig, Panel, PanelConfig},
    recorder::CycleRecorder,
    series::{DEFAULT_CAPACITY, SeriesStore},
};

#[derive(Parser)]
#[command(name = "dash_telemetry", version, about = "Hardware dashboard polling client")]
struct Cli {
    /// Backend base URL.
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Per-request timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 2000)]
    timeout_ms: u64,

    /// Use the built-in simulated backend instead of HTTP.
    #[arg(long, global = true)]
    demo: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll continuously until `quit` or Ctrl-C.
    Watch {
        /// Panels to poll (default: all).
        #[arg(long = "panel", value_enum)]
        panels: Vec<Panel>,
        /// Cadence override, `<panel>=<ms>` (repeatable).
        #[arg(long = "interval", value_parser = PanelConfig::parse_override)]
        intervals: Vec<PanelConfig>,
        /// Samples kept per chart.
        #[arg(long, default_value_t = DEFAULT_CAPACITY)]
        capacity: NonZeroUsize,
        /// Dashboard listen address.
        #[arg(long, default_value = DEFAULT_WEB_ADDR)]
        web: String,
        /// Do not start the web dashboard.
        #[arg(long)]
        no_web: bool,
        /// Write cycle events to this CSV file on exit.
        #[arg(long)]
        events_csv: Option<PathBuf>,
        /// Log min/mean/max per chart every cycle (debug level).
        #[arg(long)]
        series_summary: bool,
    },
    /// Fetch each panel once and print its readings.
    Once {
        #[arg(long = "panel", value_enum)]
        panels: Vec<Panel>,
        /// Print readings as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Send a light command to the backend.
    Command {
        #[command(subcommand)]
        action: LightAction,
    },
}

#[derive(Subcommand)]
enum LightAction {
    /// Fill with a color, `#rrggbb`.
    Color { hex: String },
    /// Turn the strip off.
    Off,
    /// Set brightness.
    Brightness { value: f64 },
    /// Start a named animation.
    Animation { name: String },
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let timeout = Duration::from_millis(cli.timeout_ms);
    match cli.command {
        Command::Watch {
            panels,
            intervals,
            capacity,
            web,
            no_web,
            events_csv,
            series_summary,
        } => {
            let config = DashboardConfig {
                base_url: cli.base_url,
                request_timeout: timeout,
                series_capacity: capacity,
                web_addr: (!no_web).then_some(web),
                events_csv,
                demo: cli.demo,
                ..DashboardConfig::default()
            }
            .select(&panels, &intervals);
            run_watch(config, series_summary).await
        }
        Command::Once { panels, json } => {
            let config = DashboardConfig {
                base_url: cli.base_url,
                request_timeout: timeout,
                demo: cli.demo,
                ..DashboardConfig::default()
            }
            .select(&panels, &[]);
            run_once(config, json).await
        }
        Command::Command { action } => {
            let command = match action {
                LightAction::Color { hex } => LightCommand::color(&hex)?,
                LightAction::Off => LightCommand::Off,
                LightAction::Brightness { value } => LightCommand::brightness(value)?,
                LightAction::Animation { name } => LightCommand::animation(&name)?,
            };
            let transport = HttpTransport::new(&cli.base_url, timeout)?;
            let reply = command.send(&transport).await?;
            println!("{}", reply);
            Ok(())
        }
    }
}

fn make_transport(config: &DashboardConfig) -> Result<Arc<dyn TransportClient>, Box<dyn Error>> {
    if config.demo {
        info!("using simulated backend");
        Ok(Arc::new(SimulatedTransport::default()))
    } else {
        Ok(Arc::new(HttpTransport::new(&config.base_url, config.request_timeout)?))
    }
}

async fn run_watch(config: DashboardConfig, series_summary: bool) -> Result<(), Box<dyn Error>> {
    info!("=== DASHBOARD POLLING START ===");
    let transport = make_transport(&config)?;
    let series = SeriesStore::shared(config.series_capacity);
    let dashboard = Arc::new(DashboardState::new());
    let sink = Arc::new(
        SinkFanout::new()
            .with(Arc::new(ConsoleSink::new(series_summary)))
            .with(dashboard.clone()),
    );
    let recorder = config.events_csv.as_ref().map(|_| CycleRecorder::new());

    let (tx, rx) = mpsc::unbounded_channel();

    let mut controller = Controller::new(&config, transport, sink, series, recorder.clone())
        .with_dashboard(dashboard.clone());
    controller.start_all()?;

    let web = match &config.web_addr {
        Some(addr) => match start_web_server(addr, dashboard.clone(), tx.clone()) {
            Ok(server) => {
                println!("check Dashboard live at: http://{}", addr);
                Some(server)
            }
            Err(e) => {
                warn!("web dashboard disabled: {}", e);
                None
            }
        },
        None => None,
    };

    tokio::spawn(read_stdin(tx.clone()));
    tokio::spawn(quit_on_ctrl_c(tx));

    println!("commands: interval <panel> <ms> | stop <panel> | start <panel> | clear | quit");
    let _controller = controller.run(rx).await;

    if let Some(server) = web {
        server.shutdown();
    }
    if let (Some(path), Some(recorder)) = (&config.events_csv, &recorder) {
        recorder.export_csv(path)?;
    }
    info!("=== DASHBOARD POLLING FINISHED ===");
    Ok(())
}

/// Forwards operator lines to the controller; bad lines are reported and ignored.
async fn read_stdin(tx: UnboundedSender<ControlCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match line.parse::<ControlCommand>() {
                Ok(cmd) => {
                    if tx.send(cmd).is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("{}", e),
            },
            Ok(None) => {
                info!("stdin closed; control still available over HTTP and Ctrl-C");
                break;
            }
            Err(e) => {
                warn!("stdin read failed: {}", e);
                break;
            }
        }
    }
}

async fn quit_on_ctrl_c(tx: UnboundedSender<ControlCommand>) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Ctrl-C received");
        let _ = tx.send(ControlCommand::Quit);
    }
}

async fn run_once(config: DashboardConfig, json: bool) -> Result<(), Box<dyn Error>> {
    let transport = make_transport(&config)?;
    let series = SeriesStore::shared(config.series_capacity);
    let dashboard = Arc::new(DashboardState::new());
    let mut failures = 0usize;

    for pc in &config.panels {
        let mut poll_loop = PollLoop::new(
            pc.panel.name(),
            transport.clone(),
            Arc::new(pc.panel.normalizer()),
            series.clone(),
            dashboard.clone(),
            None,
        );
        poll_loop.configure(PollConfig::new(pc.interval_ms, pc.panel.endpoint())?);

        match poll_loop.poll_once().await {
            Ok(readings) if !json => {
                println!("== {} ({}) ==", pc.panel, pc.panel.endpoint());
                for r in &readings {
                    println!("  {}", r);
                }
            }
            Ok(_) => {}
            Err(e) => {
                failures += 1;
                eprintln!("{}: {}", pc.panel, e);
            }
        }
    }

    if json {
        println!("{}", dashboard.readings_json()?);
    }
    if failures == config.panels.len() && failures > 0 {
        return Err(format!("all {} panels failed", failures).into());
    }
    Ok(())
}
