/// main.rs – Entry point for the trading-bot monitoring dashboard.
///
/// Wires the backend gateway, the fetch aggregator and the refresh scheduler
/// together, then either drives the live ratatui dashboard or, with
/// `--no-dashboard`, logs a periodic summary to stdout.
mod aggregator;
mod config;
mod dashboard;
mod gateway;
mod models;
mod projection;
mod scheduler;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::EventStream;
use futures_util::StreamExt;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use aggregator::Aggregator;
use config::Settings;
use dashboard::{Action, ViewState};
use gateway::{Gateway, HttpTransport};
use scheduler::{read_state, Scheduler, SharedState};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tradebot-dashboard",
    about = "Live monitoring dashboard for the ETH/BNB trading bot backend",
    version
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "dashboard.yaml")]
    config: String,

    /// Hostname the dashboard runs for; `localhost` selects the local backend.
    #[arg(long)]
    host: Option<String>,

    /// Explicit backend base URL, bypassing host resolution.
    #[arg(long)]
    base_url: Option<String>,

    /// Disable the interactive dashboard and print logs to stdout instead.
    #[arg(long, default_value_t = false)]
    no_dashboard: bool,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load settings (YAML + env override), then CLI flags on top
    let mut settings = Settings::load(&cli.config)?;
    if cli.host.is_some() {
        settings.api.host = cli.host.clone();
    }
    if cli.base_url.is_some() {
        settings.api.base_url = cli.base_url.clone();
    }
    settings.validate()?;

    init_logging(&settings, cli.no_dashboard)?;

    let base_url = settings.base_url();
    info!("Backend: {base_url}");

    let transport = HttpTransport::new(settings.request_timeout())?;
    let gateway = Gateway::new(base_url, transport);
    let aggregator = Arc::new(Aggregator::new(gateway, settings.refresh.trades_window));

    let mut scheduler = Scheduler::new(
        aggregator,
        settings.poll_interval(),
        settings.refresh.default_timeframe,
    );
    scheduler.start()?;

    let outcome = if cli.no_dashboard {
        run_headless(&scheduler, &settings).await
    } else {
        run_dashboard(&scheduler, &settings).await
    };

    // -----------------------------------------------------------------------
    // Graceful shutdown
    // -----------------------------------------------------------------------
    scheduler.stop();
    scheduler.join().await;
    info!("Dashboard exited");

    outcome
}

fn init_logging(settings: &Settings, to_stdout: bool) -> Result<()> {
    // RUST_LOG wins; falls back to config
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.dashboard.log_level.to_lowercase()));

    if to_stdout {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        // The dashboard owns the terminal, so log lines go to a file.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&settings.dashboard.log_file)
            .with_context(|| format!("opening log file {}", settings.dashboard.log_file))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Interactive dashboard loop
// ---------------------------------------------------------------------------

async fn run_dashboard<T>(scheduler: &Scheduler<T>, settings: &Settings) -> Result<()>
where
    T: gateway::Transport + 'static,
{
    let state = scheduler.state();
    let mut terminal = dashboard::setup_terminal()?;
    let mut view = ViewState::default();
    let mut title: Option<String> = None;

    let mut dash_ticker = tokio::time::interval(settings.redraw_interval());
    let mut event_stream = EventStream::new();

    info!("Dashboard started.  Press 'q' to quit.");

    let result = loop {
        let snapshot = read_state(&state).clone();
        if let Err(e) = terminal.draw(|f| {
            dashboard::render(f, &snapshot, &view, &settings.dashboard.network_label)
        }) {
            break Err(anyhow::Error::from(e));
        }

        let next_title = dashboard::window_title(&snapshot);
        if next_title.is_some() && next_title != title {
            if let Some(t) = &next_title {
                if let Err(e) = dashboard::set_window_title(&mut terminal, t) {
                    warn!("Could not set terminal title: {e}");
                }
            }
            title = next_title;
        }

        tokio::select! {
            // ── Keyboard events ────────────────────────────────────────────
            Some(Ok(event)) = event_stream.next() => {
                match dashboard::handle_event(&event) {
                    Action::Quit => break Ok(()),
                    Action::Refresh => {
                        info!("Manual refresh requested");
                        scheduler.refresh();
                    }
                    Action::CycleTimeframe => {
                        let tf = scheduler.cycle_timeframe(view.selected_chart);
                        info!("{} chart timeframe set to {tf}", view.selected_chart);
                    }
                    action => view.navigate(action),
                }
            }

            // ── Redraw tick ────────────────────────────────────────────────
            _ = dash_ticker.tick() => {
                // State is updated by the scheduler; this tick just triggers a redraw.
            }
        }
    };

    dashboard::teardown_terminal(&mut terminal)?;
    result
}

// ---------------------------------------------------------------------------
// Headless loop
// ---------------------------------------------------------------------------

async fn run_headless<T>(scheduler: &Scheduler<T>, settings: &Settings) -> Result<()>
where
    T: gateway::Transport + 'static,
{
    let state = scheduler.state();
    let mut ticker = tokio::time::interval(settings.redraw_interval());
    info!("Running headless.  Press Ctrl-C to quit.");

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("waiting for Ctrl-C")?;
                info!("Ctrl-C received, shutting down");
                return Ok(());
            }
            _ = ticker.tick() => log_summary(&state),
        }
    }
}

fn log_summary(state: &SharedState) {
    let st = read_state(state);
    if st.loading {
        info!("Waiting for first refresh…");
        return;
    }
    let last_update = st
        .last_update
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "—".into());
    let charts = st
        .charts
        .iter()
        .zip(models::ChartKind::ALL)
        .map(|(slot, kind)| {
            let status = if slot.data.get().is_some() { "ok" } else { "–" };
            format!("{kind}[{}]={status}", slot.timeframe)
        })
        .collect::<Vec<_>>()
        .join(" ");
    info!(
        "{} | trades: {} | charts: {charts} | last update {last_update}",
        dashboard::window_title(&st).unwrap_or_else(|| "metrics pending".into()),
        st.recent_trades().len(),
    );
}
