//! sd - maternal SOS dispatch
//!
//! CLI entry point for inspecting the provider registry and running
//! simulated emergencies through the dispatch coordinator.

use std::collections::HashSet;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use sosdispatch::cli::{Cli, Command, OutputFormat};
use sosdispatch::config::Config;
use sosdispatch::{
    Coordinate, Coordinator, CoordinatorHandle, DispatchState, ProviderRegistry, SessionEvent, SessionId, distance_km,
    spawn_ticker,
};

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

    debug!(level, "Logging initialized");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Providers { near, format } => cmd_providers(&config, near, format),
        Command::Nearest {
            latitude,
            longitude,
            format,
        } => cmd_nearest(&config, latitude, longitude, format),
        Command::Simulate {
            latitude,
            longitude,
            reject,
            silent,
            delay,
            window,
        } => {
            let accept = !reject && config.simulation.accept;
            let delay = delay.unwrap_or(config.simulation.response_delay_secs);
            cmd_simulate(&config, latitude, longitude, accept, silent, delay, window).await
        }
    }
}

fn parse_location(latitude: f64, longitude: f64) -> Result<Coordinate> {
    Coordinate::new(latitude, longitude).context("Invalid requester location")
}

fn cmd_providers(config: &Config, near: Option<Vec<f64>>, format: OutputFormat) -> Result<()> {
    debug!(?near, %format, "cmd_providers: called");
    let origin = match near.as_deref() {
        Some([latitude, longitude]) => Some(parse_location(*latitude, *longitude)?),
        Some(other) => return Err(eyre!("--near takes LAT LON, got {} values", other.len())),
        None => None,
    };

    let registry = config.registry()?;
    let snapshot = registry.list();

    let mut rows = Vec::with_capacity(snapshot.len());
    for provider in &snapshot {
        let distance = match &origin {
            Some(origin) => Some(distance_km(origin, &provider.location)?),
            None => None,
        };
        rows.push((provider, distance));
    }

    match format {
        OutputFormat::Json => {
            let json: Vec<_> = rows
                .iter()
                .map(|(provider, distance)| {
                    serde_json::json!({
                        "provider": provider,
                        "distance-km": distance,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No providers registered");
            }
            for (provider, distance) in rows {
                let status = if provider.available {
                    "available".green()
                } else {
                    "unavailable".red()
                };
                let distance = distance.map(|d| format!(" {:.2} km", d)).unwrap_or_default();
                println!(
                    "{} {} {} {}{}",
                    provider.id.to_string().yellow(),
                    provider.name,
                    provider.location.to_string().dimmed(),
                    status,
                    distance.cyan()
                );
            }
        }
    }

    Ok(())
}

fn cmd_nearest(config: &Config, latitude: f64, longitude: f64, format: OutputFormat) -> Result<()> {
    debug!(latitude, longitude, %format, "cmd_nearest: called");
    let requester = parse_location(latitude, longitude)?;
    let registry = config.registry()?;
    let found = config
        .coordinator
        .match_engine()
        .find_nearest(&requester, &registry.list())?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&found)?),
        OutputFormat::Text => match found {
            Some(m) => {
                println!(
                    "{} Nearest provider: {} ({}) {:.2} km",
                    "✓".green(),
                    m.provider.name,
                    m.provider.id.to_string().yellow(),
                    m.distance_km
                );
                for (key, value) in &m.provider.metadata {
                    println!("  {}: {}", key, value);
                }
            }
            None => println!("{} No provider currently available", "✗".red()),
        },
    }

    Ok(())
}

async fn cmd_simulate(
    config: &Config,
    latitude: f64,
    longitude: f64,
    accept: bool,
    silent: bool,
    delay_secs: u64,
    window: Option<u64>,
) -> Result<()> {
    debug!(latitude, longitude, accept, silent, delay_secs, ?window, "cmd_simulate: called");
    let requester = parse_location(latitude, longitude)?;

    let mut coord_config = config.coordinator.clone();
    if let Some(window) = window {
        coord_config.response_window_secs = window;
    }
    let tick_interval = coord_config.tick_interval();

    let registry = config.registry()?;
    let (handle, task) = Coordinator::new(coord_config, registry).spawn();
    let ticker = spawn_ticker(handle.clone(), tick_interval);
    let mut events = handle.subscribe();

    let root = handle
        .start_emergency(Some(requester))
        .await
        .context("Failed to start emergency")?;
    info!(session_id = %root, "Emergency started");
    println!("{} SOS sent from {} as {}", "!".red().bold(), requester, root.to_string().cyan());

    let mut answered: HashSet<SessionId> = HashSet::new();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event subscriber lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        print_event(&event);

        if event.to == DispatchState::Notified && !silent && answered.insert(event.session_id.clone()) {
            spawn_responder(handle.clone(), event.session_id.clone(), accept, delay_secs);
        }

        let resolved = event.to.is_terminal() || event.to == DispatchState::Idle;
        if resolved && handle.list_sessions(true).await?.is_empty() {
            break;
        }
    }

    print_outcome(&handle).await?;

    handle.shutdown().await?;
    task.await.context("Coordinator task failed")?;
    ticker.abort();
    Ok(())
}

/// Answer a notified session after a delay, as a provider would
fn spawn_responder(handle: CoordinatorHandle, session_id: SessionId, accept: bool, delay_secs: u64) {
    debug!(%session_id, accept, delay_secs, "spawn_responder: called");
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        if let Err(e) = handle.record_provider_response(&session_id, accept).await {
            warn!(%session_id, error = %e, "Simulated response not recorded");
        }
    });
}

fn print_event(event: &SessionEvent) {
    let provider = event
        .provider_id
        .as_ref()
        .map(|id| format!(" [{}]", id))
        .unwrap_or_default();
    println!(
        "{} {} {} -> {} ({}){}",
        event.at.format("%H:%M:%S").to_string().dimmed(),
        event.session_id.to_string().cyan(),
        event.from,
        event.to,
        event.event,
        provider.yellow()
    );
}

async fn print_outcome(handle: &CoordinatorHandle) -> Result<()> {
    for session in handle.list_sessions(false).await? {
        let who = session
            .matched_provider()
            .map(|p| format!("{} ({})", p.name, p.id))
            .unwrap_or_default();
        let line = match session.state() {
            DispatchState::Accepted => format!("{} Accepted by {}", "✓".green(), who),
            DispatchState::Rejected => format!("{} Rejected by {}", "✗".red(), who),
            DispatchState::TimedOut => format!("{} No response from {}", "✗".yellow(), who),
            DispatchState::Cancelled => format!("{} Cancelled", "✗".yellow()),
            DispatchState::Idle => format!("{} No provider currently available", "✗".red()),
            other => format!("{} Still {}", "?".dimmed(), other),
        };
        println!("{}: {}", session.id(), line);
    }

    let metrics = handle.metrics().await?;
    debug!(?metrics, "print_outcome: metrics");
    let summary = format!(
        "started {}, matched {}, accepted {}, rejected {}, timed out {}, cancelled {}",
        metrics.sessions_started,
        metrics.matched,
        metrics.accepted,
        metrics.rejected,
        metrics.timed_out,
        metrics.cancelled
    );
    println!("{}", summary.dimmed());
    Ok(())
}
