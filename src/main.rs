mod catalog;
mod config;
mod conjunction;
mod error;
mod fleet;
mod ground;
mod messages;
mod propagate;
mod risk;
mod runtime;
mod screening;
mod snapshot;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{to_chrono, Config, ConfigError};
use crate::error::EngineError;
use crate::ground::GroundStation;
use crate::messages::{parse_inbound, route, InboundBatch, Outbound};
use crate::runtime::{ConjunctionWorkflow, Engine, SchedulerError, TickScheduler};

const AD_HOC_STATION: &str = "ad-hoc";

#[derive(Parser)]
#[command(name = "orbit-o-mat")]
#[command(about = "Orbital state and conjunction-risk engine")]
struct Cli {
    /// Engine configuration (YAML); defaults apply when omitted
    #[arg(long, short, global = true)]
    config: Option<String>,
    /// Element and conjunction messages (YAML or JSON); repeatable
    #[arg(long, short, global = true)]
    input: Vec<String>,
    /// Evaluate at this instant (RFC 3339) instead of now
    #[arg(long, global = true, value_parser = parse_epoch)]
    epoch: Option<DateTime<Utc>>,
    /// Ad-hoc ground station as LAT,LON, usable as station "ad-hoc"
    #[arg(long, global = true)]
    at: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    CheckConfig,
    /// Positions of the whole catalog
    Snapshot,
    /// Full state of one object
    Detail { id: String },
    /// Ground track over a horizon
    Trajectory {
        id: String,
        #[arg(long, value_parser = humantime::parse_duration)]
        horizon: Option<Duration>,
        #[arg(long, value_parser = humantime::parse_duration)]
        step: Option<Duration>,
    },
    /// Objects predicted to pass close to one object
    Risk {
        id: String,
        #[arg(long, value_parser = humantime::parse_duration)]
        horizon: Option<Duration>,
        #[arg(long)]
        threshold_km: Option<f64>,
    },
    /// Close pairs in the current snapshot
    Alerts,
    /// Congested regions and the altitude distribution
    Hotspots,
    /// Stations that can see an object
    Visibility {
        id: String,
        #[arg(long)]
        station: Option<String>,
    },
    /// Upcoming passes over a station
    Passes {
        id: String,
        #[arg(long)]
        station: Option<String>,
        #[arg(long, default_value = "24h", value_parser = humantime::parse_duration)]
        horizon: Duration,
        #[arg(long, default_value_t = 10)]
        max: usize,
    },
    /// Earth-shadow windows
    Eclipse {
        id: String,
        #[arg(long, value_parser = humantime::parse_duration)]
        horizon: Option<Duration>,
    },
    /// RF link budget to a station
    Link {
        id: String,
        #[arg(long)]
        station: Option<String>,
        #[arg(long, default_value = "x")]
        band: String,
    },
    /// Classify conjunction messages and print the workflow summary
    Workflow,
    /// Fleet health and coverage
    Health,
    /// Plan an altitude change
    Maneuver { id: String, target_km: f64 },
    /// Keep publishing snapshots until interrupted
    Run,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot read {path}: {source}")]
    Input {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Usage(String),
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Commands::CheckConfig = cli.command {
        println!(
            "Config is valid ({} stations, {} bands, {} shells)",
            config.stations.len(),
            config.links.bands.len(),
            config.fleet.shells.len()
        );
        for station in &config.stations {
            println!(
                "  {}: {:.2}, {:.2} (mask {:.0} deg)",
                station.name, station.latitude_deg, station.longitude_deg, station.min_elevation_deg
            );
        }
        return ExitCode::SUCCESS;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error starting runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(cli, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_epoch(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp {}: {}", s, e))
}

fn load_config(cli: &Cli) -> Result<Config, AppError> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(coordinates) = &cli.at {
        let station = GroundStation::from_coordinates(AD_HOC_STATION, coordinates, None, 0.0)
            .ok_or_else(|| AppError::Usage(format!("invalid --at coordinates: {}", coordinates)))?;
        config.stations.push(station);
        config.validate()?;
    }
    Ok(config)
}

fn load_inputs(paths: &[String]) -> Result<InboundBatch, AppError> {
    let mut messages = Vec::new();
    for path in paths {
        let content = std::fs::read_to_string(path).map_err(|source| AppError::Input {
            path: path.clone(),
            source,
        })?;
        let parsed = parse_inbound(&content).map_err(|source| AppError::Parse {
            path: path.clone(),
            source,
        })?;
        log::debug!("{}: {} messages", path, parsed.len());
        messages.extend(parsed);
    }
    let batch = route(messages);
    if !batch.rejected.is_empty() {
        log::warn!("{} inbound messages rejected", batch.rejected.len());
    }
    Ok(batch)
}

fn station_name(station: Option<String>, has_ad_hoc: bool) -> Result<String, AppError> {
    match station {
        Some(name) => Ok(name),
        None if has_ad_hoc => Ok(AD_HOC_STATION.to_string()),
        None => Err(AppError::Usage(
            "a --station or --at LAT,LON is required".to_string(),
        )),
    }
}

fn print<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn execute(cli: Cli, config: Config) -> Result<(), AppError> {
    let now = cli.epoch.unwrap_or_else(Utc::now);
    let has_ad_hoc = cli.at.is_some();
    let InboundBatch {
        elements,
        conjunctions,
        ..
    } = load_inputs(&cli.input)?;

    let engine = Arc::new(Engine::new(config));
    let report = engine.ingest(elements, now);
    log::info!(
        "Catalog: {} new, {} refreshed, {} rejected",
        report.created,
        report.refreshed,
        report.rejected.len()
    );

    if let Commands::Run = cli.command {
        return run(engine, conjunctions).await;
    }

    engine.tick(now);

    match cli.command {
        Commands::CheckConfig | Commands::Run => Ok(()),
        Commands::Snapshot => print(&Outbound::snapshot(&engine.snapshot())),
        Commands::Detail { id } => print(&Outbound::Detail(engine.detail(&id, now)?)),
        Commands::Trajectory { id, horizon, step } => {
            let trajectory = engine
                .trajectory(&id, now, horizon.map(to_chrono), step.map(to_chrono))
                .await?;
            print(&Outbound::Trajectory(trajectory))
        }
        Commands::Risk {
            id,
            horizon,
            threshold_km,
        } => print(
            &engine
                .object_risk(&id, now, horizon.map(to_chrono), threshold_km)
                .await?,
        ),
        Commands::Alerts => print(&Outbound::alerts(now, engine.alerts())),
        Commands::Hotspots => {
            #[derive(Serialize)]
            struct Congestion {
                hotspots: Vec<screening::Hotspot>,
                distribution: Vec<screening::AltitudeBand>,
            }
            print(&Congestion {
                hotspots: engine.hotspots(),
                distribution: engine.distribution(),
            })
        }
        Commands::Visibility { id, station } => match station {
            Some(station) => print(&engine.station_visibility(&id, &station, now).await?),
            None => print(&engine.visibility(&id, now).await?),
        },
        Commands::Passes {
            id,
            station,
            horizon,
            max,
        } => {
            let station = station_name(station, has_ad_hoc)?;
            let end = now + to_chrono(horizon);
            print(&engine.passes(&id, &station, now, end, max).await?)
        }
        Commands::Eclipse { id, horizon } => {
            print(&engine.eclipse(&id, now, horizon.map(to_chrono)).await?)
        }
        Commands::Link { id, station, band } => {
            let station = station_name(station, has_ad_hoc)?;
            print(&engine.link_budget(&id, &station, &band, now).await?)
        }
        Commands::Workflow => {
            let mut workflow = ConjunctionWorkflow::start(
                &engine.config().workflow,
                engine.config().engine.subscriber_queue,
            );
            let handle = workflow.handle();
            let ingested = handle.ingest(conjunctions).await?;
            log::info!(
                "Conjunctions: {} new, {} superseded, {} outdated, {} duplicate, {} rejected",
                ingested.created,
                ingested.superseded,
                ingested.outdated,
                ingested.duplicate,
                ingested.rejected.len()
            );
            let refreshed = handle.refresh().await?;
            workflow.stop().await?;
            print(&Outbound::Conjunction(refreshed.summary))
        }
        Commands::Health => {
            let health = engine.refresh_health(now);
            print(&Outbound::Health((*health).clone()))?;
            print(&engine.coverage())
        }
        Commands::Maneuver { id, target_km } => {
            print(&engine.maneuver(&id, target_km, now).await?)
        }
    }
}

/// Streams snapshots and workflow summaries as JSON lines until ctrl-c.
async fn run(
    engine: Arc<Engine>,
    conjunctions: Vec<conjunction::ConjunctionMessage>,
) -> Result<(), AppError> {
    let mut scheduler = TickScheduler::new(engine.clone());
    let mut workflow = ConjunctionWorkflow::start(
        &engine.config().workflow,
        engine.config().engine.subscriber_queue,
    );
    let handle = workflow.handle();
    let mut snapshots = engine.subscribe();
    let mut summaries = handle.subscribe();

    scheduler.start()?;
    if !conjunctions.is_empty() {
        handle.submit(conjunctions)?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, shutting down");
                break;
            }
            Some(snapshot) = snapshots.recv() => {
                println!("{}", serde_json::to_string(&Outbound::snapshot(&snapshot))?);
            }
            Some(summary) = summaries.recv() => {
                println!("{}", serde_json::to_string(&Outbound::Conjunction((*summary).clone()))?);
            }
        }
    }

    let stats = scheduler.stop().await?;
    let handled = workflow.stop().await?;
    log::info!(
        "Stopped after {} ticks, {} workflow commands, {} dropped updates",
        stats.ticks,
        handled,
        engine.dropped_updates()
    );
    Ok(())
}
