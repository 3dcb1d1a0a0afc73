//! Mount command-line tool
//!
//! Usage:
//!   mountctl position --body both --at 2024-04-08T18:18:00Z
//!   mountctl riseset --body moon --date 2024-04-23 --lat 51.4779 --lon 0
//!   mountctl run --track sun --confirm-safety --seconds 30

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use celestial_mechanics::{Body, CelestialCalculator};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use mount_cli::{format_position, format_riseset, parse_date, parse_instant, parse_target};
use mount_control::events::{FanoutSink, MemorySink, TracingSink};
use mount_control::{Command, Mount, MountConfig, Target};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "mountctl",
    about = "Sun/Moon positions and simulated alt/az mount runs"
)]
struct Args {
    /// Mount config JSON (defaults to $MOUNT_CONFIG, then built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Observer latitude in degrees, north positive
    #[arg(long, global = true, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Observer longitude in degrees, east positive
    #[arg(long, global = true, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Topocentric altitude/azimuth of the Sun and/or Moon
    Position {
        #[arg(short, long, value_enum, default_value_t = BodyArg::Both)]
        body: BodyArg,

        /// Instant in RFC 3339 (default: now)
        #[arg(long, value_parser = parse_instant)]
        at: Option<DateTime<Utc>>,

        #[arg(long)]
        json: bool,
    },
    /// Rise and set times for a UTC date
    Riseset {
        #[arg(short, long, value_enum, default_value_t = BodyArg::Both)]
        body: BodyArg,

        /// YYYY-MM-DD (default: today)
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,

        #[arg(long)]
        json: bool,
    },
    /// Drive a simulated mount and print its pointing state once a second
    Run {
        /// Slew to sun, moon or ALT,AZ
        #[arg(long, value_parser = parse_target, conflicts_with = "track")]
        slew: Option<Target>,

        /// Track sun or moon
        #[arg(long, value_parser = parse_target)]
        track: Option<Target>,

        /// Confirm the solar filter is fitted
        #[arg(long)]
        confirm_safety: bool,

        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BodyArg {
    Sun,
    Moon,
    Both,
}

impl BodyArg {
    fn bodies(self) -> &'static [Body] {
        match self {
            BodyArg::Sun => &[Body::Sun],
            BodyArg::Moon => &[Body::Moon],
            BodyArg::Both => &[Body::Sun, Body::Moon],
        }
    }
}

fn load_config(args: &Args) -> Result<MountConfig> {
    let mut config = match &args.config {
        Some(path) => MountConfig::load(path)?,
        None => MountConfig::from_env()?,
    };
    if let Some(latitude) = args.lat {
        config.observer.latitude = latitude;
    }
    if let Some(longitude) = args.lon {
        config.observer.longitude = longitude;
    }
    config.validate().context("invalid mount configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "mount_cli=debug,mount_control=debug,celestial_mechanics=debug,info"
    } else {
        "mount_cli=info,mount_control=info,warn"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&args)?;

    match args.command {
        Cmd::Position { body, at, json } => {
            let calculator = CelestialCalculator::new(config.observer)?;
            let at = at.unwrap_or_else(Utc::now);
            let positions = body
                .bodies()
                .iter()
                .map(|b| calculator.position(*b, at))
                .collect::<Result<Vec<_>, _>>()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&positions)?);
            } else {
                println!("{} at {}", config.observer.label(), at.to_rfc3339());
                for p in &positions {
                    println!("{}", format_position(p));
                }
            }
        }
        Cmd::Riseset { body, date, json } => {
            let calculator = CelestialCalculator::new(config.observer)?;
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let events: Vec<_> = body
                .bodies()
                .iter()
                .map(|b| calculator.rise_and_set(*b, date))
                .collect::<Result<_, _>>()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else {
                println!("{}", config.observer.label());
                for rs in &events {
                    println!("{}", format_riseset(rs));
                }
            }
        }
        Cmd::Run {
            slew,
            track,
            confirm_safety,
            seconds,
        } => run(config, slew, track, confirm_safety, seconds).await?,
    }

    Ok(())
}

async fn run(
    config: MountConfig,
    slew: Option<Target>,
    track: Option<Target>,
    confirm_safety: bool,
    seconds: u64,
) -> Result<()> {
    let memory = Arc::new(MemorySink::new(config.events.recent_capacity));
    let sink = FanoutSink::new()
        .with(Arc::new(TracingSink))
        .with(memory.clone());

    let handle = Mount::simulated(config, Arc::new(sink))?.spawn();

    if confirm_safety {
        handle
            .execute(Command::ConfirmSafety { confirmed: true })
            .await?;
    }
    if let Some(target) = slew {
        let outcome = handle.execute(Command::SlewTo { target }).await?;
        info!(?outcome, %target, "Slew accepted");
    }
    if let Some(target) = track {
        let outcome = handle.execute(Command::StartTracking { target }).await?;
        info!(?outcome, %target, "Tracking accepted");
    }

    let mut interval = tokio::time::interval(Duration::from_secs(1));
    for _ in 0..seconds {
        tokio::select! {
            _ = interval.tick() => println!("{}", handle.snapshot()),
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping mount");
                handle.emergency_stop();
                break;
            }
        }
    }

    handle.shutdown().await;

    println!();
    println!("Event log ({} recorded):", memory.len());
    for event in memory.recent(50) {
        println!(
            "  {}  {:<16}  alt {:>6.2}°  az {:>6.2}°  {}  {}",
            event.timestamp.format("%H:%M:%S%.3f"),
            event.kind.to_string(),
            event.altitude,
            event.azimuth,
            event.target,
            event.notes
        );
    }
    Ok(())
}
