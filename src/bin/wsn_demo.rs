//! WSN clustering demo
//!
//! Deploys sensors on a jittered grid, runs a number of rounds and prints one
//! JSON report per round on stdout. Logs go to stderr.
//!
//! # Example
//!
//! ```bash
//! wsn_demo --rounds 5 --seed 7 --routing parent-selection --log-level debug
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wsn_cluster::{jittered_grid, Network, RoutingStrategy, SimConfig, TieBreak};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Routing {
    Flood,
    ParentSelection,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Ties {
    Lenient,
    Strict,
}

/// Clustered wireless sensor network simulation
#[derive(Parser, Debug)]
#[command(name = "wsn_demo")]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of rounds to run
    #[arg(short, long, default_value = "4")]
    rounds: u64,

    /// Random seed; overrides the configuration file
    #[arg(long)]
    seed: Option<u64>,

    /// JSON configuration file; missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Grid columns
    #[arg(long, default_value = "6")]
    columns: usize,

    /// Grid rows
    #[arg(long, default_value = "6")]
    rows: usize,

    /// Distance between grid points
    #[arg(long, default_value = "100")]
    spacing: f64,

    /// Maximum random offset of a sensor from its grid point, per axis
    #[arg(long, default_value = "40")]
    jitter: f64,

    /// Inter-cluster routing scheme; overrides the configuration file
    #[arg(long, value_enum)]
    routing: Option<Routing>,

    /// Score tie-breaking; overrides the configuration file
    #[arg(long, value_enum)]
    ties: Option<Ties>,

    /// Pretty-print the JSON reports
    #[arg(long)]
    pretty: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => SimConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(routing) = args.routing {
        config.protocol.routing = match routing {
            Routing::Flood => RoutingStrategy::Flood,
            Routing::ParentSelection => RoutingStrategy::ParentSelection,
        };
    }
    if let Some(ties) = args.ties {
        config.protocol.tie_break = match ties {
            Ties::Lenient => TieBreak::Lenient,
            Ties::Strict => TieBreak::Strict,
        };
    }

    let positions = jittered_grid(
        args.columns,
        args.rows,
        60.0,
        args.spacing,
        args.jitter,
        config.seed,
    );
    info!(
        sensors = positions.len(),
        rounds = args.rounds,
        seed = config.seed,
        routing = ?config.protocol.routing,
        "starting simulation"
    );

    let mut network = Network::new(config, positions)?;
    let reports = network.simulate(args.rounds).await?;

    let mut delivered = 0;
    for report in &reports {
        delivered += report.delivered.len();
        let json = if args.pretty {
            serde_json::to_string_pretty(report)?
        } else {
            report.to_json()?
        };
        println!("{json}");
    }

    let stats = network.stats();
    info!(
        rounds = reports.len(),
        delivered,
        sent = stats.messages_sent,
        dropped = stats.messages_dropped_range,
        "simulation finished"
    );
    Ok(())
}
