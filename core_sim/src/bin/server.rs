use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use core_sim::{load_simulation_config_from_env, start_server, ServerState, SimulationSummary};

#[derive(Parser, Debug)]
#[command(author, version, about = "Petri simulation server")]
struct Args {
    /// Address to listen on, overriding the config file
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// Seed for the simulation RNG
    #[arg(long)]
    seed: Option<u64>,
    /// Directory for the run recorder output
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Run this many ticks without serving viewers, write the results and exit
    #[arg(long)]
    steps: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = load_simulation_config_from_env();
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.output_dir.is_some() {
        config.output_dir = args.output_dir;
    }

    if let Some(steps) = args.steps {
        let summary = ServerState::from_config(&config).run_batch(steps);
        log_summary(&summary);
        return Ok(());
    }

    let server = start_server(config).await?;
    info!(
        target: "petri::server",
        endpoint = %server.endpoint(),
        "Petri simulation server ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    let summary = server.shutdown().await?;
    log_summary(&summary);
    Ok(())
}

fn log_summary(summary: &SimulationSummary) {
    info!(
        target: "petri::server",
        winner = ?summary.winner,
        molecules = summary.total_molecules,
        species = summary.total_species,
        surviving = summary.surviving_species,
        "run.summary"
    );
}
