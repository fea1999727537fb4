//! MiR node
//!
//! Dispatches named missions to a MiR robot and reports queue progress.
//!
//! Usage:
//!     mir-node --host 10.0.0.5 run wait_5 --actions '[{"wait": {"time": "00:00:10"}}]'
//!     mir-node progress

mod cli;
mod commands;

use anyhow::Context;
use clap::Parser;
use mir_logging::LogConfig;
use mir_mission::{HttpGateway, MirSession};
use std::sync::Arc;

use crate::cli::Cli;
use crate::commands::CheckpointStore;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    mir_logging::init_logging(LogConfig {
        app_name: "mir_node",
        verbose: cli.verbose,
        quiet: cli.quiet,
    })?;

    let config = cli.to_config()?;
    tracing::info!("Starting MiR node");
    tracing::info!("  Robot: {}", config.base_url());
    tracing::info!("  Map: {}", config.map_name);

    let catalog = Arc::new(config.load_catalog()?);
    let gateway = HttpGateway::new(&config)?;
    let session = MirSession::open(gateway, catalog, config.session_options())
        .with_context(|| format!("failed to open session with {}", config.host))?;

    let store = CheckpointStore::new(&mir_logging::node_home());
    commands::execute(&session, &store, cli.command)
}
