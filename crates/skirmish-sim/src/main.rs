//! # Skirmish Sim
//!
//! Runs a scripted encounter against the combat core and logs every event.
//!
//! Usage: `skirmish-sim [config.toml] [scenario.ron]`
//!
//! A missing config falls back to defaults; without a scenario the built-in
//! encounter runs.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

use std::env;

use anyhow::Result;
use skirmish_combat::CombatConfig;
use skirmish_sim::{Scenario, Simulation};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("skirmish=info".parse()?))
        .init();

    info!("Skirmish sim {}", env!("CARGO_PKG_VERSION"));

    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => CombatConfig::load_or_default(path),
        None => CombatConfig::default(),
    };
    let scenario = match args.next() {
        Some(path) => Scenario::load(path)?,
        None => Scenario::builtin(),
    };

    let summary = Simulation::new(scenario, config)?.run();
    println!("{summary}");
    Ok(())
}
