//! nestweb - poll a Nest thermostat and a Raspberry Pi sensor
//!
//! Entities of each integration share one rate-limited refresh coordinator,
//! so polling many entities costs at most one request per interval.

mod cli;
mod commands;
mod config;
mod entity;
mod error;
mod integration;
mod nest;
mod output;
mod refresh;
mod rpi;

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};
use crate::config::RuntimeContext;

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = writeln!(io::stderr(), "Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = RuntimeContext::new(&cli.global)?;
    ctx.init_logging()?;

    log::debug!("Config loaded from: {:?}", ctx.config_path());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_command(&ctx, cli.command))
}

async fn run_command(ctx: &RuntimeContext, command: Command) -> Result<()> {
    match command {
        Command::Entities { filter } => commands::entities::run(ctx, filter).await,
        Command::Poll { interval, count } => commands::poll::run(ctx, interval, count).await,
        Command::Rpi { command } => commands::rpi::run(ctx, command).await,
        Command::Nest { command } => commands::nest::run(ctx, command).await,
        Command::Climate { command } => commands::climate::run(ctx, command).await,
        Command::Config { command } => commands::config::run(ctx, command),
        Command::Completions { shell } => commands::completions::run(shell),
    }
}
