//! Raspberry Pi sensor commands

use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::cli::RpiCommand;
use crate::config::RuntimeContext;
use crate::entity::{rpi_entities, update_all};
use crate::integration::setup_rpi;
use crate::output::{cell, output_for_format};
use crate::refresh::RefreshStatus;
use crate::rpi::RpiCoordinator;

pub async fn run(ctx: &RuntimeContext, command: RpiCommand) -> Result<()> {
    let coordinator = setup_rpi(ctx)?;
    let result = match command {
        RpiCommand::Read => read(ctx, &coordinator).await,
        RpiCommand::Status => status(ctx, &coordinator).await,
    };
    coordinator.fetcher().aclose();
    result
}

async fn read(ctx: &RuntimeContext, coordinator: &Arc<RpiCoordinator>) -> Result<()> {
    let mut entities = rpi_entities(coordinator);
    update_all(&mut entities).await;

    let host = coordinator.fetcher().host();
    let data = coordinator
        .latest_data()
        .ok_or_else(|| anyhow!("No reading received from {host}"))?;

    output_for_format(ctx, &*data, || {
        println!("Sensor: {host}");
        for entity in &entities {
            let state = entity.state();
            println!("  {:<28} {}", state.entity_id, cell(state.state.as_deref()));
        }
        Ok(())
    })
}

async fn status(ctx: &RuntimeContext, coordinator: &RpiCoordinator) -> Result<()> {
    coordinator.maybe_refresh().await;
    let status = coordinator.status();
    output_for_format(ctx, &status, || {
        print_status(&status);
        Ok(())
    })
}

/// Human rendering of a coordinator status, shared with the Nest commands
pub(crate) fn print_status(status: &RefreshStatus) {
    println!("Source:            {}", status.source);
    println!("Refresh interval:  {}", status.refresh_interval);
    println!("Minimum interval:  {}", status.minimum_interval);
    println!(
        "Last refresh:      {}",
        cell(status.refreshed_at.map(|at| at.to_rfc3339()))
    );
    println!("Age:               {}", cell(status.age_secs.map(|s| format!("{s}s"))));
    println!("Due:               {}", status.due);
    println!("Has data:          {}", status.has_data);
    println!("Generation:        {}", status.generation);
    println!("Failures:          {}", status.failures);
}
