//! Poll loop
//!
//! Every scan interval all entities update concurrently; the coordinators
//! decide whether that tick reaches the network. Only state changes are
//! printed.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;

use crate::cli::OutputFormat;
use crate::config::RuntimeContext;
use crate::entity::{update_all, Entity, EntityState};
use crate::integration::Integrations;
use crate::output::cell;

#[derive(Debug, Clone, PartialEq, Serialize)]
struct StateChange {
    entity_id: String,
    old_state: Option<String>,
    new_state: Option<String>,
    changed_at: DateTime<Utc>,
}

pub async fn run(ctx: &RuntimeContext, interval: Option<String>, count: Option<u64>) -> Result<()> {
    let scan_interval = match interval {
        Some(text) => humantime::parse_duration(&text)
            .with_context(|| format!("parsing interval '{text}'"))?,
        None => ctx.scan_interval(),
    };
    if scan_interval.is_zero() {
        bail!("Scan interval must be greater than zero");
    }

    let integrations = Integrations::setup(ctx).await?;
    let mut entities = integrations.entities();

    if ctx.is_table_output() {
        println!(
            "Polling {} entities every {}",
            entities.len(),
            humantime::format_duration(scan_interval)
        );
        println!("Press Ctrl+C to stop\n");
    }

    let result = poll_loop(ctx, &mut entities, scan_interval, count).await;
    integrations.teardown();
    result
}

async fn poll_loop(
    ctx: &RuntimeContext,
    entities: &mut [Box<dyn Entity>],
    scan_interval: Duration,
    count: Option<u64>,
) -> Result<()> {
    let output_format = ctx.output_format();
    let mut known: HashMap<String, Option<String>> = HashMap::new();
    let mut ticker = tokio::time::interval(scan_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = 0_u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                log::debug!("Received Ctrl+C, stopping poll");
                break;
            }
        }

        update_all(entities).await;
        let states: Vec<EntityState> = entities.iter().map(|entity| entity.state()).collect();
        for change in detect_changes(&mut known, &states) {
            print_change(output_format, &change)?;
        }

        ticks += 1;
        if count.is_some_and(|count| ticks >= count) {
            log::debug!("Stopping poll after {ticks} ticks");
            break;
        }
    }

    Ok(())
}

/// Compare against the last known states and record the new ones
fn detect_changes(
    known: &mut HashMap<String, Option<String>>,
    states: &[EntityState],
) -> Vec<StateChange> {
    let now = Utc::now();
    let mut changes = Vec::new();
    for state in states {
        let previous = known.insert(state.entity_id.clone(), state.state.clone());
        let old_state = match previous {
            Some(old) if old == state.state => continue,
            Some(old) => old,
            None => None,
        };
        changes.push(StateChange {
            entity_id: state.entity_id.clone(),
            old_state,
            new_state: state.state.clone(),
            changed_at: now,
        });
    }
    changes
}

fn print_change(output_format: OutputFormat, change: &StateChange) -> Result<()> {
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string(change)?),
        OutputFormat::Yaml => println!("---\n{}", serde_yaml::to_string(change)?),
        _ => println!(
            "{} {}: {} -> {}",
            change.changed_at.format("%H:%M:%S"),
            change.entity_id,
            cell(change.old_state.as_deref()),
            cell(change.new_state.as_deref())
        ),
    }
    Ok(())
}
