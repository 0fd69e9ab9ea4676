//! Climate command implementations

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::ClimateCommand;
use crate::config::RuntimeContext;
use crate::entity::climate::{FanMode, HvacMode, Preset};
use crate::entity::{Entity, EntityState, NestThermostat};
use crate::integration::setup_nest;
use crate::nest::NestCoordinator;
use crate::output::{cell, output_for_format, print_table};

#[derive(Debug, Tabled, Serialize)]
struct ClimateRow {
    serial: String,
    name: String,
    mode: String,
    action: String,
    current: String,
    target: String,
    preset: String,
    fan: String,
    features: u32,
}

impl From<&NestThermostat> for ClimateRow {
    fn from(thermostat: &NestThermostat) -> Self {
        let target = match (
            thermostat.target_temperature_low(),
            thermostat.target_temperature_high(),
        ) {
            (Some(low), Some(high)) => format!("{low:.1}-{high:.1}"),
            _ => cell(thermostat.target_temperature().map(|t| format!("{t:.1}"))),
        };

        Self {
            serial: thermostat.serial().to_string(),
            name: cell(thermostat.name()),
            mode: cell(thermostat.native_value()),
            action: cell(thermostat.hvac_action().map(|a| a.as_str())),
            current: cell(thermostat.current_temperature().map(|t| format!("{t:.1}"))),
            target,
            preset: thermostat.preset_mode().as_str().to_string(),
            fan: cell(thermostat.fan_mode().map(|f| f.as_str())),
            features: thermostat.supported_features().bits(),
        }
    }
}

pub async fn run(ctx: &RuntimeContext, command: ClimateCommand) -> Result<()> {
    let coordinator = setup_nest(ctx).await?;
    let thermostats = load_thermostats(&coordinator).await;

    match command {
        ClimateCommand::Show { serial } => show(ctx, &thermostats, serial.as_deref()),
        ClimateCommand::SetTemp {
            serial,
            temperature,
            low,
            high,
        } => {
            let thermostat = find(&thermostats, &serial)?;
            thermostat
                .set_temperature(low, high, temperature)
                .await
                .with_context(|| format!("setting temperature on {serial}"))?;
            println!("Temperature request sent to {serial}");
            Ok(())
        }
        ClimateCommand::SetMode { serial, mode } => set_mode(&thermostats, &serial, mode).await,
        ClimateCommand::SetPreset { serial, preset } => {
            set_preset(&thermostats, &serial, preset).await
        }
        ClimateCommand::SetFan { serial, fan } => set_fan(&thermostats, &serial, fan).await,
    }
}

async fn load_thermostats(coordinator: &Arc<NestCoordinator>) -> Vec<NestThermostat> {
    let snapshot = coordinator.latest_data().unwrap_or_default();
    let mut thermostats = Vec::with_capacity(snapshot.len());
    for (structure, device) in snapshot.iter() {
        let mut thermostat = NestThermostat::new(Arc::clone(coordinator), structure, device);
        thermostat.update().await;
        thermostats.push(thermostat);
    }
    thermostats
}

fn find<'a>(thermostats: &'a [NestThermostat], serial: &str) -> Result<&'a NestThermostat> {
    thermostats
        .iter()
        .find(|t| t.serial().eq_ignore_ascii_case(serial))
        .ok_or_else(|| anyhow!("Thermostat not found: {serial}"))
}

fn show(ctx: &RuntimeContext, thermostats: &[NestThermostat], serial: Option<&str>) -> Result<()> {
    let selected: Vec<&NestThermostat> = match serial {
        Some(serial) => vec![find(thermostats, serial)?],
        None => thermostats.iter().collect(),
    };
    let states: Vec<EntityState> = selected.iter().map(|t| t.state()).collect();

    output_for_format(ctx, &states, || {
        if selected.is_empty() {
            println!("No thermostats found");
            return Ok(());
        }
        let rows: Vec<ClimateRow> = selected.iter().map(|t| ClimateRow::from(*t)).collect();
        print_table(ctx, &rows)
    })
}

async fn set_mode(thermostats: &[NestThermostat], serial: &str, mode: HvacMode) -> Result<()> {
    let thermostat = find(thermostats, serial)?;
    if !thermostat.hvac_modes().contains(&mode) {
        bail!("Mode {} is not supported by {serial}", mode.as_str());
    }
    thermostat
        .set_hvac_mode(mode)
        .await
        .with_context(|| format!("setting mode on {serial}"))?;
    println!("Mode of {serial} set to {}", mode.as_str());
    Ok(())
}

async fn set_preset(thermostats: &[NestThermostat], serial: &str, preset: Preset) -> Result<()> {
    let thermostat = find(thermostats, serial)?;
    thermostat
        .set_preset_mode(preset)
        .await
        .with_context(|| format!("setting preset on {serial}"))?;
    println!("Preset of {serial} set to {}", preset.as_str());
    Ok(())
}

async fn set_fan(thermostats: &[NestThermostat], serial: &str, fan: FanMode) -> Result<()> {
    let thermostat = find(thermostats, serial)?;
    thermostat
        .set_fan_mode(fan)
        .await
        .with_context(|| format!("setting fan mode on {serial}"))?;
    println!("Fan of {serial} set to {}", fan.as_str());
    Ok(())
}
