//! Nest web service commands

use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::NestCommand;
use crate::commands::rpi::print_status;
use crate::config::RuntimeContext;
use crate::integration::setup_nest;
use crate::nest::{NestCoordinator, NestMode, Structure, ThermostatDevice};
use crate::output::{cell, output_for_format, print_table};
use crate::refresh::RefreshStatus;

#[derive(Debug, Tabled, Serialize)]
struct StructureRow {
    id: String,
    name: String,
    away: bool,
}

impl From<&Structure> for StructureRow {
    fn from(structure: &Structure) -> Self {
        Self {
            id: structure.id.clone(),
            name: structure.name.clone(),
            away: structure.away,
        }
    }
}

#[derive(Debug, Tabled, Serialize)]
struct ThermostatRow {
    structure: String,
    serial: String,
    name: String,
    mode: String,
    current: String,
    target: String,
    humidity: String,
    hvac_state: String,
}

impl From<(&Structure, &ThermostatDevice)> for ThermostatRow {
    fn from((structure, device): (&Structure, &ThermostatDevice)) -> Self {
        let shared = &device.shared;
        let unit = device.temperature_scale.unit();
        let target = match shared.target_temp_range {
            Some((low, high)) if shared.target_temperature_type == NestMode::Range => {
                format!("{low:.1}-{high:.1}{unit}")
            }
            _ => format!("{:.1}{unit}", shared.target_temperature),
        };

        Self {
            structure: structure.name.clone(),
            serial: device.serial.clone(),
            name: device.name.clone(),
            mode: shared.target_temperature_type.as_str().to_string(),
            current: format!("{:.1}{unit}", shared.current_temperature),
            target,
            humidity: cell(device.humidity.map(|h| format!("{h}%"))),
            hvac_state: shared.hvac_state.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct NestStatus {
    #[serde(flatten)]
    refresh: RefreshStatus,
    local_structure: Vec<String>,
    thermostats: usize,
}

pub async fn run(ctx: &RuntimeContext, command: NestCommand) -> Result<()> {
    let coordinator = setup_nest(ctx).await?;
    match command {
        NestCommand::Structures => structures(ctx, &coordinator).await,
        NestCommand::Thermostats => thermostats(ctx, &coordinator),
        NestCommand::Status => status(ctx, &coordinator),
    }
}

async fn structures(ctx: &RuntimeContext, coordinator: &NestCoordinator) -> Result<()> {
    let structures = coordinator.fetcher().structures().await;

    output_for_format(ctx, &structures, || {
        if structures.is_empty() {
            println!("No structures found");
            return Ok(());
        }
        let rows: Vec<StructureRow> = structures.iter().map(StructureRow::from).collect();
        print_table(ctx, &rows)
    })
}

fn thermostats(ctx: &RuntimeContext, coordinator: &NestCoordinator) -> Result<()> {
    let snapshot = coordinator.latest_data().unwrap_or_default();

    output_for_format(ctx, &*snapshot, || {
        if snapshot.is_empty() {
            println!("No thermostats found");
            return Ok(());
        }
        let rows: Vec<ThermostatRow> = snapshot
            .iter()
            .map(|(structure, device)| ThermostatRow::from((structure, device)))
            .collect();
        print_table(ctx, &rows)
    })
}

fn status(ctx: &RuntimeContext, coordinator: &NestCoordinator) -> Result<()> {
    let status = NestStatus {
        refresh: coordinator.status(),
        local_structure: coordinator
            .fetcher()
            .local_structure()
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default(),
        thermostats: coordinator.latest_data().map_or(0, |snapshot| snapshot.len()),
    };

    output_for_format(ctx, &status, || {
        print_status(&status.refresh);
        println!("Structures:        {}", status.local_structure.join(", "));
        println!("Thermostats:       {}", status.thermostats);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nest::testing::{structure, thermostat};

    #[test]
    fn test_thermostat_row() {
        let home = structure("s1", "Home", false);
        let mut device = thermostat("T1");

        let row = ThermostatRow::from((&home, &device));
        assert_eq!(row.structure, "Home");
        assert_eq!(row.mode, "heat");
        assert_eq!(row.current, "20.5°C");
        assert_eq!(row.target, "21.0°C");
        assert_eq!(row.humidity, "43%");

        device.shared.target_temperature_type = NestMode::Range;
        device.humidity = None;
        let row = ThermostatRow::from((&home, &device));
        assert_eq!(row.target, "19.0-24.0°C");
        assert_eq!(row.humidity, "-");
    }
}
