//! Binary sensor entities

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{find_device, Domain, Entity, PollCursor};
use crate::nest::{NestCoordinator, NestSnapshot, Structure, ThermostatDevice};

/// Reads one flag from a thermostat and the structure that owns it
type Accessor = fn(&Structure, &ThermostatDevice) -> bool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    Fan,
    HasLeaf,
    Home,
    AcRunning,
    HeatRunning,
}

impl BinaryKind {
    pub const ALL: [Self; 5] = [
        Self::Fan,
        Self::HasLeaf,
        Self::Home,
        Self::AcRunning,
        Self::HeatRunning,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::Fan => "fan",
            Self::HasLeaf => "has_leaf",
            Self::Home => "home",
            Self::AcRunning => "ac_running",
            Self::HeatRunning => "heat_running",
        }
    }

    fn accessor(self) -> Accessor {
        match self {
            Self::Fan => fan_running,
            Self::HasLeaf => has_leaf,
            Self::Home => is_home,
            Self::AcRunning => ac_running,
            Self::HeatRunning => heat_running,
        }
    }
}

fn fan_running(_: &Structure, device: &ThermostatDevice) -> bool {
    device.shared.hvac_fan_state
}

fn has_leaf(_: &Structure, device: &ThermostatDevice) -> bool {
    device.leaf
}

fn is_home(structure: &Structure, _: &ThermostatDevice) -> bool {
    !structure.away
}

fn ac_running(_: &Structure, device: &ThermostatDevice) -> bool {
    device.shared.hvac_ac_state
}

fn heat_running(_: &Structure, device: &ThermostatDevice) -> bool {
    device.shared.hvac_heater_state
}

pub struct NestBinarySensor {
    coordinator: Arc<NestCoordinator>,
    serial: String,
    kind: BinaryKind,
    accessor: Accessor,
    unique_id: String,
    is_on: Option<bool>,
    cursor: PollCursor,
}

impl NestBinarySensor {
    pub fn new(coordinator: Arc<NestCoordinator>, serial: &str, kind: BinaryKind) -> Self {
        Self {
            coordinator,
            serial: serial.to_string(),
            kind,
            accessor: kind.accessor(),
            unique_id: format!("{serial}-{}", kind.key()),
            is_on: None,
            cursor: PollCursor::default(),
        }
    }

    pub fn kind(&self) -> BinaryKind {
        self.kind
    }

    pub fn is_on(&self) -> Option<bool> {
        self.is_on
    }

    fn update_attrs(&mut self, snapshot: &NestSnapshot) {
        if let Some((structure, device)) = find_device(snapshot, &self.serial) {
            self.is_on = Some((self.accessor)(structure, device));
        }
    }
}

#[async_trait]
impl Entity for NestBinarySensor {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn domain(&self) -> Domain {
        Domain::BinarySensor
    }

    async fn update(&mut self) {
        if let Some(snapshot) = self.cursor.poll(&*self.coordinator).await {
            self.update_attrs(&snapshot);
        }
    }

    fn native_value(&self) -> Option<String> {
        self.is_on()
            .map(|on| if on { "on" } else { "off" }.to_string())
    }

    fn attributes(&self) -> Map<String, Value> {
        let mut attrs = Map::new();
        attrs.insert("serial".to_string(), Value::String(self.serial.clone()));
        attrs.insert("kind".to_string(), Value::String(self.kind().key().to_string()));
        attrs
    }
}
