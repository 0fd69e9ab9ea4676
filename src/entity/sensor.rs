//! Sensor entities

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{find_device, Domain, Entity, PollCursor};
use crate::nest::{NestCoordinator, NestMode, NestSnapshot};
use crate::rpi::RpiCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpiVariable {
    Temperature,
    Humidity,
}

impl RpiVariable {
    pub const ALL: [Self; 2] = [Self::Humidity, Self::Temperature];

    pub fn key(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
        }
    }

    /// Temperature is reported in °C, humidity as a 0-1 fraction shown in percent
    fn format(self, value: f64) -> String {
        match self {
            Self::Temperature => format!("{value:.1}"),
            Self::Humidity => format!("{:.1}", value * 100.0),
        }
    }
}

/// One reading of the Raspberry Pi sensor
pub struct RaspberryPiSensor {
    coordinator: Arc<RpiCoordinator>,
    variable: RpiVariable,
    unique_id: String,
    state: Option<String>,
    cursor: PollCursor,
}

impl RaspberryPiSensor {
    pub fn new(coordinator: Arc<RpiCoordinator>, variable: RpiVariable) -> Self {
        let unique_id = format!("{}-{}", coordinator.fetcher().host(), variable.key());
        Self {
            coordinator,
            variable,
            unique_id,
            state: None,
            cursor: PollCursor::default(),
        }
    }

    fn update_attrs(&mut self, data: &Value) {
        match data.get(self.variable.key()).and_then(Value::as_f64) {
            Some(value) => self.state = Some(self.variable.format(value)),
            None => log::warn!(
                "Sensor data from {} has no numeric {}",
                self.coordinator.fetcher().host(),
                self.variable.key()
            ),
        }
    }
}

#[async_trait]
impl Entity for RaspberryPiSensor {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn domain(&self) -> Domain {
        Domain::Sensor
    }

    async fn update(&mut self) {
        if let Some(data) = self.cursor.poll(&*self.coordinator).await {
            self.update_attrs(&data);
        }
    }

    fn native_value(&self) -> Option<String> {
        self.state.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicVariable {
    Humidity,
    HvacState,
}

impl BasicVariable {
    pub const ALL: [Self; 2] = [Self::Humidity, Self::HvacState];

    pub fn key(self) -> &'static str {
        match self {
            Self::Humidity => "humidity",
            Self::HvacState => "hvac_state",
        }
    }
}

/// Thermostat humidity or raw hvac state
pub struct NestBasicSensor {
    coordinator: Arc<NestCoordinator>,
    serial: String,
    variable: BasicVariable,
    unique_id: String,
    state: Option<String>,
    cursor: PollCursor,
}

impl NestBasicSensor {
    pub fn new(coordinator: Arc<NestCoordinator>, serial: &str, variable: BasicVariable) -> Self {
        Self {
            coordinator,
            serial: serial.to_string(),
            variable,
            unique_id: format!("{serial}-{}", variable.key()),
            state: None,
            cursor: PollCursor::default(),
        }
    }

    fn update_attrs(&mut self, snapshot: &NestSnapshot) {
        let Some((_, device)) = find_device(snapshot, &self.serial) else {
            return;
        };
        self.state = match self.variable {
            BasicVariable::Humidity => device.humidity.map(|h| h.to_string()),
            BasicVariable::HvacState => Some(device.shared.hvac_state.clone()),
        };
    }
}

#[async_trait]
impl Entity for NestBasicSensor {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn domain(&self) -> Domain {
        Domain::Sensor
    }

    async fn update(&mut self) {
        if let Some(snapshot) = self.cursor.poll(&*self.coordinator).await {
            self.update_attrs(&snapshot);
        }
    }

    fn native_value(&self) -> Option<String> {
        self.state.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempVariable {
    Temperature,
    Target,
}

impl TempVariable {
    pub const ALL: [Self; 2] = [Self::Temperature, Self::Target];

    pub fn key(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Target => "target",
        }
    }
}

/// Current or target temperature of a thermostat
pub struct NestTempSensor {
    coordinator: Arc<NestCoordinator>,
    serial: String,
    variable: TempVariable,
    unique_id: String,
    state: Option<String>,
    cursor: PollCursor,
}

impl NestTempSensor {
    pub fn new(coordinator: Arc<NestCoordinator>, serial: &str, variable: TempVariable) -> Self {
        Self {
            coordinator,
            serial: serial.to_string(),
            variable,
            unique_id: format!("{serial}-{}", variable.key()),
            state: None,
            cursor: PollCursor::default(),
        }
    }

    fn update_attrs(&mut self, snapshot: &NestSnapshot) {
        let Some((_, device)) = find_device(snapshot, &self.serial) else {
            return;
        };
        let shared = &device.shared;
        self.state = Some(match self.variable {
            TempVariable::Temperature => format!("{:.1}", shared.current_temperature),
            TempVariable::Target => match (shared.target_temperature_type, shared.target_temp_range) {
                (NestMode::Range, Some((low, high))) => format!("{low:.1}-{high:.1}"),
                _ => format!("{:.1}", shared.target_temperature),
            },
        });
    }
}

#[async_trait]
impl Entity for NestTempSensor {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn domain(&self) -> Domain {
        Domain::Sensor
    }

    async fn update(&mut self) {
        if let Some(snapshot) = self.cursor.poll(&*self.coordinator).await {
            self.update_attrs(&snapshot);
        }
    }

    fn native_value(&self) -> Option<String> {
        self.state.clone()
    }

    fn attributes(&self) -> Map<String, Value> {
        let mut attrs = Map::new();
        attrs.insert("serial".to_string(), Value::String(self.serial.clone()));
        attrs
    }
}
