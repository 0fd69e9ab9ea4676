//! Nest web service domain model
//!
//! A [`Structure`] groups thermostat devices; every [`ThermostatDevice`]
//! carries its mutable HVAC state in [`Shared`]. The data source itself is
//! abstracted behind [`NestClient`].

pub mod client;
pub mod device;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use client::HttpNestClient;
pub use device::{NestCoordinator, NestSnapshot, NestWebDevice};

/// Default refresh interval for the Nest service in seconds
pub const DEFAULT_REFRESH_INTERVAL: u64 = 180;

/// A home grouping one or more thermostats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub away: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureScale {
    #[serde(rename = "c", alias = "C")]
    Celsius,
    #[serde(rename = "f", alias = "F")]
    Fahrenheit,
}

impl TemperatureScale {
    pub fn unit(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }
}

impl Default for TemperatureScale {
    fn default() -> Self {
        Self::Celsius
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermostatDevice {
    pub serial: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "where")]
    pub location: Option<String>,
    #[serde(default)]
    pub software_version: Option<String>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub fan: bool,
    #[serde(default)]
    pub has_fan: bool,
    #[serde(default)]
    pub leaf: bool,
    #[serde(default)]
    pub temperature_scale: TemperatureScale,
    pub shared: Shared,
}

/// Target temperature type reported by the thermostat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NestMode {
    /// Heat-cool with a low/high range
    Range,
    Heat,
    Cool,
    Eco,
    Off,
}

impl NestMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Range => "range",
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::Eco => "eco",
            Self::Off => "off",
        }
    }
}

/// Mutable HVAC state of one thermostat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shared {
    pub current_temperature: f64,
    pub target_temperature: f64,
    pub target_temperature_type: NestMode,
    #[serde(default)]
    pub target_temp_range: Option<(f64, f64)>,
    /// One of `off`, `heating`, `cooling`, `fan running`
    #[serde(default = "default_hvac_state")]
    pub hvac_state: String,
    #[serde(default)]
    pub hvac_fan_state: bool,
    #[serde(default)]
    pub hvac_heater_state: bool,
    #[serde(default)]
    pub hvac_ac_state: bool,
    #[serde(default)]
    pub can_heat: bool,
    #[serde(default)]
    pub can_cool: bool,
    pub allowed_temp_range: (f64, f64),
}

fn default_hvac_state() -> String {
    "off".to_string()
}

/// Narrow interface onto the Nest web service
#[async_trait]
pub trait NestClient: Send + Sync {
    /// Label for log messages
    fn describe(&self) -> String;

    /// All structures visible to the account, in service order
    async fn structures(&self) -> Result<Vec<Structure>>;

    async fn thermostats(&self, structure: &Structure) -> Result<Vec<ThermostatDevice>>;

    async fn set_away(&self, structure: &Structure, away: bool) -> Result<()>;

    async fn set_temp(&self, device: &ThermostatDevice, temperature: f64) -> Result<()>;

    async fn set_temp_range(&self, device: &ThermostatDevice, low: f64, high: f64) -> Result<()>;

    async fn set_mode(&self, device: &ThermostatDevice, mode: NestMode) -> Result<()>;

    async fn start_fan(&self, device: &ThermostatDevice) -> Result<()>;

    async fn stop_fan(&self, device: &ThermostatDevice) -> Result<()>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thermostat_deserialize() {
        let json = r#"{
            "serial": "09AA01AC",
            "name": "Living Room",
            "where": "Living Room",
            "humidity": 41.5,
            "has_fan": true,
            "temperature_scale": "f",
            "shared": {
                "current_temperature": 20.5,
                "target_temperature": 21.0,
                "target_temperature_type": "range",
                "target_temp_range": [19.0, 23.5],
                "hvac_state": "fan running",
                "can_heat": true,
                "allowed_temp_range": [9.0, 32.0]
            }
        }"#;

        let device: ThermostatDevice = serde_json::from_str(json).unwrap();
        assert_eq!(device.serial, "09AA01AC");
        assert_eq!(device.location.as_deref(), Some("Living Room"));
        assert_eq!(device.temperature_scale, TemperatureScale::Fahrenheit);
        assert_eq!(device.shared.target_temperature_type, NestMode::Range);
        assert_eq!(device.shared.target_temp_range, Some((19.0, 23.5)));
        assert!(!device.shared.can_cool);
        assert!(!device.leaf);
    }

    #[test]
    fn test_shared_defaults_hvac_state() {
        let json = r#"{
            "current_temperature": 18.0,
            "target_temperature": 17.0,
            "target_temperature_type": "off",
            "allowed_temp_range": [9.0, 32.0]
        }"#;

        let shared: Shared = serde_json::from_str(json).unwrap();
        assert_eq!(shared.hvac_state, "off");
        assert_eq!(shared.target_temperature_type, NestMode::Off);
    }

    #[test]
    fn test_structure_away_defaults_false() {
        let structure: Structure = serde_json::from_str(r#"{"id": "s1", "name": "Home"}"#).unwrap();
        assert!(!structure.away);
    }
}
