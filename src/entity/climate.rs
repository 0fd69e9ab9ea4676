//! Thermostat climate entity

use std::ops::BitOr;
use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::{find_device, Domain, Entity, PollCursor};
use crate::error::Result;
use crate::nest::{NestCoordinator, NestMode, NestSnapshot, Structure, ThermostatDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Auto,
    Heat,
    Cool,
    Off,
}

impl HvacMode {
    fn from_nest(mode: NestMode) -> Option<Self> {
        match mode {
            NestMode::Range => Some(Self::Auto),
            NestMode::Heat => Some(Self::Heat),
            NestMode::Cool => Some(Self::Cool),
            NestMode::Off => Some(Self::Off),
            NestMode::Eco => None,
        }
    }

    fn to_nest(self) -> NestMode {
        match self {
            Self::Auto => NestMode::Range,
            Self::Heat => NestMode::Heat,
            Self::Cool => NestMode::Cool,
            Self::Off => NestMode::Off,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::Off => "off",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacAction {
    Idle,
    Heat,
    Cool,
    Fan,
}

impl HvacAction {
    fn from_nest(state: &str) -> Option<Self> {
        match state {
            "off" => Some(Self::Idle),
            "heating" => Some(Self::Heat),
            "cooling" => Some(Self::Cool),
            "fan running" => Some(Self::Fan),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::Fan => "fan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    None,
    Away,
}

impl Preset {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Away => "away",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FanMode {
    On,
    Auto,
}

impl FanMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Auto => "auto",
        }
    }
}

/// Supported climate feature bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ClimateFeatures(u32);

impl ClimateFeatures {
    pub const TARGET_TEMPERATURE: Self = Self(1);
    pub const TARGET_TEMPERATURE_RANGE: Self = Self(2);
    pub const FAN_MODE: Self = Self(8);
    pub const PRESET_MODE: Self = Self(16);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for ClimateFeatures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

pub struct NestThermostat {
    coordinator: Arc<NestCoordinator>,
    unique_id: String,
    structure: Structure,
    device: ThermostatDevice,
    features: ClimateFeatures,
    hvac_modes: Vec<HvacMode>,
    has_fan: bool,
    // Values below are refreshed by `update`.
    name: Option<String>,
    location: Option<String>,
    humidity: Option<f64>,
    fan: bool,
    away: bool,
    temperature: Option<f64>,
    mode: Option<NestMode>,
    target: Option<f64>,
    target_range: Option<(f64, f64)>,
    action: Option<String>,
    temp_range: Option<(f64, f64)>,
    cursor: PollCursor,
}

impl NestThermostat {
    pub fn new(coordinator: Arc<NestCoordinator>, structure: &Structure, device: &ThermostatDevice) -> Self {
        let shared = &device.shared;
        let mut features = ClimateFeatures::TARGET_TEMPERATURE | ClimateFeatures::PRESET_MODE;
        let hvac_modes = match (shared.can_heat, shared.can_cool) {
            (true, true) => {
                features = features | ClimateFeatures::TARGET_TEMPERATURE_RANGE;
                vec![HvacMode::Auto, HvacMode::Heat, HvacMode::Cool, HvacMode::Off]
            }
            (true, false) => vec![HvacMode::Heat, HvacMode::Off],
            (false, true) => vec![HvacMode::Cool, HvacMode::Off],
            (false, false) => vec![HvacMode::Off],
        };
        if device.has_fan {
            features = features | ClimateFeatures::FAN_MODE;
        }

        Self {
            coordinator,
            unique_id: device.serial.clone(),
            structure: structure.clone(),
            device: device.clone(),
            features,
            hvac_modes,
            has_fan: device.has_fan,
            name: None,
            location: None,
            humidity: None,
            fan: false,
            away: false,
            temperature: None,
            mode: None,
            target: None,
            target_range: None,
            action: None,
            temp_range: None,
            cursor: PollCursor::default(),
        }
    }

    pub fn serial(&self) -> &str {
        &self.device.serial
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn supported_features(&self) -> ClimateFeatures {
        self.features
    }

    pub fn hvac_modes(&self) -> &[HvacMode] {
        &self.hvac_modes
    }

    pub fn hvac_mode(&self) -> Option<HvacMode> {
        self.mode.and_then(HvacMode::from_nest)
    }

    pub fn hvac_action(&self) -> Option<HvacAction> {
        self.action.as_deref().and_then(HvacAction::from_nest)
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn target_temperature(&self) -> Option<f64> {
        if self.mode == Some(NestMode::Range) {
            None
        } else {
            self.target
        }
    }

    pub fn target_temperature_low(&self) -> Option<f64> {
        self.range_bound().map(|(low, _)| low)
    }

    pub fn target_temperature_high(&self) -> Option<f64> {
        self.range_bound().map(|(_, high)| high)
    }

    fn range_bound(&self) -> Option<(f64, f64)> {
        if self.mode == Some(NestMode::Range) {
            self.target_range
        } else {
            None
        }
    }

    pub fn min_temp(&self) -> Option<f64> {
        self.temp_range.map(|(min, _)| min)
    }

    pub fn max_temp(&self) -> Option<f64> {
        self.temp_range.map(|(_, max)| max)
    }

    pub fn preset_mode(&self) -> Preset {
        if self.away {
            Preset::Away
        } else {
            Preset::None
        }
    }

    pub fn fan_mode(&self) -> Option<FanMode> {
        self.has_fan
            .then(|| if self.fan { FanMode::On } else { FanMode::Auto })
    }

    /// Set a single target, or the low/high range while in heat-cool mode
    pub async fn set_temperature(
        &self,
        low: Option<f64>,
        high: Option<f64>,
        temperature: Option<f64>,
    ) -> Result<()> {
        let client = self.coordinator.fetcher().client();
        match (self.mode, low, high, temperature) {
            (Some(NestMode::Range), Some(low), Some(high), _) => {
                client.set_temp_range(&self.device, low, high).await
            }
            (_, _, _, Some(temperature)) => client.set_temp(&self.device, temperature).await,
            _ => {
                log::debug!(
                    "Invalid set_temperature args for mode={:?} - low={low:?} high={high:?} temp={temperature:?}",
                    self.mode
                );
                Ok(())
            }
        }
    }

    pub async fn set_hvac_mode(&self, mode: HvacMode) -> Result<()> {
        self.coordinator
            .fetcher()
            .client()
            .set_mode(&self.device, mode.to_nest())
            .await
    }

    pub async fn set_preset_mode(&self, preset: Preset) -> Result<()> {
        if preset == self.preset_mode() {
            return Ok(());
        }
        let need_away = preset == Preset::Away;
        if self.away != need_away {
            self.coordinator
                .fetcher()
                .client()
                .set_away(&self.structure, need_away)
                .await?;
        }
        Ok(())
    }

    pub async fn set_fan_mode(&self, fan_mode: FanMode) -> Result<()> {
        if !self.has_fan {
            log::debug!("Thermostat {} has no fan - ignoring fan mode", self.serial());
            return Ok(());
        }
        let client = self.coordinator.fetcher().client();
        match fan_mode {
            FanMode::On => client.start_fan(&self.device).await,
            FanMode::Auto => client.stop_fan(&self.device).await,
        }
    }

    fn update_attrs(&mut self, snapshot: &NestSnapshot) {
        let Some((structure, device)) = find_device(snapshot, &self.device.serial) else {
            return;
        };
        log::info!("Refreshing thermostat {}", device.serial);
        let shared = &device.shared;

        self.location = device.location.clone();
        self.name = Some(device.name.clone());
        self.humidity = device.humidity;
        self.fan = device.fan;
        self.away = structure.away;
        self.temperature = Some(shared.current_temperature);
        self.mode = Some(shared.target_temperature_type);
        self.target = Some(shared.target_temperature);
        self.target_range = shared.target_temp_range;
        self.action = Some(shared.hvac_state.clone());
        self.temp_range = Some(shared.allowed_temp_range);

        self.structure = structure.clone();
        self.device = device.clone();
    }
}

#[async_trait]
impl Entity for NestThermostat {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn domain(&self) -> Domain {
        Domain::Climate
    }

    async fn update(&mut self) {
        if let Some(snapshot) = self.cursor.poll(&*self.coordinator).await {
            self.update_attrs(&snapshot);
        }
    }

    fn native_value(&self) -> Option<String> {
        self.hvac_mode().map(|mode| mode.as_str().to_string())
    }

    fn attributes(&self) -> Map<String, Value> {
        let mut attrs = Map::new();
        attrs.insert("name".to_string(), json!(self.name));
        attrs.insert("location".to_string(), json!(self.location));
        attrs.insert("hvac_modes".to_string(), json!(self.hvac_modes));
        attrs.insert("hvac_action".to_string(), json!(self.hvac_action()));
        attrs.insert("current_temperature".to_string(), json!(self.temperature));
        attrs.insert("temperature".to_string(), json!(self.target_temperature()));
        attrs.insert("target_temp_low".to_string(), json!(self.target_temperature_low()));
        attrs.insert("target_temp_high".to_string(), json!(self.target_temperature_high()));
        attrs.insert("min_temp".to_string(), json!(self.min_temp()));
        attrs.insert("max_temp".to_string(), json!(self.max_temp()));
        attrs.insert("current_humidity".to_string(), json!(self.humidity));
        attrs.insert(
            "temperature_unit".to_string(),
            json!(self.device.temperature_scale.unit()),
        );
        attrs.insert("preset_mode".to_string(), json!(self.preset_mode()));
        attrs.insert("preset_modes".to_string(), json!([Preset::None, Preset::Away]));
        attrs.insert("fan_mode".to_string(), json!(self.fan_mode()));
        if self.features.contains(ClimateFeatures::FAN_MODE) {
            attrs.insert("fan_modes".to_string(), json!([FanMode::On, FanMode::Auto]));
        }
        attrs.insert("supported_features".to_string(), json!(self.features.bits()));
        attrs
    }
}
