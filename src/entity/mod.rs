//! Entity adapters
//!
//! Entities are thin views over a coordinator snapshot. They never fetch on
//! their own: each poll asks the shared coordinator for a conditional refresh
//! and recomputes the displayed value only when there is something new.

pub mod binary_sensor;
pub mod climate;
pub mod sensor;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::nest::{NestCoordinator, NestSnapshot, Structure, ThermostatDevice};
use crate::refresh::{Fetch, RefreshCoordinator};
use crate::rpi::RpiCoordinator;

pub use binary_sensor::{BinaryKind, NestBinarySensor};
pub use climate::NestThermostat;
pub use sensor::{BasicVariable, NestBasicSensor, NestTempSensor, RaspberryPiSensor, RpiVariable, TempVariable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Climate,
    Sensor,
    BinarySensor,
}

impl Domain {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Climate => "climate",
            Self::Sensor => "sensor",
            Self::BinarySensor => "binary_sensor",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendered state of one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub entity_id: String,
    pub unique_id: String,
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

#[async_trait]
pub trait Entity: Send + Sync {
    fn unique_id(&self) -> &str;

    fn domain(&self) -> Domain;

    /// Entities are poll driven; the coordinator keeps polling cheap.
    fn should_poll(&self) -> bool {
        true
    }

    /// Poll tick: maybe refresh the shared cache, then recompute if needed
    async fn update(&mut self);

    fn native_value(&self) -> Option<String>;

    fn attributes(&self) -> Map<String, Value> {
        Map::new()
    }

    fn entity_id(&self) -> String {
        format!("{}.{}", self.domain(), slugify(self.unique_id()))
    }

    fn state(&self) -> EntityState {
        EntityState {
            entity_id: self.entity_id(),
            unique_id: self.unique_id().to_string(),
            state: self.native_value(),
            attributes: self.attributes(),
        }
    }
}

/// Tracks which coordinator snapshot an entity last rendered
#[derive(Debug, Default)]
pub struct PollCursor {
    seen_generation: Option<u64>,
}

impl PollCursor {
    /// Trigger a conditional refresh and hand back the snapshot when the
    /// entity should recompute: a refresh happened on this call, or the
    /// snapshot changed since the entity last looked.
    pub async fn poll<F: Fetch>(
        &mut self,
        coordinator: &RefreshCoordinator<F>,
    ) -> Option<Arc<F::Output>> {
        let refreshed = coordinator.maybe_refresh().await;
        let generation = coordinator.generation();
        if !refreshed && self.seen_generation == Some(generation) {
            return None;
        }

        let data = coordinator.latest_data()?;
        self.seen_generation = Some(generation);
        Some(data)
    }
}

/// Lowercase, `_` separated object id
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

pub(crate) fn find_device<'a>(
    snapshot: &'a NestSnapshot,
    serial: &str,
) -> Option<&'a (Structure, ThermostatDevice)> {
    let found = snapshot.iter().find(|(_, device)| device.serial == serial);
    if found.is_none() {
        log::debug!("Thermostat {serial} is not in the latest snapshot");
    }
    found
}

/// Run one poll tick of every polled entity concurrently
pub async fn update_all(entities: &mut [Box<dyn Entity>]) {
    join_all(
        entities
            .iter_mut()
            .filter(|entity| entity.should_poll())
            .map(|entity| entity.update()),
    )
    .await;
}

/// Sensor entities backed by the Raspberry Pi coordinator
pub fn rpi_entities(coordinator: &Arc<RpiCoordinator>) -> Vec<Box<dyn Entity>> {
    RpiVariable::ALL
        .iter()
        .map(|&variable| {
            Box::new(RaspberryPiSensor::new(Arc::clone(coordinator), variable)) as Box<dyn Entity>
        })
        .collect()
}

/// Climate, sensor and binary sensor entities for every thermostat in the
/// coordinator's current snapshot
pub fn nest_entities(coordinator: &Arc<NestCoordinator>) -> Vec<Box<dyn Entity>> {
    let Some(snapshot) = coordinator.latest_data() else {
        log::warn!("No Nest data available - no entities created");
        return Vec::new();
    };

    let mut entities: Vec<Box<dyn Entity>> = Vec::new();
    for (structure, device) in snapshot.iter() {
        entities.push(Box::new(NestThermostat::new(
            Arc::clone(coordinator),
            structure,
            device,
        )));
        for &variable in BasicVariable::ALL.iter() {
            entities.push(Box::new(NestBasicSensor::new(
                Arc::clone(coordinator),
                &device.serial,
                variable,
            )));
        }
        for &variable in TempVariable::ALL.iter() {
            entities.push(Box::new(NestTempSensor::new(
                Arc::clone(coordinator),
                &device.serial,
                variable,
            )));
        }
        for &kind in BinaryKind::ALL.iter() {
            entities.push(Box::new(NestBinarySensor::new(
                Arc::clone(coordinator),
                &device.serial,
                kind,
            )));
        }
    }
    entities
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::nest::testing::{structure, thermostat, FakeNestClient};
    use crate::nest::{NestCoordinator, NestWebDevice};
    use crate::refresh::RefreshSettings;

    /// Coordinator over one "Home" structure with thermostat `T1`
    pub async fn nest_coordinator() -> (Arc<FakeNestClient>, Arc<NestCoordinator>) {
        let client = Arc::new(FakeNestClient::with(vec![(
            structure("s1", "Home", false),
            vec![thermostat("T1")],
        )]));
        let mut device = NestWebDevice::new(client.clone(), None);
        assert!(device.initialize().await);
        let coordinator = Arc::new(NestCoordinator::new(
            device,
            RefreshSettings::from_secs("nest", 60, 180),
        ));
        coordinator.refresh().await;
        (client, coordinator)
    }

    /// Move past the refresh interval
    pub async fn next_interval() {
        tokio::time::advance(Duration::from_secs(61)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{nest_coordinator, next_interval};
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("192.168.0.20:8000-temperature"), "192_168_0_20_8000_temperature");
        assert_eq!(slugify("09AA01AC-has_leaf"), "09aa01ac_has_leaf");
        assert_eq!(slugify("--x--"), "x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_nest_entities_cover_every_view() {
        let (_, coordinator) = nest_coordinator().await;
        let entities = nest_entities(&coordinator);

        // climate + 2 basic + 2 temperature + 5 binary
        assert_eq!(entities.len(), 10);
        assert!(entities.iter().all(|e| e.should_poll()));

        let ids: Vec<String> = entities.iter().map(|e| e.entity_id()).collect();
        assert!(ids.contains(&"climate.t1".to_string()));
        assert!(ids.contains(&"sensor.t1_humidity".to_string()));
        assert!(ids.contains(&"sensor.t1_target".to_string()));
        assert!(ids.contains(&"binary_sensor.t1_home".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sibling_refresh_is_picked_up() {
        let (client, coordinator) = nest_coordinator().await;
        let mut first = NestTempSensor::new(Arc::clone(&coordinator), "T1", TempVariable::Temperature);
        let mut second = NestTempSensor::new(Arc::clone(&coordinator), "T1", TempVariable::Temperature);
        first.update().await;
        second.update().await;
        assert_eq!(second.native_value().as_deref(), Some("20.5"));

        client.structures.lock().unwrap()[0].1[0].shared.current_temperature = 22.0;
        next_interval().await;

        first.update().await;
        assert_eq!(client.fetches(), 2);
        assert_eq!(first.native_value().as_deref(), Some("22.0"));

        // `second` did not trigger the refresh itself but still sees it.
        second.update().await;
        assert_eq!(client.fetches(), 2);
        assert_eq!(second.native_value().as_deref(), Some("22.0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_all_fetches_once_per_interval() {
        let (client, coordinator) = nest_coordinator().await;
        let mut entities = nest_entities(&coordinator);

        update_all(&mut entities).await;
        assert_eq!(client.fetches(), 1);
        assert!(entities.iter().all(|e| e.native_value().is_some()));

        next_interval().await;
        update_all(&mut entities).await;
        assert_eq!(client.fetches(), 2);
    }

    struct Pushed {
        updates: usize,
    }

    #[async_trait]
    impl Entity for Pushed {
        fn unique_id(&self) -> &str {
            "pushed"
        }

        fn domain(&self) -> Domain {
            Domain::Sensor
        }

        fn should_poll(&self) -> bool {
            false
        }

        async fn update(&mut self) {
            self.updates += 1;
        }

        fn native_value(&self) -> Option<String> {
            Some(self.updates.to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_all_skips_unpolled_entities() {
        let (client, coordinator) = nest_coordinator().await;
        let mut entities = nest_entities(&coordinator);
        entities.push(Box::new(Pushed { updates: 0 }));

        next_interval().await;
        update_all(&mut entities).await;
        assert_eq!(client.fetches(), 2);
        let pushed = entities.last().unwrap();
        assert_eq!(pushed.native_value().as_deref(), Some("0"));
        assert!(entities[0].native_value().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_cursor_skips_unchanged_snapshot() {
        let (_, coordinator) = nest_coordinator().await;
        let mut cursor = PollCursor::default();

        assert!(cursor.poll(&*coordinator).await.is_some());
        assert!(cursor.poll(&*coordinator).await.is_none());

        next_interval().await;
        assert!(cursor.poll(&*coordinator).await.is_some());
    }
}
