//! Structure-filtered facade over a [`NestClient`]

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::{NestClient, Structure, ThermostatDevice};
use crate::error::Result;
use crate::refresh::{Fetch, RefreshCoordinator};

/// Every visible thermostat paired with the structure that owns it
pub type NestSnapshot = Vec<(Structure, ThermostatDevice)>;

pub type NestCoordinator = RefreshCoordinator<NestWebDevice>;

pub struct NestWebDevice {
    client: Arc<dyn NestClient>,
    local_structure: Option<BTreeSet<String>>,
}

impl NestWebDevice {
    /// `structures` is the configured allow-list; `None` means "whatever
    /// exists when [`initialize`](Self::initialize) runs".
    pub fn new(client: Arc<dyn NestClient>, structures: Option<Vec<String>>) -> Self {
        Self {
            client,
            local_structure: structures.map(|names| names.into_iter().collect()),
        }
    }

    pub fn client(&self) -> &Arc<dyn NestClient> {
        &self.client
    }

    /// Names of the structures this facade exposes
    pub fn local_structure(&self) -> Option<&BTreeSet<String>> {
        self.local_structure.as_ref()
    }

    /// First contact with the service. Returns `false` when it is unreachable,
    /// in which case the integration should not be set up.
    pub async fn initialize(&mut self) -> bool {
        log::info!("Beginning NestWebDevice.initialize for {}", self.client.describe());
        match self.client.structures().await {
            Ok(structures) => {
                if self.local_structure.is_none() {
                    let names: BTreeSet<String> =
                        structures.into_iter().map(|s| s.name).collect();
                    log::debug!("Using all observed structures: {names:?}");
                    self.local_structure = Some(names);
                }
                true
            }
            Err(err) => {
                log::error!("Connection error while accessing Nest web service: {err}");
                false
            }
        }
    }

    fn includes(&self, structure: &Structure) -> bool {
        let included = self
            .local_structure
            .as_ref()
            .is_some_and(|names| names.contains(&structure.name));
        if !included {
            log::debug!(
                "Ignoring structure={} - not in {:?}",
                structure.name,
                self.local_structure
            );
        }
        included
    }

    /// Allowed structures in the order the service reports them
    pub async fn structures(&self) -> Vec<Structure> {
        match self.client.structures().await {
            Ok(structures) => structures.into_iter().filter(|s| self.includes(s)).collect(),
            Err(err) => {
                log::error!("Connection error while accessing Nest web service: {err}");
                Vec::new()
            }
        }
    }

    /// Thermostats of every allowed structure. A failure stops the listing
    /// and whatever was gathered so far is returned.
    pub async fn thermostats(&self) -> NestSnapshot {
        let mut objs = Vec::new();
        if let Err(err) = self.collect_thermostats(&mut objs).await {
            log::error!("Connection error while accessing Nest web service: {err}");
        }
        objs
    }

    /// Like [`thermostats`](Self::thermostats), but any client error fails the
    /// whole listing.
    pub async fn try_thermostats(&self) -> Result<NestSnapshot> {
        let mut objs = Vec::new();
        self.collect_thermostats(&mut objs).await?;
        Ok(objs)
    }

    async fn collect_thermostats(&self, objs: &mut NestSnapshot) -> Result<()> {
        let structures = self.client.structures().await?;
        for structure in structures.into_iter().filter(|s| self.includes(s)) {
            let devices = self.client.thermostats(&structure).await?;
            objs.extend(devices.into_iter().map(|device| (structure.clone(), device)));
        }
        Ok(())
    }
}

#[async_trait]
impl Fetch for NestWebDevice {
    type Output = NestSnapshot;

    fn describe(&self) -> String {
        format!("nest ({})", self.client.describe())
    }

    async fn fetch(&self) -> Result<NestSnapshot> {
        self.try_thermostats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nest::testing::{structure, thermostat, FakeNestClient};
    use crate::refresh::RefreshSettings;

    fn three_structures() -> FakeNestClient {
        FakeNestClient::with(vec![
            (structure("a", "A", false), vec![thermostat("A1")]),
            (structure("b", "B", false), vec![thermostat("B1")]),
            (structure("c", "C", true), vec![thermostat("C1"), thermostat("C2")]),
        ])
    }

    fn names(structures: &[Structure]) -> Vec<&str> {
        structures.iter().map(|s| s.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_allow_list_filters_in_source_order() {
        let client = Arc::new(three_structures());
        let mut device =
            NestWebDevice::new(client, Some(vec!["C".to_string(), "A".to_string()]));
        assert!(device.initialize().await);

        assert_eq!(names(&device.structures().await), vec!["A", "C"]);

        let serials: Vec<_> = device
            .thermostats()
            .await
            .into_iter()
            .map(|(s, d)| (s.name, d.serial))
            .collect();
        assert_eq!(
            serials,
            vec![
                ("A".to_string(), "A1".to_string()),
                ("C".to_string(), "C1".to_string()),
                ("C".to_string(), "C2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_unset_allow_list_is_resolved_once() {
        let client = Arc::new(three_structures());
        let mut device = NestWebDevice::new(client.clone(), None);
        assert!(device.initialize().await);

        let expected: BTreeSet<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        assert_eq!(device.local_structure(), Some(&expected));

        client
            .structures
            .lock()
            .unwrap()
            .push((structure("d", "D", false), vec![thermostat("D1")]));

        assert_eq!(names(&device.structures().await), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_initialize_fails_when_unreachable() {
        let client = Arc::new(three_structures());
        *client.unavailable.lock().unwrap() = true;

        let mut device = NestWebDevice::new(client, None);
        assert!(!device.initialize().await);
        assert!(device.local_structure().is_none());
        assert!(device.structures().await.is_empty());
    }

    #[tokio::test]
    async fn test_thermostats_stop_at_first_failure() {
        let client = Arc::new(three_structures());
        client.failing.lock().unwrap().push("b".to_string());

        let mut device = NestWebDevice::new(client, None);
        assert!(device.initialize().await);

        let serials: Vec<_> = device
            .thermostats()
            .await
            .into_iter()
            .map(|(_, d)| d.serial)
            .collect();
        assert_eq!(serials, vec!["A1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_service_keeps_previous_snapshot() {
        let client = Arc::new(three_structures());
        let mut device = NestWebDevice::new(client.clone(), None);
        assert!(device.initialize().await);

        let coordinator = RefreshCoordinator::new(device, RefreshSettings::from_secs("nest", 30, 180));
        coordinator.refresh().await;
        assert_eq!(coordinator.latest_data().unwrap().len(), 4);

        *client.unavailable.lock().unwrap() = true;
        tokio::time::advance(std::time::Duration::from_secs(31)).await;
        assert!(coordinator.maybe_refresh().await);
        assert_eq!(coordinator.latest_data().unwrap().len(), 4);
        assert!(!coordinator.needs_refresh());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_structure_keeps_previous_snapshot() {
        let client = Arc::new(three_structures());
        let mut device = NestWebDevice::new(client.clone(), None);
        assert!(device.initialize().await);

        let coordinator = RefreshCoordinator::new(device, RefreshSettings::from_secs("nest", 30, 180));
        coordinator.refresh().await;
        let before = coordinator.latest_data().unwrap();
        assert_eq!(before.len(), 4);
        assert_eq!(coordinator.generation(), 1);

        client.failing.lock().unwrap().push("b".to_string());
        tokio::time::advance(std::time::Duration::from_secs(31)).await;
        assert!(coordinator.maybe_refresh().await);

        let after = coordinator.latest_data().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(coordinator.generation(), 1);
        assert_eq!(coordinator.status().failures, 1);
    }

    #[tokio::test]
    async fn test_try_thermostats_fails_on_any_error() {
        let client = Arc::new(three_structures());
        let mut device = NestWebDevice::new(client.clone(), None);
        assert!(device.initialize().await);
        assert_eq!(device.try_thermostats().await.unwrap().len(), 4);

        client.failing.lock().unwrap().push("c".to_string());
        assert!(device.try_thermostats().await.is_err());
        assert_eq!(device.thermostats().await.len(), 2);
    }
}
