//! Raspberry Pi sensor endpoint
//!
//! The Pi serves its latest DHT22 reading as JSON at `GET {net_loc}/read`.
//! The whole document becomes the coordinator snapshot.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::refresh::{Fetch, RefreshCoordinator};

/// Default refresh interval for the sensor in seconds
pub const DEFAULT_REFRESH_INTERVAL: u64 = 30;

pub type RpiCoordinator = RefreshCoordinator<RaspberryPiDevice>;

#[derive(Clone)]
struct Connection {
    client: Client,
    read_url: Url,
}

pub struct RaspberryPiDevice {
    net_loc: Option<String>,
    timeout: Duration,
    host: String,
    connection: Mutex<Option<Connection>>,
}

impl RaspberryPiDevice {
    pub fn new(net_loc: Option<String>, timeout: Duration) -> Self {
        Self {
            net_loc,
            timeout,
            host: String::new(),
            connection: Mutex::new(None),
        }
    }

    /// Validate the configuration and build the HTTP client.
    ///
    /// Returns `false` when `net_loc` is missing or unusable.
    pub fn initialize(&mut self) -> bool {
        log::info!("Beginning RaspberryPiDevice.initialize");
        let Some(net_loc) = self.net_loc.as_deref() else {
            log::warn!("{}", Error::MissingConfig("net_loc"));
            return false;
        };

        match self.connect(net_loc) {
            Ok(connection) => {
                self.host = host_label(&connection.read_url);
                *self.lock_connection() = Some(connection);
                log::info!("Finished RaspberryPiDevice.initialize for {}", self.host);
                true
            }
            Err(err) => {
                log::warn!("{err}");
                false
            }
        }
    }

    fn connect(&self, net_loc: &str) -> Result<Connection> {
        let base_url = parse_net_loc(net_loc)?;
        let read_url = base_url.join("read").map_err(|err| Error::InvalidConfig {
            key: "net_loc",
            reason: err.to_string(),
        })?;

        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(format!("nestweb/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Client)?;

        Ok(Connection { client, read_url })
    }

    /// `host[:port]` of the sensor, empty before initialization
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_open(&self) -> bool {
        self.lock_connection().is_some()
    }

    /// Release the HTTP client. Calling it again is a no-op.
    pub fn aclose(&self) {
        if self.lock_connection().take().is_some() {
            log::debug!("Closed connection to {}", self.host);
        }
    }

    fn lock_connection(&self) -> std::sync::MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Fetch for RaspberryPiDevice {
    type Output = Value;

    fn describe(&self) -> String {
        format!("rpi_sensor ({})", self.host)
    }

    async fn fetch(&self) -> Result<Value> {
        let connection = self
            .lock_connection()
            .clone()
            .ok_or_else(|| Error::Closed(self.host.clone()))?;
        let url = connection.read_url.as_str();
        log::debug!("GET {}", url);

        let response = connection
            .client
            .get(connection.read_url.clone())
            .send()
            .await
            .map_err(|err| Error::transport(url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status,
                url: url.to_string(),
            });
        }

        response
            .json()
            .await
            .map_err(|err| Error::transport(url, err))
    }
}

/// Accepts `host:port` as well as a full URL
fn parse_net_loc(net_loc: &str) -> Result<Url> {
    let net_loc = net_loc.trim();
    let with_scheme = if net_loc.contains("://") {
        net_loc.to_string()
    } else {
        format!("http://{net_loc}")
    };

    let mut url = Url::parse(&with_scheme).map_err(|err| Error::InvalidConfig {
        key: "net_loc",
        reason: err.to_string(),
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn host_label(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::RefreshSettings;
    use futures_util::future::join_all;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn device_for(server: &MockServer) -> RaspberryPiDevice {
        let mut device = RaspberryPiDevice::new(
            Some(server.address().to_string()),
            Duration::from_secs(5),
        );
        assert!(device.initialize());
        device
    }

    #[test]
    fn test_parse_net_loc() {
        assert_eq!(
            parse_net_loc("pi.local:8080").unwrap().as_str(),
            "http://pi.local:8080/"
        );
        assert_eq!(
            parse_net_loc("https://pi.local/sensor").unwrap().as_str(),
            "https://pi.local/sensor/"
        );
        assert!(parse_net_loc("http://").is_err());
    }

    #[test]
    fn test_initialize_requires_net_loc() {
        let mut device = RaspberryPiDevice::new(None, Duration::from_secs(5));
        assert!(!device.initialize());
        assert!(!device.is_open());
    }

    #[test]
    fn test_initialize_sets_host() {
        let mut device =
            RaspberryPiDevice::new(Some("192.168.0.20:8000".to_string()), Duration::from_secs(5));
        assert!(device.initialize());
        assert_eq!(device.host(), "192.168.0.20:8000");
        assert!(device.is_open());
    }

    #[tokio::test]
    async fn test_fetch_reads_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/read"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"temperature": 21.5, "humidity": 0.43})),
            )
            .mount(&server)
            .await;

        let data = device_for(&server).fetch().await.unwrap();
        assert_eq!(data["temperature"], 21.5);
        assert_eq!(data["humidity"], 0.43);
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/read"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = device_for(&server).fetch().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_aclose_is_idempotent() {
        let server = MockServer::start().await;
        let device = device_for(&server);

        device.aclose();
        device.aclose();
        assert!(!device.is_open());
        assert!(matches!(device.fetch().await, Err(Error::Closed(_))));
    }

    #[tokio::test]
    async fn test_polling_entities_share_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/read"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"temperature": 22.25, "humidity": 0.5}))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let coordinator = RpiCoordinator::new(
            device_for(&server),
            RefreshSettings::from_secs("rpi_sensor", DEFAULT_REFRESH_INTERVAL, DEFAULT_REFRESH_INTERVAL),
        );

        let refreshed = join_all((0..6).map(|_| coordinator.maybe_refresh())).await;
        assert!(refreshed.iter().all(|r| *r));
        assert!(!coordinator.maybe_refresh().await);
        assert_eq!(coordinator.latest_data().unwrap()["temperature"], 22.25);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_snapshot() {
        let server = MockServer::start().await;
        let coordinator = RpiCoordinator::new(
            device_for(&server),
            RefreshSettings::from_secs("rpi_sensor", 30, 30),
        );

        // Nothing mounted: wiremock answers 404.
        coordinator.refresh().await;
        assert!(coordinator.latest_data().is_none());
        assert!(!coordinator.needs_refresh());
        assert_eq!(coordinator.status().failures, 1);
    }
}
