//! HTTP implementation of [`NestClient`]
//!
//! Talks to a JSON gateway in front of the Nest web service. Session handling
//! is the gateway's business; an optional pre-issued bearer token is sent
//! with every request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::{NestClient, NestMode, Structure, ThermostatDevice};
use crate::error::{Error, Result};

pub struct HttpNestClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpNestClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
        insecure: bool,
    ) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|err| Error::InvalidConfig {
            key: "nest.base_url",
            reason: err.to_string(),
        })?;

        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(format!("nestweb/{}", env!("CARGO_PKG_VERSION")));

        if insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build().map_err(Error::Client)?,
            base_url,
            token,
        })
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.url(segments);
        log::debug!("GET {}", url);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|err| Error::transport(&url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status { status, url });
        }

        response
            .json()
            .await
            .map_err(|err| Error::transport(&url, err))
    }

    async fn put(&self, segments: &[&str], body: &Value) -> Result<()> {
        let url = self.url(segments);
        log::debug!("PUT {} {}", url, body);

        let response = self
            .authorize(self.client.put(&url))
            .json(body)
            .send()
            .await
            .map_err(|err| Error::transport(&url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status { status, url });
        }
        Ok(())
    }
}

#[async_trait]
impl NestClient for HttpNestClient {
    fn describe(&self) -> String {
        self.base_url.clone()
    }

    async fn structures(&self) -> Result<Vec<Structure>> {
        self.get(&["structures"]).await
    }

    async fn thermostats(&self, structure: &Structure) -> Result<Vec<ThermostatDevice>> {
        self.get(&["structures", &structure.id, "thermostats"]).await
    }

    async fn set_away(&self, structure: &Structure, away: bool) -> Result<()> {
        self.put(&["structures", &structure.id, "away"], &json!({ "away": away }))
            .await
    }

    async fn set_temp(&self, device: &ThermostatDevice, temperature: f64) -> Result<()> {
        self.put(
            &["devices", &device.serial, "shared"],
            &json!({ "target_temperature": temperature }),
        )
        .await
    }

    async fn set_temp_range(&self, device: &ThermostatDevice, low: f64, high: f64) -> Result<()> {
        self.put(
            &["devices", &device.serial, "shared"],
            &json!({ "target_temperature_low": low, "target_temperature_high": high }),
        )
        .await
    }

    async fn set_mode(&self, device: &ThermostatDevice, mode: NestMode) -> Result<()> {
        self.put(
            &["devices", &device.serial, "shared"],
            &json!({ "target_temperature_type": mode }),
        )
        .await
    }

    async fn start_fan(&self, device: &ThermostatDevice) -> Result<()> {
        self.put(&["devices", &device.serial, "fan"], &json!({ "fan": true }))
            .await
    }

    async fn stop_fan(&self, device: &ThermostatDevice) -> Result<()> {
        self.put(&["devices", &device.serial, "fan"], &json!({ "fan": false }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nest::testing::thermostat;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, token: Option<&str>) -> HttpNestClient {
        HttpNestClient::new(
            &server.uri(),
            token.map(str::to_string),
            Duration::from_secs(5),
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let err = HttpNestClient::new("not a url", None, Duration::from_secs(5), false)
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidConfig { key: "nest.base_url", .. }));
    }

    #[tokio::test]
    async fn test_structures_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/structures"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "s1", "name": "Home", "away": false},
                {"id": "s2", "name": "Cabin", "away": true}
            ])))
            .mount(&server)
            .await;

        let structures = client(&server, Some("secret")).structures().await.unwrap();
        assert_eq!(structures.len(), 2);
        assert_eq!(structures[1].name, "Cabin");
        assert!(structures[1].away);
    }

    #[tokio::test]
    async fn test_thermostats_escapes_structure_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/structures/structure.a%2Fb/thermostats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let structure = Structure {
            id: "structure.a/b".to_string(),
            name: "Home".to_string(),
            away: false,
        };
        let devices = client(&server, None).thermostats(&structure).await.unwrap();
        assert!(devices.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/structures"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server, None).structures().await.unwrap_err();
        assert!(err.is_transport());
        assert!(matches!(err, Error::Status { status, .. } if status.as_u16() == 503));
    }

    #[tokio::test]
    async fn test_set_temp_range_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/devices/09AA01AC/shared"))
            .and(body_json(json!({
                "target_temperature_low": 19.5,
                "target_temperature_high": 23.0
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server, None)
            .set_temp_range(&thermostat("09AA01AC"), 19.5, 23.0)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_mode_serializes_lowercase() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/devices/09AA01AC/shared"))
            .and(body_json(json!({ "target_temperature_type": "range" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server, None)
            .set_mode(&thermostat("09AA01AC"), NestMode::Range)
            .await
            .unwrap();
    }
}
