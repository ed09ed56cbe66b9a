//! HTTP client for the host endpoints of the command relay.
//!
//! - `GET /hosts/{id}` → `{state, availability_zone, private_ip}`, 404 when unknown
//! - `POST /hosts/{id}/start`, `POST /hosts/{id}/stop`
//! - `GET /networks/{id}/endpoints` → `{services: [...]}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::ExecutorConfig;
use crate::error::{ControlError, ControlResult};

use super::{HostController, HostDetails};

#[derive(Deserialize)]
struct EndpointsResponse {
    #[serde(default)]
    services: Vec<String>,
}

/// Host controller backed by the command relay.
#[derive(Debug, Clone)]
pub struct RelayHosts {
    client: Client,
    base_url: String,
}

impl RelayHosts {
    /// Create a new relay client from configuration.
    pub fn new(config: &ExecutorConfig) -> ControlResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ControlError::Http)?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_owned(),
        })
    }

    async fn power(&self, host_id: &str, action: &str) -> ControlResult<()> {
        let url = format!("{}/hosts/{host_id}/{action}", self.base_url);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(ControlError::Http)?;

        if !response.status().is_success() {
            return Err(ControlError::executor(format!(
                "failed to {action} host {host_id}: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl HostController for RelayHosts {
    async fn describe(&self, host_id: &str) -> ControlResult<Option<HostDetails>> {
        let url = format!("{}/hosts/{host_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ControlError::Http)?;

        match response.status() {
            StatusCode::OK => response.json().await.map(Some).map_err(ControlError::Http),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(ControlError::executor(format!(
                "failed to describe host {host_id}: {status}"
            ))),
        }
    }

    async fn endpoint_services(&self, network_id: &str) -> ControlResult<Vec<String>> {
        let url = format!("{}/networks/{network_id}/endpoints", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ControlError::Http)?;

        if !response.status().is_success() {
            return Err(ControlError::executor(format!(
                "failed to list endpoints of {network_id}: {}",
                response.status()
            )));
        }

        let body: EndpointsResponse = response.json().await.map_err(ControlError::Http)?;
        Ok(body.services)
    }

    async fn start(&self, host_id: &str) -> ControlResult<()> {
        self.power(host_id, "start").await
    }

    async fn stop(&self, host_id: &str) -> ControlResult<()> {
        self.power(host_id, "stop").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_details_tolerate_missing_fields() {
        let details: HostDetails =
            serde_json::from_str(r#"{"state": "stopped"}"#).expect("deserialise");
        assert_eq!(details.state, "stopped");
        assert!(details.private_ip.is_none());
    }

    #[tokio::test]
    async fn unreachable_relay_is_an_http_error() {
        let config = ExecutorConfig {
            url: "http://127.0.0.1:1/".to_owned(),
            timeout_secs: 1,
            ..ExecutorConfig::default()
        };
        let hosts = RelayHosts::new(&config).expect("client");
        assert_eq!(hosts.base_url, "http://127.0.0.1:1");
        assert!(matches!(
            hosts.describe("i-0abc").await,
            Err(ControlError::Http(_))
        ));
    }
}
