//! HTTP client for a command relay.
//!
//! The relay fronts the cloud provider's run-command service in the tenant
//! account. It exposes three endpoints:
//!
//! - `POST /commands` `{host_id, script, timeout_secs, comment}` → `{command_id}`
//! - `GET /commands/{id}?host_id=` → `{status, output, error}`, 404 when unknown
//! - `POST /parameters` `{name, value, secure}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::ExecutorConfig;
use crate::error::{ControlError, ControlResult};

use super::{CommandInvocation, CommandPayload, RemoteExecutor};

#[derive(Serialize)]
struct SubmitRequest<'a> {
    host_id: &'a str,
    #[serde(flatten)]
    payload: &'a CommandPayload,
}

#[derive(Deserialize)]
struct SubmitResponse {
    command_id: String,
}

#[derive(Serialize)]
struct ParameterRequest<'a> {
    name: &'a str,
    value: &'a str,
    secure: bool,
}

/// Executor that forwards commands to an HTTP relay.
#[derive(Debug, Clone)]
pub struct RelayExecutor {
    client: Client,
    base_url: String,
}

impl RelayExecutor {
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
}

#[async_trait]
impl RemoteExecutor for RelayExecutor {
    async fn submit(&self, host_id: &str, payload: &CommandPayload) -> ControlResult<String> {
        let url = format!("{}/commands", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SubmitRequest { host_id, payload })
            .send()
            .await
            .map_err(ControlError::Http)?;

        if !response.status().is_success() {
            return Err(ControlError::executor(format!(
                "failed to submit command to {host_id}: {}",
                response.status()
            )));
        }

        let body: SubmitResponse = response.json().await.map_err(ControlError::Http)?;
        Ok(body.command_id)
    }

    async fn query(
        &self,
        command_id: &str,
        host_id: &str,
    ) -> ControlResult<Option<CommandInvocation>> {
        let url = format!("{}/commands/{command_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("host_id", host_id)])
            .send()
            .await
            .map_err(ControlError::Http)?;

        match response.status() {
            StatusCode::OK => response.json().await.map(Some).map_err(ControlError::Http),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(ControlError::executor(format!(
                "failed to get command {command_id}: {status}"
            ))),
        }
    }

    async fn put_parameter(&self, name: &str, value: &str, secure: bool) -> ControlResult<()> {
        let url = format!("{}/parameters", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ParameterRequest {
                name,
                value,
                secure,
            })
            .send()
            .await
            .map_err(ControlError::Http)?;

        if !response.status().is_success() {
            return Err(ControlError::executor(format!(
                "failed to store parameter {name}: {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalised() {
        let config = ExecutorConfig {
            url: "http://relay.internal:8090/".to_owned(),
            ..ExecutorConfig::default()
        };
        let executor = RelayExecutor::new(&config).expect("client");
        assert_eq!(executor.base_url, "http://relay.internal:8090");
    }

    #[test]
    fn submit_body_is_flat() {
        let payload = CommandPayload {
            script: "echo ok".to_owned(),
            timeout_secs: 600,
            comment: "Install argocd for acme-prod".to_owned(),
        };
        let body = serde_json::to_value(SubmitRequest {
            host_id: "i-0abc",
            payload: &payload,
        })
        .expect("serialise");
        assert_eq!(body["host_id"], "i-0abc");
        assert_eq!(body["timeout_secs"], 600);
        assert_eq!(body["script"], "echo ok");
    }

    #[tokio::test]
    async fn unreachable_relay_is_an_http_error() {
        let config = ExecutorConfig {
            url: "http://127.0.0.1:1".to_owned(),
            timeout_secs: 1,
            ..ExecutorConfig::default()
        };
        let executor = RelayExecutor::new(&config).expect("client");
        let result = executor.query("cmd-1", "i-0abc").await;
        assert!(matches!(result, Err(ControlError::Http(_))));
    }
}
