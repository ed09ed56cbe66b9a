//! Common test utilities for control plane integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use byoc_config::model::{AccessInput, AccessNodeInput, AddonsInput, ArgoCdInput, ClusterInput};
use byoc_config::{resolve_validated, ConfigInput};
use byoc_control::api::{self, WebhookVerifier, SIGNATURE_HEADER};
use byoc_control::config::{ControlConfig, UnsignedPolicy};
use byoc_control::{
    Components, ConfigStore, DeploymentRecord, DeploymentStore, EngineEvent, MemoryStore,
    MockEngine, MockExecutor, MockHosts, StackName, Stores, TenantId,
};
use http_body_util::BodyExt;

pub const TENANT: &str = "acme";
pub const ENVIRONMENT: &str = "prod";
pub const SECRET: &str = "webhook-secret";

/// Complete control plane wired with in-memory collaborators.
pub struct TestControl {
    pub store: Arc<MemoryStore>,
    pub engine: Arc<MockEngine>,
    pub executor: Arc<MockExecutor>,
    pub hosts: Arc<MockHosts>,
    pub components: Components,
}

impl TestControl {
    /// Creates a control plane with a webhook secret and no settling delay.
    pub fn new() -> Self {
        let mut config = ControlConfig::default();
        config.webhook.secret = Some(SECRET.to_owned());
        config.webhook.unsigned = UnsignedPolicy::Reject;
        config.addons.settle_delay_secs = 0;
        Self::with_config(&config)
    }

    /// Creates a control plane from a configuration.
    pub fn with_config(config: &ControlConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(MockEngine::new());
        let executor = Arc::new(MockExecutor::new());
        let hosts = Arc::new(MockHosts::new());
        let components = Components::build(
            config,
            Stores::shared(Arc::clone(&store)),
            engine.clone(),
            executor.clone(),
            hosts.clone(),
        );

        Self {
            store,
            engine,
            executor,
            hosts,
            components,
        }
    }

    pub fn tenant(&self) -> TenantId {
        TenantId::new(TENANT)
    }

    pub fn stack(&self) -> StackName {
        StackName::new(&self.tenant(), ENVIRONMENT)
    }

    pub fn router(&self) -> Router {
        api::router(self.components.state.clone(), Duration::from_secs(30))
    }

    /// Resolve and store a configuration with the access node and GitOps
    /// controller enabled.
    pub async fn store_config(&self) {
        let config = resolve_validated(&full_input()).expect("valid configuration");
        ConfigStore::save(self.store.as_ref(), &config)
            .await
            .expect("save failed");
    }

    /// Script the outputs a finished update reports.
    pub fn script_outputs(&self) {
        self.engine.set_outputs(serde_json::json!({
            "access_node_instance_id": "i-0abc123",
            "eks_cluster_name": "acme-prod",
            "vpc_id": "vpc-0123",
        }));
    }

    pub async fn record(&self) -> DeploymentRecord {
        DeploymentStore::get(self.store.as_ref(), &self.stack())
            .await
            .expect("get failed")
            .expect("deployment record")
    }

    pub async fn settle(&self) {
        self.components.orchestrator.tasks().drain().await;
    }

    /// Deploy and let the dispatch task run.
    pub async fn deploy_and_dispatch(&self) -> DeploymentRecord {
        self.components
            .orchestrator
            .deploy(&self.tenant(), ENVIRONMENT)
            .await
            .expect("deploy failed");
        self.settle().await;
        self.record().await
    }
}

impl Default for TestControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Input with every optional feature this crate acts on.
pub fn full_input() -> ConfigInput {
    let mut input = ConfigInput::new(
        TENANT,
        "arn:aws:iam::123456789012:role/byoc",
        "external-1234",
    );
    input.cluster = Some(ClusterInput {
        access: Some(AccessInput {
            access_node: Some(AccessNodeInput {
                enabled: Some(true),
                instance_type: None,
            }),
            ..AccessInput::default()
        }),
        ..ClusterInput::default()
    });
    input.addons = Some(AddonsInput {
        argocd: Some(ArgoCdInput {
            enabled: Some(true),
            ..ArgoCdInput::default()
        }),
    });
    input
}

pub fn event(operation: &str, status: &str, message: Option<&str>) -> EngineEvent {
    EngineEvent {
        stack: format!("byoc/byoc-infra/{TENANT}-{ENVIRONMENT}"),
        operation: operation.to_owned(),
        status: status.to_owned(),
        message: message.map(str::to_owned),
    }
}

/// A signed webhook request.
pub fn signed_webhook(event: &EngineEvent) -> Request<Body> {
    let body = serde_json::to_vec(event).expect("serialise event");
    let signature = format!("sha256={}", WebhookVerifier::sign(SECRET, &body));
    Request::builder()
        .method("POST")
        .uri("/api/v1/webhooks/deployment")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(body))
        .expect("request")
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}
