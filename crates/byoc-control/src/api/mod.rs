//! HTTP API for the control service.
//!
//! Provides endpoints for:
//! - Tenant configuration management and dry-run validation
//! - Deployment lifecycle (deploy, status, list, destroy)
//! - Engine completion webhooks
//! - Cluster addon installs
//! - Access node status, sessions and power
//! - Health and readiness checks
//! - Prometheus metrics

mod access;
mod addons;
mod configs;
mod deployments;
mod webhooks;

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use byoc_config::{validate_identifier, Violations};
use serde::Serialize;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::access::AccessNodes;
use crate::addons::AddonInstaller;
use crate::deployment::DeploymentOrchestrator;
use crate::error::ControlError;
use crate::store::{ConfigStore, DeploymentFilter, DeploymentStore};
use crate::types::{DeploymentStatus, TenantId};

pub use configs::ValidateResponse;
pub use deployments::{DeployRequest, DeploymentAccepted, DestroyRequest, ListDeploymentsQuery};
pub use webhooks::{WebhookResponse, WebhookVerifier, SIGNATURE_HEADER};

/// Shared application state for the control service.
#[derive(Clone)]
pub struct AppState {
    /// Deployment lifecycle.
    pub orchestrator: DeploymentOrchestrator,
    /// Addon installs.
    pub installer: Arc<AddonInstaller>,
    /// Access node operations.
    pub access: Arc<AccessNodes>,
    /// Resolved tenant configurations.
    pub configs: Arc<dyn ConfigStore>,
    /// Deployment records for direct queries.
    pub deployments: Arc<dyn DeploymentStore>,
    /// Webhook signature policy.
    pub webhook: Arc<WebhookVerifier>,
}

/// Creates the API router.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let api = Router::new()
        // Configurations
        .route(
            "/configs",
            post(configs::create_config).get(configs::list_configs),
        )
        .route("/configs/validate", post(configs::validate_config))
        .route(
            "/configs/{tenant}",
            get(configs::get_config)
                .put(configs::update_config)
                .delete(configs::delete_config),
        )
        // Deployments
        .route(
            "/deployments/{tenant}",
            post(deployments::deploy).get(deployments::list_deployments),
        )
        .route(
            "/deployments/{tenant}/{environment}/status",
            get(deployments::deployment_status),
        )
        .route(
            "/deployments/{tenant}/{environment}/destroy",
            post(deployments::destroy),
        )
        // Webhooks
        .route(
            "/webhooks/deployment",
            post(webhooks::deployment_webhook),
        )
        .route("/webhooks/health", get(webhooks::webhook_health))
        // Addons
        .route(
            "/clusters/{tenant}/{environment}/addons/install",
            post(addons::install_all),
        )
        .route(
            "/clusters/{tenant}/{environment}/addons/{addon}/install",
            post(addons::install_addon),
        )
        .route(
            "/clusters/{tenant}/{environment}/addons/{addon}/status",
            get(addons::addon_status),
        )
        // Access node
        .route(
            "/clusters/{tenant}/{environment}/access-node/status",
            get(access::access_status),
        )
        .route(
            "/clusters/{tenant}/{environment}/access-node/session",
            post(access::access_session),
        )
        .route(
            "/clusters/{tenant}/{environment}/access-node/start",
            post(access::start_access_node),
        )
        .route(
            "/clusters/{tenant}/{environment}/access-node/stop",
            post(access::stop_access_node),
        );

    Router::new()
        // Health endpoints
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Metrics
        .route("/metrics", get(metrics))
        .nest("/api/v1", api)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
    /// Every validation violation, when the request was invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Violations>,
}

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map an error onto its HTTP status.
#[must_use]
pub const fn error_to_status(error: &ControlError) -> StatusCode {
    match error {
        ControlError::Validation(_)
        | ControlError::ConfirmationRequired(_)
        | ControlError::Precondition(_) => StatusCode::BAD_REQUEST,
        ControlError::NotFound(_) => StatusCode::NOT_FOUND,
        ControlError::Conflict(_) => StatusCode::CONFLICT,
        ControlError::Engine(_) | ControlError::Executor(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn api_error(error: ControlError) -> ApiError {
    let status = error_to_status(&error);
    if status.is_server_error() {
        tracing::error!(error = %error, "request failed");
    }
    let body = match error {
        ControlError::Validation(violations) => ErrorResponse {
            error: "validation failed".to_owned(),
            details: Some(violations),
        },
        other => ErrorResponse {
            error: other.to_string(),
            details: None,
        },
    };
    (status, Json(body))
}

/// Check a tenant taken from the request path.
pub(crate) fn tenant_from_path(tenant: String) -> Result<TenantId, ApiError> {
    let violations = validate_identifier("tenant_id", "Tenant ID", &tenant);
    if violations.is_empty() {
        Ok(TenantId::new(tenant))
    } else {
        Err(api_error(ControlError::Validation(violations)))
    }
}

/// Check a tenant and environment taken from the request path.
pub(crate) fn target_from_path(
    tenant: String,
    environment: &str,
) -> Result<TenantId, ApiError> {
    let mut violations = validate_identifier("tenant_id", "Tenant ID", &tenant).into_inner();
    violations.extend(
        validate_identifier("environment", "Environment", environment).into_inner(),
    );
    if violations.is_empty() {
        Ok(TenantId::new(tenant))
    } else {
        Err(api_error(ControlError::Validation(Violations::from(violations))))
    }
}

/// Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// Readiness check endpoint.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let filter = DeploymentFilter::new().with_status(DeploymentStatus::InProgress);

    match state.deployments.list(&filter).await {
        Ok(deployments) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                deployments_in_progress: deployments.len(),
                background_tasks: state.orchestrator.tasks().len(),
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                deployments_in_progress: 0,
                background_tasks: state.orchestrator.tasks().len(),
            }),
        ),
    }
}

/// Metrics endpoint.
async fn metrics(State(state): State<AppState>) -> String {
    let mut output = String::new();

    output.push_str("# HELP byoc_deployments_total Number of deployments by status\n");
    output.push_str("# TYPE byoc_deployments_total gauge\n");

    for status in DeploymentStatus::ALL {
        let filter = DeploymentFilter::new().with_status(status);
        let count = state
            .deployments
            .list(&filter)
            .await
            .map(|d| d.len())
            .unwrap_or(0);
        let _ = writeln!(
            output,
            "byoc_deployments_total{{status=\"{}\"}} {count}",
            status.as_str().to_ascii_lowercase()
        );
    }

    output.push_str("# HELP byoc_background_tasks Background tasks still running\n");
    output.push_str("# TYPE byoc_background_tasks gauge\n");
    let _ = writeln!(
        output,
        "byoc_background_tasks {}",
        state.orchestrator.tasks().len()
    );

    output
}

/// Health response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Readiness response.
#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
    deployments_in_progress: usize,
    background_tasks: usize,
}


#[cfg(test)]
mod tests {
    use super::test_support::{app, router};
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint() {
        let response = router(&app(None))
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_endpoint() {
        let response = router(&app(None))
            .oneshot(
                Request::builder()
                    .uri("/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_list_every_status() {
        let response = router(&app(None))
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes();
        let text = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(text.contains("byoc_deployments_total{status=\"in_progress\"} 0"));
        assert!(text.contains("byoc_deployments_total{status=\"destroyed\"} 0"));
    }

    #[tokio::test]
    async fn malformed_path_identifiers_are_rejected() {
        for uri in [
            "/api/v1/deployments/acme/Prod_1/status",
            "/api/v1/deployments/a/prod/status",
            "/api/v1/clusters/acme/x/access-node/status",
            "/api/v1/clusters/acme/prod%20x/addons/argocd/status",
        ] {
            let response = router(&app(None))
                .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    struct StalledHosts;

    #[async_trait::async_trait]
    impl crate::hosts::HostController for StalledHosts {
        async fn describe(
            &self,
            _host_id: &str,
        ) -> crate::error::ControlResult<Option<crate::hosts::HostDetails>> {
            std::future::pending().await
        }

        async fn endpoint_services(
            &self,
            _network_id: &str,
        ) -> crate::error::ControlResult<Vec<String>> {
            std::future::pending().await
        }

        async fn start(&self, _host_id: &str) -> crate::error::ControlResult<()> {
            std::future::pending().await
        }

        async fn stop(&self, _host_id: &str) -> crate::error::ControlResult<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn slow_requests_time_out_with_408() {
        use crate::types::{DeploymentRecord, DeploymentStatus, StatusUpdate};
        use byoc_config::{resolve, ConfigInput};

        let app = app(None);
        let config = resolve(&ConfigInput::new(
            "acme",
            "arn:aws:iam::123456789012:role/byoc",
            "external-1234",
        ))
        .expect("resolve");
        let record = DeploymentRecord::new(&config, "prod");
        app.state
            .deployments
            .insert(&record)
            .await
            .expect("insert failed");
        app.state
            .deployments
            .transition(
                &record.stack_name,
                &[DeploymentStatus::Pending],
                StatusUpdate::to(DeploymentStatus::Succeeded)
                    .with_outputs(serde_json::json!({"access_node_instance_id": "i-0abc"})),
            )
            .await
            .expect("transition failed");

        let mut state = app.state.clone();
        state.access = Arc::new(AccessNodes::new(
            state.deployments.clone(),
            Arc::new(StalledHosts),
        ));
        let response = super::router(state, Duration::from_millis(20))
            .oneshot(
                Request::builder()
                    .uri("/api/v1/clusters/acme/prod/access-node/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn path_targets_report_every_violation() {
        let (status, Json(body)) =
            target_from_path("Acme".to_owned(), "p").expect_err("invalid target");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let details = body.details.expect("details");
        let fields: Vec<&str> = details.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["tenant_id", "environment"]);

        assert_eq!(
            target_from_path("acme".to_owned(), "prod").expect("valid target"),
            TenantId::new("acme")
        );
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            error_to_status(&ControlError::conflict("busy")),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_to_status(&ControlError::ConfirmationRequired("confirm".to_owned())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_to_status(&ControlError::engine("down")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            error_to_status(&ControlError::internal("oops")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
