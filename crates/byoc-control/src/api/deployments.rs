//! Deployment management endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ControlError;
use crate::store::DeploymentFilter;
use crate::types::{DeploymentRecord, DeploymentStatus};

use super::{api_error, target_from_path, tenant_from_path, ApiError, AppState};

/// Request to deploy a tenant environment.
#[derive(Debug, Deserialize)]
pub struct DeployRequest {
    /// Environment name.
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_environment() -> String {
    "prod".to_owned()
}

/// Request to destroy a tenant environment.
#[derive(Debug, Default, Deserialize)]
pub struct DestroyRequest {
    /// Must be true.
    #[serde(default)]
    pub confirm: bool,
}

/// Query parameters for listing deployments.
#[derive(Debug, Default, Deserialize)]
pub struct ListDeploymentsQuery {
    /// Filter by status.
    pub status: Option<String>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
}

/// Response for an accepted deploy or destroy.
#[derive(Debug, Serialize)]
pub struct DeploymentAccepted {
    /// Tenant.
    pub tenant_id: String,
    /// Environment.
    pub environment: String,
    /// Stack identifier.
    pub stack_name: String,
    /// Status after the request.
    pub status: DeploymentStatus,
    /// Human-readable summary.
    pub message: String,
}

impl DeploymentAccepted {
    fn new(record: &DeploymentRecord, message: String) -> Self {
        Self {
            tenant_id: record.tenant_id.to_string(),
            environment: record.environment.clone(),
            stack_name: record.stack_name.to_string(),
            status: record.status,
            message,
        }
    }
}

/// Create or redeploy a tenant environment.
pub async fn deploy(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(request): Json<DeployRequest>,
) -> Result<(StatusCode, Json<DeploymentAccepted>), ApiError> {
    let tenant = target_from_path(tenant, &request.environment)?;
    info!(tenant = %tenant, environment = %request.environment, "deploying via API");

    let record = state
        .orchestrator
        .deploy(&tenant, &request.environment)
        .await
        .map_err(api_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DeploymentAccepted::new(
            &record,
            format!("Deployment of {} started", record.stack_name),
        )),
    ))
}

/// List a tenant's deployments.
pub async fn list_deployments(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<ListDeploymentsQuery>,
) -> Result<Json<Vec<DeploymentRecord>>, ApiError> {
    let tenant = tenant_from_path(tenant)?;
    let mut filter = DeploymentFilter::new();
    if let Some(ref status) = query.status {
        let status = status.parse::<DeploymentStatus>().map_err(|e| {
            api_error(ControlError::Validation(byoc_config::Violations::from(vec![
                byoc_config::Violation::new("status", e),
            ])))
        })?;
        filter = filter.with_status(status);
    }
    if let Some(limit) = query.limit {
        filter = filter.with_limit(limit);
    }
    if let Some(offset) = query.offset {
        filter = filter.with_offset(offset);
    }

    let records = state
        .orchestrator
        .list(&tenant, filter)
        .await
        .map_err(api_error)?;
    Ok(Json(records))
}

/// Get a deployment, refreshed from the engine when a run is outstanding.
pub async fn deployment_status(
    State(state): State<AppState>,
    Path((tenant, environment)): Path<(String, String)>,
) -> Result<Json<DeploymentRecord>, ApiError> {
    let tenant = target_from_path(tenant, &environment)?;
    let record = state
        .orchestrator
        .status(&tenant, &environment)
        .await
        .map_err(api_error)?;
    Ok(Json(record))
}

/// Destroy a tenant environment.
pub async fn destroy(
    State(state): State<AppState>,
    Path((tenant, environment)): Path<(String, String)>,
    Json(request): Json<DestroyRequest>,
) -> Result<(StatusCode, Json<DeploymentAccepted>), ApiError> {
    let tenant = target_from_path(tenant, &environment)?;
    info!(tenant = %tenant, environment = %environment, "destroying via API");

    let record = state
        .orchestrator
        .destroy(&tenant, &environment, request.confirm)
        .await
        .map_err(api_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DeploymentAccepted::new(
            &record,
            format!("Destroy of {} started", record.stack_name),
        )),
    ))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{app, body_json, json_request, router, TestApp};
    use crate::deployment::EngineEvent;
    use crate::store::ConfigStore;
    use crate::types::Operation;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use byoc_config::{resolve, ConfigInput};
    use serde_json::json;
    use tower::ServiceExt;

    async fn with_config(app: &TestApp) {
        let config = resolve(&ConfigInput::new(
            "acme",
            "arn:aws:iam::123456789012:role/byoc",
            "external-1234",
        ))
        .expect("resolve");
        app.state.configs.save(&config).await.expect("save failed");
    }

    #[tokio::test]
    async fn deploy_is_accepted_then_conflicts() {
        let app = app(None);
        with_config(&app).await;

        let response = router(&app)
            .oneshot(json_request("POST", "/api/v1/deployments/acme", &json!({})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["stack_name"], "acme-prod");
        assert_eq!(body["status"], "PENDING");

        app.state.orchestrator.tasks().drain().await;
        assert_eq!(app.engine.triggered(Operation::Update), 1);

        let response = router(&app)
            .oneshot(json_request(
                "POST",
                "/api/v1/deployments/acme",
                &json!({"environment": "prod"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn stack_name_held_by_another_tenant_conflicts() {
        let app = app(None);
        with_config(&app).await;
        let other = resolve(&ConfigInput::new(
            "acme-a",
            "arn:aws:iam::210987654321:role/byoc",
            "external-5678",
        ))
        .expect("resolve");
        app.state.configs.save(&other).await.expect("save failed");

        let response = router(&app)
            .oneshot(json_request(
                "POST",
                "/api/v1/deployments/acme-a",
                &json!({"environment": "b-prod"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        app.state.orchestrator.tasks().drain().await;

        // acme + a-b-prod names the same stack as acme-a + b-prod.
        let response = router(&app)
            .oneshot(json_request(
                "POST",
                "/api/v1/deployments/acme",
                &json!({"environment": "a-b-prod"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = router(&app)
            .oneshot(json_request(
                "POST",
                "/api/v1/deployments/acme/a-b-prod/destroy",
                &json!({"confirm": true}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = router(&app)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/deployments/acme-a/b-prod/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let body = body_json(response).await;
        assert_eq!(body["tenant_id"], "acme-a");
        assert_eq!(body["status"], "IN_PROGRESS");
        assert_eq!(app.engine.triggered(Operation::Update), 1);
        assert_eq!(app.engine.triggered(Operation::Destroy), 0);
    }

    #[tokio::test]
    async fn deploy_rejects_malformed_environment() {
        let app = app(None);
        with_config(&app).await;
        let response = router(&app)
            .oneshot(json_request(
                "POST",
                "/api/v1/deployments/acme",
                &json!({"environment": "Prod Env"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["details"][0]["field"], "environment");
        app.state.orchestrator.tasks().drain().await;
        assert_eq!(app.engine.triggered(Operation::Update), 0);
    }

    #[tokio::test]
    async fn deploy_unknown_tenant_is_not_found() {
        let app = app(None);
        let response = router(&app)
            .oneshot(json_request("POST", "/api/v1/deployments/globex", &json!({})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn destroy_needs_confirmation() {
        let app = app(None);
        with_config(&app).await;
        router(&app)
            .oneshot(json_request("POST", "/api/v1/deployments/acme", &json!({})))
            .await
            .expect("response");
        app.state.orchestrator.tasks().drain().await;
        app.state
            .orchestrator
            .handle_event(&EngineEvent {
                stack: "acme-prod".to_owned(),
                operation: "update".to_owned(),
                status: "succeeded".to_owned(),
                message: None,
            })
            .await;
        app.state.orchestrator.tasks().drain().await;

        let response = router(&app)
            .oneshot(json_request(
                "POST",
                "/api/v1/deployments/acme/prod/destroy",
                &json!({}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router(&app)
            .oneshot(json_request(
                "POST",
                "/api/v1/deployments/acme/prod/destroy",
                &json!({"confirm": true}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "DESTROYING");
    }

    #[tokio::test]
    async fn status_and_list() {
        let app = app(None);
        with_config(&app).await;
        router(&app)
            .oneshot(json_request("POST", "/api/v1/deployments/acme", &json!({})))
            .await
            .expect("response");
        app.state.orchestrator.tasks().drain().await;

        let response = router(&app)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/deployments/acme/prod/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "IN_PROGRESS");
        assert_eq!(body["run_id"], "run-1");

        let response = router(&app)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/deployments/acme?status=in_progress")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let body = body_json(response).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));

        let response = router(&app)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/deployments/acme?status=bogus")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router(&app)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/deployments/acme/staging/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
