//! Cluster addon endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::AddonInstallResult;

use super::{api_error, target_from_path, ApiError, AppState};

/// Query parameters for an addon status check.
#[derive(Debug, Default, Deserialize)]
pub struct AddonStatusQuery {
    /// Command to check; defaults to the latest dispatched one.
    pub command_id: Option<String>,
}

/// Response for installing every enabled addon.
#[derive(Debug, Serialize)]
pub struct InstallAllResponse {
    /// One entry per dispatched addon.
    pub addons: Vec<AddonInstallResult>,
}

/// Install every enabled addon.
pub async fn install_all(
    State(state): State<AppState>,
    Path((tenant, environment)): Path<(String, String)>,
) -> Result<(StatusCode, Json<InstallAllResponse>), ApiError> {
    let tenant = target_from_path(tenant, &environment)?;
    info!(tenant = %tenant, environment = %environment, "installing addons via API");

    let addons = state
        .installer
        .install_all(&tenant, &environment)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::ACCEPTED, Json(InstallAllResponse { addons })))
}

/// Install a single addon.
pub async fn install_addon(
    State(state): State<AppState>,
    Path((tenant, environment, addon)): Path<(String, String, String)>,
) -> Result<(StatusCode, Json<AddonInstallResult>), ApiError> {
    let tenant = target_from_path(tenant, &environment)?;
    info!(tenant = %tenant, environment = %environment, addon = %addon, "installing addon via API");

    let result = state
        .installer
        .install(&tenant, &environment, &addon)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::ACCEPTED, Json(result)))
}

/// Check an addon install.
pub async fn addon_status(
    State(state): State<AppState>,
    Path((tenant, environment, addon)): Path<(String, String, String)>,
    Query(query): Query<AddonStatusQuery>,
) -> Result<Json<AddonInstallResult>, ApiError> {
    let tenant = target_from_path(tenant, &environment)?;
    let result = state
        .installer
        .status(
            &tenant,
            &environment,
            &addon,
            query.command_id.as_deref().filter(|id| !id.is_empty()),
        )
        .await
        .map_err(api_error)?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{app, body_json, router, TestApp};
    use crate::deployment::EngineEvent;
    use crate::executor::CommandInvocation;
    use byoc_config::model::{AddonsInput, ArgoCdInput};
    use byoc_config::{resolve, ConfigInput};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn succeeded_deployment(app: &TestApp) {
        let mut input = ConfigInput::new(
            "acme",
            "arn:aws:iam::123456789012:role/byoc",
            "external-1234",
        );
        input.addons = Some(AddonsInput {
            argocd: Some(ArgoCdInput {
                enabled: Some(true),
                ..ArgoCdInput::default()
            }),
        });
        let config = resolve(&input).expect("resolve");
        app.state.configs.save(&config).await.expect("save failed");

        app.engine.set_outputs(serde_json::json!({
            "access_node_instance_id": "i-0abc",
            "eks_cluster_name": "acme-prod",
        }));
        let orchestrator = &app.state.orchestrator;
        orchestrator
            .deploy(&crate::types::TenantId::new("acme"), "prod")
            .await
            .expect("deploy failed");
        orchestrator.tasks().drain().await;
        orchestrator
            .handle_event(&EngineEvent {
                stack: "acme-prod".to_owned(),
                operation: "update".to_owned(),
                status: "succeeded".to_owned(),
                message: None,
            })
            .await;
        orchestrator.tasks().drain().await;
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn install_and_poll() {
        let app = app(None);
        succeeded_deployment(&app).await;
        // The settle task already dispatched cmd-1.
        assert_eq!(app.executor.submissions().len(), 1);

        let response = router(&app)
            .oneshot(post("/api/v1/clusters/acme/prod/addons/argocd/install"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "IN_PROGRESS");
        assert_eq!(body["command_id"], "cmd-2");

        let response = router(&app)
            .oneshot(get("/api/v1/clusters/acme/prod/addons/argocd/status"))
            .await
            .expect("response");
        let body = body_json(response).await;
        assert_eq!(body["status"], "PENDING");
        assert_eq!(body["command_id"], "cmd-2");

        app.executor.set_invocation(
            "cmd-1",
            CommandInvocation {
                status: "Success".to_owned(),
                output: Some("argocd installation complete".to_owned()),
                error: None,
            },
        );
        let response = router(&app)
            .oneshot(get(
                "/api/v1/clusters/acme/prod/addons/argocd/status?command_id=cmd-1",
            ))
            .await
            .expect("response");
        let body = body_json(response).await;
        assert_eq!(body["status"], "SUCCEEDED");
        assert_eq!(body["host_id"], "i-0abc");
    }

    #[tokio::test]
    async fn install_all_and_unknown_addon() {
        let app = app(None);
        succeeded_deployment(&app).await;

        let response = router(&app)
            .oneshot(post("/api/v1/clusters/acme/prod/addons/install"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["addons"].as_array().map(Vec::len), Some(1));

        let response = router(&app)
            .oneshot(post("/api/v1/clusters/acme/prod/addons/istio/install"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn install_before_success_is_rejected() {
        let app = app(None);
        let response = router(&app)
            .oneshot(post("/api/v1/clusters/acme/prod/addons/argocd/install"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
