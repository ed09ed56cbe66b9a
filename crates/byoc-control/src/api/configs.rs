//! Tenant configuration endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use byoc_config::{
    check, resolve_validated, update_validated, ConfigInput, ConfigResolved, Violation, Violations,
};
use serde::Serialize;
use tracing::info;

use crate::error::ControlError;
use crate::types::TenantId;

use super::{api_error, ApiError, AppState};

const REDACTED: &str = "[REDACTED]";

/// Dry-run validation result.
#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    /// Whether the input would be accepted.
    pub valid: bool,
    /// Every problem found.
    pub violations: Violations,
}

fn redact(mut config: ConfigResolved) -> ConfigResolved {
    if let Some(repo) = config.addons.argocd.repository.as_mut() {
        if repo.password.is_some() {
            repo.password = Some(REDACTED.to_owned());
        }
    }
    config
}

/// Create a tenant configuration.
pub async fn create_config(
    State(state): State<AppState>,
    Json(input): Json<ConfigInput>,
) -> Result<(StatusCode, Json<ConfigResolved>), ApiError> {
    let tenant = TenantId::new(&input.tenant_id);
    if state.configs.exists(&tenant).await.map_err(api_error)? {
        return Err(api_error(ControlError::conflict(format!(
            "configuration for tenant {tenant} already exists"
        ))));
    }

    let resolved = resolve_validated(&input)
        .map_err(ControlError::from)
        .map_err(api_error)?;
    state.configs.save(&resolved).await.map_err(api_error)?;

    info!(tenant = %tenant, environment = %resolved.environment, "configuration created");
    Ok((StatusCode::CREATED, Json(redact(resolved))))
}

/// List every tenant configuration.
pub async fn list_configs(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConfigResolved>>, ApiError> {
    let configs = state.configs.list().await.map_err(api_error)?;
    Ok(Json(configs.into_iter().map(redact).collect()))
}

/// Get a tenant configuration.
pub async fn get_config(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<ConfigResolved>, ApiError> {
    let tenant = TenantId::new(tenant);
    state
        .configs
        .get(&tenant)
        .await
        .map_err(api_error)?
        .map(|config| Json(redact(config)))
        .ok_or_else(|| {
            api_error(ControlError::not_found(format!(
                "configuration for tenant {tenant}"
            )))
        })
}

/// Replace a tenant configuration.
///
/// The input is resolved from scratch; only the creation time survives.
pub async fn update_config(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(mut input): Json<ConfigInput>,
) -> Result<Json<ConfigResolved>, ApiError> {
    if input.tenant_id.is_empty() {
        input.tenant_id.clone_from(&tenant);
    } else if input.tenant_id != tenant {
        return Err(api_error(ControlError::Validation(Violations::from(vec![
            Violation::new("tenant_id", "Tenant ID does not match the request path"),
        ]))));
    }

    let tenant = TenantId::new(tenant);
    let existing = state
        .configs
        .get(&tenant)
        .await
        .map_err(api_error)?
        .ok_or_else(|| {
            api_error(ControlError::not_found(format!(
                "configuration for tenant {tenant}"
            )))
        })?;

    let resolved = update_validated(&existing, &input)
        .map_err(ControlError::from)
        .map_err(api_error)?;
    state.configs.save(&resolved).await.map_err(api_error)?;

    info!(tenant = %tenant, "configuration updated");
    Ok(Json(redact(resolved)))
}

/// Delete a tenant configuration.
pub async fn delete_config(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<StatusCode, ApiError> {
    let tenant = TenantId::new(tenant);
    if state.configs.delete(&tenant).await.map_err(api_error)? {
        info!(tenant = %tenant, "configuration deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(ControlError::not_found(format!(
            "configuration for tenant {tenant}"
        ))))
    }
}

/// Validate an input without storing it.
pub async fn validate_config(Json(input): Json<ConfigInput>) -> Json<ValidateResponse> {
    let violations = check(&input);
    Json(ValidateResponse {
        valid: violations.is_empty(),
        violations,
    })
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{app, body_json, json_request, router};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn input() -> serde_json::Value {
        json!({
            "tenant_id": "acme",
            "account": {
                "role_arn": "arn:aws:iam::123456789012:role/byoc",
                "external_id": "external-1234"
            },
            "addons": {
                "argocd": {
                    "enabled": true,
                    "repository": {
                        "url": "https://git.example.com/acme/gitops",
                        "password": "hunter2"
                    }
                }
            }
        })
    }

    #[tokio::test]
    async fn create_then_conflict() {
        let app = app(None);

        let response = router(&app)
            .oneshot(json_request("POST", "/api/v1/configs", &input()))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["network"]["private_subnets"].as_array().map(Vec::len), Some(3));
        assert_eq!(body["addons"]["argocd"]["repository"]["password"], "[REDACTED]");

        let response = router(&app)
            .oneshot(json_request("POST", "/api/v1/configs", &input()))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn invalid_input_returns_every_violation() {
        let app = app(None);
        let mut body = input();
        body["tenant_id"] = json!("A");
        body["account"]["external_id"] = json!("short");

        let response = router(&app)
            .oneshot(json_request("POST", "/api/v1/configs", &body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "validation failed");
        assert!(body["details"].as_array().is_some_and(|d| d.len() >= 2));
    }

    #[tokio::test]
    async fn update_rejects_mismatched_tenant() {
        let app = app(None);
        router(&app)
            .oneshot(json_request("POST", "/api/v1/configs", &input()))
            .await
            .expect("response");

        let mut body = input();
        body["tenant_id"] = json!("globex");
        let response = router(&app)
            .oneshot(json_request("PUT", "/api/v1/configs/acme", &body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut body = input();
        body["network"] = json!({ "cidr_block": "10.20.0.0/16" });
        let response = router(&app)
            .oneshot(json_request("PUT", "/api/v1/configs/acme", &body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["network"]["cidr_block"], "10.20.0.0/16");
    }

    #[tokio::test]
    async fn delete_and_get() {
        let app = app(None);
        router(&app)
            .oneshot(json_request("POST", "/api/v1/configs", &input()))
            .await
            .expect("response");

        let delete = || {
            Request::builder()
                .method("DELETE")
                .uri("/api/v1/configs/acme")
                .body(Body::empty())
                .expect("request")
        };
        let response = router(&app).oneshot(delete()).await.expect("response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = router(&app).oneshot(delete()).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router(&app)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/configs/acme")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn validate_is_a_dry_run() {
        let app = app(None);
        let mut body = input();
        body["network"] = json!({ "cidr_block": "10.0.0.0/28" });

        let response = router(&app)
            .oneshot(json_request("POST", "/api/v1/configs/validate", &body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["valid"], false);

        let response = router(&app)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/configs")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(body_json(response).await, json!([]));
    }
}
