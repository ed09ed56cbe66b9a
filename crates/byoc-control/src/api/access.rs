//! Access node endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::access::{AccessStatus, PowerResult, SessionInfo};

use super::{api_error, target_from_path, ApiError, AppState};

/// Report whether an operator session can be opened.
pub async fn access_status(
    State(state): State<AppState>,
    Path((tenant, environment)): Path<(String, String)>,
) -> Result<Json<AccessStatus>, ApiError> {
    let tenant = target_from_path(tenant, &environment)?;
    let status = state
        .access
        .status(&tenant, &environment)
        .await
        .map_err(api_error)?;
    Ok(Json(status))
}

/// Get the commands for an operator session.
pub async fn access_session(
    State(state): State<AppState>,
    Path((tenant, environment)): Path<(String, String)>,
) -> Result<Json<SessionInfo>, ApiError> {
    let tenant = target_from_path(tenant, &environment)?;
    let session = state
        .access
        .session(&tenant, &environment)
        .await
        .map_err(api_error)?;
    Ok(Json(session))
}

/// Start the access node.
pub async fn start_access_node(
    State(state): State<AppState>,
    Path((tenant, environment)): Path<(String, String)>,
) -> Result<(StatusCode, Json<PowerResult>), ApiError> {
    let tenant = target_from_path(tenant, &environment)?;
    info!(tenant = %tenant, environment = %environment, "starting access node via API");

    let result = state
        .access
        .start(&tenant, &environment)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::ACCEPTED, Json(result)))
}

/// Stop the access node.
pub async fn stop_access_node(
    State(state): State<AppState>,
    Path((tenant, environment)): Path<(String, String)>,
) -> Result<(StatusCode, Json<PowerResult>), ApiError> {
    let tenant = target_from_path(tenant, &environment)?;
    info!(tenant = %tenant, environment = %environment, "stopping access node via API");

    let result = state
        .access
        .stop(&tenant, &environment)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::ACCEPTED, Json(result)))
}
