//! HTTP handlers for the automation API.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use rentd_cron::TaskSnapshot;
use rentd_types::{AutomationConfig, AutomationConfigPatch, AutomationStatus, TriggerKind};

use crate::GatewayState;

/// Client-visible error: status code plus a JSON `{"error": ...}` body.
pub type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// Reject the request when a token is configured and the caller did
/// not present it.
fn authorize(state: &GatewayState, headers: &HeaderMap) -> Result<(), ApiError> {
    if let Some(expected) = &state.auth_token {
        match crate::extract_bearer_token(headers) {
            Some(token) if token == expected => {}
            _ => {
                warn!("API authentication failed");
                return Err(api_error(
                    StatusCode::UNAUTHORIZED,
                    "invalid or missing bearer token",
                ));
            }
        }
    }
    Ok(())
}

/// GET /health — simple HTTP health check.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/automation/status — master flag + per-task snapshots.
pub async fn automation_status(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Result<Json<AutomationStatus>, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(state.automation.get_status().await))
}

/// GET /api/automation/config — current automation config.
pub async fn config_get(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Result<Json<AutomationConfig>, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(state.automation.get_config().await))
}

/// PATCH /api/automation/config — merge a partial update.
///
/// Field ranges are validated here, before the coordinator sees the
/// patch; out-of-range values are a client error.
pub async fn config_patch(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(patch): Json<AutomationConfigPatch>,
) -> Result<Json<AutomationConfig>, ApiError> {
    authorize(&state, &headers)?;
    patch
        .validate()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    Ok(Json(state.automation.update_config(patch).await))
}

/// Body of POST /api/automation/trigger.
#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    /// Which automation to run: invoices, overdue, or reminders.
    #[serde(rename = "type")]
    pub kind: TriggerKind,
}

/// POST /api/automation/trigger — run an automation now, bypassing
/// the schedule (and, for invoices, the generate-day gate).
pub async fn trigger(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(req): Json<TriggerRequest>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers)?;
    state
        .automation
        .manual_trigger(req.kind)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
    Ok(Json(json!({ "triggered": req.kind.to_string() })))
}

/// GET /api/automation/tasks — every registered task.
pub async fn tasks_list(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<TaskSnapshot>>, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(state.scheduler.get_tasks().await))
}

/// POST /api/automation/tasks/{id}/toggle — flip a task's active flag.
pub async fn task_toggle(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers)?;
    if !state.scheduler.toggle_task(&id).await {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Task not found: {id}"),
        ));
    }
    let active = state
        .scheduler
        .get_task(&id)
        .await
        .map(|t| t.active)
        .unwrap_or(false);
    Ok(Json(json!({ "id": id, "active": active })))
}
