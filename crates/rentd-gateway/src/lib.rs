//! rentd-gateway: HTTP API for the billing automation service.
//!
//! Routes:
//! - `GET  /health` — liveness check
//! - `GET  /api/automation/status` — master flag + task snapshots
//! - `GET  /api/automation/config` — current automation config
//! - `PATCH /api/automation/config` — merge a partial config update
//! - `POST /api/automation/trigger` — manual trigger by kind
//! - `GET  /api/automation/tasks` — full task list
//! - `POST /api/automation/tasks/{id}/toggle` — flip a task's active flag
//!
//! Optional bearer token authentication on the `/api` routes.
//! Shutdown (ctrl-c) stops the scheduler before the server exits, so
//! no task fires once shutdown begins.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use tracing::info;

use rentd_billing::BillingAutomation;
use rentd_config::RentdConfig;
use rentd_cron::Scheduler;

/// Shared gateway state.
pub struct GatewayState {
    pub automation: Arc<BillingAutomation>,
    pub scheduler: Arc<Scheduler>,
    pub auth_token: Option<String>,
}

/// Build the API router over the shared state.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/automation/status", get(handlers::automation_status))
        .route(
            "/api/automation/config",
            get(handlers::config_get).patch(handlers::config_patch),
        )
        .route("/api/automation/trigger", post(handlers::trigger))
        .route("/api/automation/tasks", get(handlers::tasks_list))
        .route(
            "/api/automation/tasks/{id}/toggle",
            post(handlers::task_toggle),
        )
        .with_state(state)
}

/// Start the gateway server.
///
/// Binds to the configured address, serves requests, and on ctrl-c
/// stops the scheduler before returning.
pub async fn start_gateway(
    config: &RentdConfig,
    automation: Arc<BillingAutomation>,
    scheduler: Arc<Scheduler>,
    port_override: Option<u16>,
) -> anyhow::Result<()> {
    let port = port_override.unwrap_or(config.gateway.port);
    let host = config.gateway.host.clone();

    let state = Arc::new(GatewayState {
        automation,
        scheduler: Arc::clone(&scheduler),
        auth_token: config.gateway.auth_token.clone(),
    });

    let app = router(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Gateway listening on {addr}");
    info!("  Status: http://{addr}/api/automation/status");
    info!("  Health: http://{addr}/health");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await?;

    Ok(())
}

/// Wait for ctrl-c, then halt all task evaluation before the server
/// stops accepting connections.
async fn shutdown_signal(scheduler: Arc<Scheduler>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received, stopping scheduler");
    scheduler.stop();
}

/// Extract bearer token from Authorization header.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}
