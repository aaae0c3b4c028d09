//! HTTP surface: the RPC endpoint and the health probe.
//!
//! Transport-level concerns only — protocol-level failures always ride
//! HTTP 200 with the error in the body. 4xx/5xx are reserved for the
//! transport itself: 404 for unknown paths, 405 for wrong methods
//! (both from the router), 413 for oversized bodies, and 503 when the
//! health check reports `DOWN`.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};

use crate::health::HealthService;
use crate::rpc::Dispatcher;

/// Default URL path serving JSON-RPC requests.
pub const DEFAULT_RPC_PATH: &str = "/fos";

/// Maximum accepted request body: 32 MiB. Larger bodies get 413.
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// The RPC dispatcher.
    pub dispatcher: Arc<Dispatcher>,
    /// The health check service.
    pub health: Arc<HealthService>,
}

/// Builds the service router.
///
/// `rpc_path` is configurable (default [`DEFAULT_RPC_PATH`]); the
/// health endpoint is fixed at `/health`.
pub fn router(state: AppState, rpc_path: &str) -> Router {
    Router::new()
        .route(rpc_path, post(handle_rpc))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// POST handler: feed the body to the dispatcher, write back whatever
/// it produced. A notification-only exchange has no body at all.
async fn handle_rpc(State(state): State<AppState>, body: Bytes) -> Response {
    match state.dispatcher.handle(&body).await {
        Some(response_body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
            response_body,
        )
            .into_response(),
        None => StatusCode::OK.into_response(),
    }
}

/// GET handler for probes: 200 when UP, 503 when DOWN, never cached.
async fn handle_health(State(state): State<AppState>) -> Response {
    let report = state.health.check();
    let status = if report.is_up() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        [
            (header::CONTENT_TYPE, JSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        axum::Json(report),
    )
        .into_response()
}
