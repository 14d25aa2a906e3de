//! HTTP API for the coordinator
//!
//! JSON over HTTP, one route per registry operation:
//!
//! - `POST /connect`       register a member
//! - `POST /update`        heartbeat
//! - `POST /should_serve`  tablet ownership check
//! - `GET  /state`         operator snapshot
//! - `GET  /health`, `GET /metrics`
//!
//! Callers bound their request with `x-request-timeout-ms`; the registry
//! answers `408` once that deadline has passed.

use crate::common::tracing_middleware::request_id_middleware;
use crate::common::{Error, RequestContext};
use crate::coordinator::registry::MembershipRegistry;
use crate::coordinator::state::{ClusterSnapshot, Member, MembershipUpdate, ServeStatus};
use crate::coordinator::tablet::MemberRef;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Header carrying the caller's remaining time budget in milliseconds
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout-ms";

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct ZeroState {
    pub registry: Arc<MembershipRegistry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletRef {
    pub predicate: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShouldServeRequest {
    pub member: MemberRef,
    pub tablet: TabletRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShouldServeResponse {
    pub status: ServeStatus,
}

/// Error body: `{ "error": <message>, "kind": <kind> }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

/// Registry error rendered as an HTTP response
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (self.0.to_http_status(), Json(body)).into_response()
    }
}

/// Build the caller context from request headers
pub fn request_context(headers: &HeaderMap) -> RequestContext {
    headers
        .get(REQUEST_TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|ms| RequestContext::with_timeout(Duration::from_millis(ms)))
        .unwrap_or_default()
}

async fn connect(
    State(state): State<ZeroState>,
    headers: HeaderMap,
    Json(member): Json<Member>,
) -> Result<Json<MembershipUpdate>, ApiError> {
    let ctx = request_context(&headers);
    Ok(Json(state.registry.connect(&ctx, member).await?))
}

async fn update(
    State(state): State<ZeroState>,
    headers: HeaderMap,
    Json(member): Json<Member>,
) -> Result<Json<MembershipUpdate>, ApiError> {
    let ctx = request_context(&headers);
    Ok(Json(state.registry.update(&ctx, member).await?))
}

async fn should_serve(
    State(state): State<ZeroState>,
    headers: HeaderMap,
    Json(req): Json<ShouldServeRequest>,
) -> Result<Json<ShouldServeResponse>, ApiError> {
    let ctx = request_context(&headers);
    let status = state
        .registry
        .should_serve(&ctx, req.member, &req.tablet.predicate)
        .await?;
    Ok(Json(ShouldServeResponse { status }))
}

async fn cluster_state(State(state): State<ZeroState>) -> Json<ClusterSnapshot> {
    Json(state.registry.snapshot().await)
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": crate::VERSION,
        })),
    )
}

async fn metrics(State(state): State<ZeroState>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        state.registry.metrics().to_prometheus(),
    )
}

/// Creates the HTTP router with all coordinator endpoints.
pub fn create_router(state: ZeroState) -> Router {
    Router::new()
        .route("/connect", post(connect))
        .route("/update", post(update))
        .route("/should_serve", post(should_serve))
        .route("/state", get(cluster_state))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(request_id_middleware))
                // Innermost: the request-id middleware expects an unwrapped body
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
}
