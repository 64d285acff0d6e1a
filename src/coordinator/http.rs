//! HTTP API for the region directory
//!
//! Store-facing endpoints mirror the directory operations one to one:
//! - `POST /pd/region_heartbeat`
//! - `POST /pd/ask_split`, `POST /pd/ask_batch_split`
//! - `POST /pd/report_split`, `POST /pd/report_batch_split`
//! - `POST /pd/validate_region`
//!
//! plus read-only region queries, `/health` and Prometheus `/metrics`.
//! Keys are hex strings in JSON. Rejections carry the error kind so callers
//! can tell a stale view from a structural problem.

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::utils::parse_key;
use crate::common::Error;
use crate::coordinator::cluster::RegionCluster;
use crate::coordinator::region::{Peer, Region, RegionId};
use crate::coordinator::split::SplitAllocation;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

#[derive(Clone)]
pub struct CoordState {
    pub cluster: Arc<RegionCluster>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.to_http_status();
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, Error>;

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RegionHeartbeatRequest {
    pub region: Region,
    pub leader: Peer,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegionRequest {
    pub region: Region,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskBatchSplitRequest {
    pub region: Region,
    pub split_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskBatchSplitResponse {
    pub ids: Vec<SplitAllocation>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportSplitRequest {
    pub left: Region,
    pub right: Region,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegionsBody {
    pub regions: Vec<Region>,
}

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub limit: usize,
}

// ============================================================================
// Handlers
// ============================================================================

async fn region_heartbeat(
    State(state): State<CoordState>,
    Json(req): Json<RegionHeartbeatRequest>,
) -> ApiResult<serde_json::Value> {
    state.cluster.handle_region_heartbeat(req.region, req.leader)?;
    Ok(Json(json!({ "status": "accepted" })))
}

async fn ask_split(
    State(state): State<CoordState>,
    Json(req): Json<RegionRequest>,
) -> ApiResult<SplitAllocation> {
    Ok(Json(state.cluster.handle_ask_split(&req.region)?))
}

async fn ask_batch_split(
    State(state): State<CoordState>,
    Json(req): Json<AskBatchSplitRequest>,
) -> ApiResult<AskBatchSplitResponse> {
    let ids = state
        .cluster
        .handle_ask_batch_split(&req.region, req.split_count)?;
    Ok(Json(AskBatchSplitResponse { ids }))
}

async fn report_split(
    State(state): State<CoordState>,
    Json(req): Json<ReportSplitRequest>,
) -> ApiResult<RegionsBody> {
    let regions = state.cluster.handle_report_split(req.left, req.right)?;
    Ok(Json(RegionsBody { regions }))
}

async fn report_batch_split(
    State(state): State<CoordState>,
    Json(req): Json<RegionsBody>,
) -> ApiResult<RegionsBody> {
    let regions = state.cluster.handle_report_batch_split(req.regions)?;
    Ok(Json(RegionsBody { regions }))
}

async fn validate_region(
    State(state): State<CoordState>,
    Json(req): Json<RegionRequest>,
) -> ApiResult<serde_json::Value> {
    state.cluster.validate_request_region(&req.region)?;
    Ok(Json(json!({ "status": "ok" })))
}

/// `GET /pd/regions?start=<hex>&end=<hex>&limit=<n>`
async fn list_regions(
    State(state): State<CoordState>,
    Query(q): Query<ScanQuery>,
) -> ApiResult<RegionsBody> {
    let start = parse_key(if q.start.is_empty() { "-" } else { &q.start })?;
    let end = parse_key(if q.end.is_empty() { "-" } else { &q.end })?;
    let regions = state.cluster.scan_regions(&start, &end, q.limit);
    Ok(Json(RegionsBody { regions }))
}

async fn get_region(State(state): State<CoordState>, Path(id): Path<RegionId>) -> ApiResult<Region> {
    state
        .cluster
        .get_region(id)
        .map(Json)
        .ok_or_else(|| Error::UnknownRegion(format!("region {}", id)))
}

/// `GET /pd/region_by_key/:hex_key`, with `-` for the empty key
async fn get_region_by_key(
    State(state): State<CoordState>,
    Path(key): Path<String>,
) -> ApiResult<Region> {
    let key = parse_key(&key)?;
    state
        .cluster
        .get_region_by_key(&key)
        .map(Json)
        .ok_or_else(|| Error::UnknownRegion(format!("no region covers {}", hex::encode(&key))))
}

async fn health(State(state): State<CoordState>) -> impl IntoResponse {
    let bootstrapped = state.cluster.is_bootstrapped();
    let partition = state.cluster.check_partition();
    let status = if partition.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if partition.is_ok() { "healthy" } else { "incomplete" },
            "bootstrapped": bootstrapped,
            "regions": state.cluster.region_count(),
            "partition_error": partition.err().map(|e| e.to_string()),
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

async fn metrics(State(state): State<CoordState>) -> impl IntoResponse {
    (StatusCode::OK, state.cluster.metrics().to_prometheus())
}

/// Creates the HTTP router with all store-facing endpoints.
pub fn create_router(state: CoordState, max_body_bytes: usize) -> Router {
    let registry = state.cluster.metrics().clone();
    Router::new()
        // Heartbeats and split protocol
        .route("/pd/region_heartbeat", post(region_heartbeat))
        .route("/pd/ask_split", post(ask_split))
        .route("/pd/ask_batch_split", post(ask_batch_split))
        .route("/pd/report_split", post(report_split))
        .route("/pd/report_batch_split", post(report_batch_split))
        .route("/pd/validate_region", post(validate_region))
        // Queries
        .route("/pd/regions", get(list_regions))
        .route("/pd/regions/:id", get(get_region))
        .route("/pd/region_by_key/:key", get(get_region_by_key))
        .route_layer(axum::middleware::from_fn_with_state(
            registry,
            request_tracing_middleware,
        ))
        // Health and metrics
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}
