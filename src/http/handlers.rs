//! HTTP request handlers for the ModelGate server
//!
//! Handlers are organized by function:
//! - Inference: infer_handler, infer_version_handler
//! - Request management: status_handler, cancel_handler
//! - Model discovery: models_index_handler, model_metadata_handler,
//!   model_ready_handler
//! - Health probes: live_handler, ready_handler, health_handler
//! - Observability: metrics_handler

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::server::GatewayServer;
use super::types::{
    infer_outcome, HttpError, InferRequestBody, InferResponseBody, RequestStatusBody,
};
use crate::gateway::ModelDetail;
use crate::registry::ModelIndexEntry;
use crate::router::InferParams;

fn params_from_body(body: &InferRequestBody) -> InferParams {
    let parameters = body.parameters.as_ref();
    InferParams {
        correlation_id: body.id.clone(),
        priority: parameters.and_then(|p| p.priority).unwrap_or(0),
        timeout_ms: parameters.and_then(|p| p.timeout_ms),
    }
}

async fn run_infer(
    server: GatewayServer,
    model: String,
    version: Option<u64>,
    body: InferRequestBody,
) -> Result<Json<InferResponseBody>, HttpError> {
    let params = params_from_body(&body);
    let request = server
        .gateway
        .infer(&model, version, body.inputs, params)
        .await?;
    Ok(Json(infer_outcome(request)?))
}

/// Synchronous inference against the latest ready version of a model
pub async fn infer_handler(
    State(server): State<GatewayServer>,
    Path(model): Path<String>,
    Json(body): Json<InferRequestBody>,
) -> Result<Json<InferResponseBody>, HttpError> {
    info!(model = %model, inputs = body.inputs.len(), "received inference request");
    run_infer(server, model, None, body).await
}

/// Synchronous inference against an explicit model version
pub async fn infer_version_handler(
    State(server): State<GatewayServer>,
    Path((model, version)): Path<(String, u64)>,
    Json(body): Json<InferRequestBody>,
) -> Result<Json<InferResponseBody>, HttpError> {
    info!(model = %model, version, inputs = body.inputs.len(), "received inference request");
    run_infer(server, model, Some(version), body).await
}

/// Get the status of a request by id
pub async fn status_handler(
    State(server): State<GatewayServer>,
    Path(request_id): Path<u32>,
) -> Result<Json<RequestStatusBody>, HttpError> {
    let request = server.gateway.status(request_id).await?;
    Ok(Json(RequestStatusBody::from_request(&request)))
}

/// Cancel a pending or in-flight request
pub async fn cancel_handler(
    State(server): State<GatewayServer>,
    Path(request_id): Path<u32>,
) -> Result<Json<RequestStatusBody>, HttpError> {
    let request = server.gateway.cancel(request_id).await?;
    Ok(Json(RequestStatusBody::from_request(&request)))
}

/// Repository index: every registered model version and its state
pub async fn models_index_handler(
    State(server): State<GatewayServer>,
) -> Json<Vec<ModelIndexEntry>> {
    Json(server.gateway.list_models().await)
}

/// Metadata for a model across its versions
pub async fn model_metadata_handler(
    State(server): State<GatewayServer>,
    Path(model): Path<String>,
) -> Result<Json<ModelDetail>, HttpError> {
    let detail = server.gateway.model_detail(&model, None).await?;
    Ok(Json(detail))
}

/// Metadata for one model version
pub async fn model_version_metadata_handler(
    State(server): State<GatewayServer>,
    Path((model, version)): Path<(String, u64)>,
) -> Result<Json<ModelDetail>, HttpError> {
    let detail = server.gateway.model_detail(&model, Some(version)).await?;
    Ok(Json(detail))
}

/// Per-model readiness probe: 200 when some version is ready
pub async fn model_ready_handler(
    State(server): State<GatewayServer>,
    Path(model): Path<String>,
) -> StatusCode {
    if server.gateway.model_ready(&model, None).await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Per-version readiness probe
pub async fn model_version_ready_handler(
    State(server): State<GatewayServer>,
    Path((model, version)): Path<(String, u64)>,
) -> StatusCode {
    if server.gateway.model_ready(&model, Some(version)).await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness probe: the process is up
pub async fn live_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "live": true }))
}

/// Readiness probe: 200 once the dispatch loop is running
pub async fn ready_handler(
    State(server): State<GatewayServer>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if !server.gateway.is_running().await {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(serde_json::json!({
        "ready": true,
        "service": "modelgate"
    })))
}

/// Detailed health document
///
/// Reports gateway state, model counts, and request queue depths.
pub async fn health_handler(State(server): State<GatewayServer>) -> Json<serde_json::Value> {
    let health = server.gateway.health().await;

    let mut checks = serde_json::Map::new();
    checks.insert(
        "gateway".to_string(),
        serde_json::json!({
            "running": health.gateway_running,
        }),
    );
    checks.insert(
        "models".to_string(),
        serde_json::json!({
            "registered": health.models_registered,
            "ready": health.models_ready,
        }),
    );
    checks.insert(
        "requests".to_string(),
        serde_json::json!({
            "active": health.active_requests,
            "queued": health.queued_requests,
            "completed": health.completed_requests,
        }),
    );

    Json(serde_json::json!({
        "status": health.status,
        "service": "modelgate",
        "version": env!("CARGO_PKG_VERSION"),
        "checks": checks
    }))
}

/// Prometheus metrics export handler
pub async fn metrics_handler(State(server): State<GatewayServer>) -> String {
    server.metrics_registry.export().await
}
