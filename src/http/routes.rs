//! HTTP route definitions for the ModelGate server
//!
//! Sets up the Axum router with all gateway endpoints:
//! - Inference (/v2/models/:model/infer, with explicit versions)
//! - Model discovery (/v2/models, metadata, per-model readiness)
//! - Request management (/status, /cancel)
//! - Health and readiness probes (/v2/health/live, /v2/health/ready, /health)
//! - Observability (/metrics)

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{
    cancel_handler, health_handler, infer_handler, infer_version_handler, live_handler,
    metrics_handler, model_metadata_handler, model_ready_handler,
    model_version_metadata_handler, model_version_ready_handler, models_index_handler,
    ready_handler, status_handler,
};
use super::server::GatewayServer;

/// Create the HTTP router with all gateway endpoints
///
/// Includes CORS support for cross-origin requests and Kubernetes-style
/// health probes alongside the v2-flavored inference API.
pub fn create_router(server: GatewayServer) -> Router {
    Router::new()
        .route("/v2/models", get(models_index_handler))
        .route("/v2/models/:model", get(model_metadata_handler))
        .route("/v2/models/:model/infer", post(infer_handler))
        .route("/v2/models/:model/ready", get(model_ready_handler))
        .route(
            "/v2/models/:model/versions/:version",
            get(model_version_metadata_handler),
        )
        .route(
            "/v2/models/:model/versions/:version/infer",
            post(infer_version_handler),
        )
        .route(
            "/v2/models/:model/versions/:version/ready",
            get(model_version_ready_handler),
        )
        .route("/v2/health/live", get(live_handler))
        .route("/v2/health/ready", get(ready_handler))
        .route("/status/:request_id", get(status_handler))
        .route("/cancel/:request_id", post(cancel_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(ServiceBuilder::new().layer(CorsLayer::new().allow_origin(Any).allow_headers(Any)))
        .with_state(server)
}
