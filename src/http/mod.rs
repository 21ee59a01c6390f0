//! HTTP surface for the gateway
//!
//! A v2-flavored inference API (model metadata, per-model readiness,
//! synchronous inference) plus request management, health probes, and
//! Prometheus metrics export.

pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

pub use routes::create_router;
pub use server::{run_server, GatewayServer};
pub use types::{
    HttpError, InferParameters, InferRequestBody, InferResponseBody, RequestStatusBody,
    ServerResult,
};
