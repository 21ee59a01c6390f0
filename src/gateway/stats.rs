//! Gateway statistics and health monitoring

use serde::Serialize;

use crate::registry::{ModelState, TensorSchema};
use crate::scheduler::QueueStats;

/// Runtime statistics for the gateway
#[derive(Debug, Clone)]
pub struct GatewayStats {
    /// Whether the dispatch loop is running
    pub is_running: bool,

    /// Scheduler queue depths
    pub scheduler_stats: QueueStats,

    /// Registered model names
    pub models_registered: usize,

    /// Model versions ready to serve
    pub models_ready: usize,
}

/// Health status information for monitoring endpoints
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall health: healthy, degraded, or unhealthy
    pub status: String,

    /// Whether the dispatch loop is running
    pub gateway_running: bool,

    /// Registered model names
    pub models_registered: usize,

    /// Model versions ready to serve
    pub models_ready: usize,

    /// Requests currently executing
    pub active_requests: usize,

    /// Requests waiting in pending queues
    pub queued_requests: usize,

    /// Finished requests retained for status queries
    pub completed_requests: usize,
}

/// State of one version within a model detail document
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub version: u64,
    pub state: ModelState,
}

/// Metadata document for one model
#[derive(Debug, Clone, Serialize)]
pub struct ModelDetail {
    pub name: String,
    pub backend: Option<String>,
    pub max_batch_size: usize,
    pub versions: Vec<VersionInfo>,
    pub inputs: Vec<TensorSchema>,
    pub outputs: Vec<TensorSchema>,
}
