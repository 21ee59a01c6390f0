//! Gateway core
//!
//! Composes the model registry, request router, batch scheduler, and
//! dispatch worker pool into one serving surface. The HTTP layer and the
//! CLI talk to this type only.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::{Notify, RwLock};
use tracing::{info, warn};

use crate::dispatch::{BackendRegistry, DispatchPool};
use crate::error::{GateResult, ModelGateError};
use crate::gateway::config::GatewayConfig;
use crate::gateway::stats::{GatewayStats, HealthStatus, ModelDetail, VersionInfo};
use crate::metrics::Metrics;
use crate::registry::{
    resolve_repository_dir, scan_repository, ModelConfig, ModelIndexEntry, ModelKey,
    ModelRegistry, Tensor,
};
use crate::router::{InferParams, RequestRouter};
use crate::scheduler::{BatchScheduler, InferenceRequest, QueuePolicy};

/// Fallback polling interval while waiting on a request notifier
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// The model-serving request router and batching gateway
///
/// Data flow: router admits requests into the scheduler, the dispatch pool
/// executes due micro-batches against backends and validates outputs
/// against the registry, then completed results flow back to waiters via
/// per-request notifiers.
#[derive(Debug, Clone)]
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<RwLock<ModelRegistry>>,
    scheduler: Arc<RwLock<BatchScheduler>>,
    router: RequestRouter,
    pool: DispatchPool,
    notifiers: Arc<RwLock<HashMap<u32, Arc<Notify>>>>,
    metrics: Option<Arc<Metrics>>,
    is_running: Arc<RwLock<bool>>,
}

impl Gateway {
    /// Create a gateway with the built-in backends and no metrics
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_parts(config, BackendRegistry::new(), None)
    }

    /// Create a gateway with custom backends and optional metrics
    pub fn with_parts(
        config: GatewayConfig,
        backends: BackendRegistry,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let registry = Arc::new(RwLock::new(ModelRegistry::new()));
        let scheduler = Arc::new(RwLock::new(BatchScheduler::new(config.scheduler.clone())));
        let notifiers = Arc::new(RwLock::new(HashMap::new()));
        let is_running = Arc::new(RwLock::new(false));
        let backends = Arc::new(backends);

        let router = RequestRouter::new(registry.clone(), scheduler.clone());
        let pool = DispatchPool::new(
            config.dispatch.clone(),
            scheduler.clone(),
            registry.clone(),
            backends,
            notifiers.clone(),
            metrics.clone(),
            is_running.clone(),
        );

        Gateway {
            config,
            registry,
            scheduler,
            router,
            pool,
            notifiers,
            metrics,
            is_running,
        }
    }

    // ========== Model management ==========

    /// Register a model version in the Loading state and install its
    /// batching policy
    pub async fn register_model(
        &self,
        name: &str,
        config: ModelConfig,
        version: u64,
        path: Option<std::path::PathBuf>,
    ) -> GateResult<ModelKey> {
        let policy = QueuePolicy {
            max_batch_size: config.max_batch_size,
            preferred_batch_sizes: config.preferred_batch_sizes.clone(),
            max_queue_delay: config
                .max_queue_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(self.config.scheduler.batch_timeout),
        };

        let key = {
            let mut registry = self.registry.write().await;
            registry.register(name, config, version, path)?
        };
        {
            let mut scheduler = self.scheduler.write().await;
            scheduler.set_policy(key.clone(), policy);
        }
        Ok(key)
    }

    /// Mark a registered version Ready; it serves traffic from this point
    pub async fn mark_model_ready(&self, key: &ModelKey) -> GateResult<()> {
        {
            let mut registry = self.registry.write().await;
            registry.mark_ready(key)?;
        }
        self.update_ready_gauge().await;
        Ok(())
    }

    /// Remove a model version from rotation entirely
    pub async fn unregister_model(&self, key: &ModelKey) -> GateResult<()> {
        {
            let mut registry = self.registry.write().await;
            registry.unregister(key)?;
        }
        {
            let mut scheduler = self.scheduler.write().await;
            scheduler.remove_policy(key);
        }
        self.update_ready_gauge().await;
        Ok(())
    }

    /// Scan the model repository and bring every discovered version Ready
    ///
    /// Returns the number of versions registered. An empty or missing
    /// repository is not an error; the gateway serves health endpoints
    /// with no models.
    pub async fn load_repository(&self) -> Result<usize> {
        let dir = self
            .config
            .model_repository
            .clone()
            .unwrap_or_else(|| resolve_repository_dir(None));
        let discovered = scan_repository(&dir)?;

        let mut loaded = 0;
        for model in discovered {
            for (version, path) in &model.versions {
                let key = self
                    .register_model(&model.name, model.config.clone(), *version, Some(path.clone()))
                    .await?;
                self.mark_model_ready(&key).await?;
                loaded += 1;
            }
        }

        if loaded == 0 {
            warn!("model repository {} holds no servable models", dir.display());
        } else {
            info!(versions = loaded, "model repository loaded");
        }
        Ok(loaded)
    }

    /// Index of every registered version
    pub async fn list_models(&self) -> Vec<ModelIndexEntry> {
        self.registry.read().await.list()
    }

    /// Metadata document for a model, optionally narrowed to one version
    pub async fn model_detail(
        &self,
        name: &str,
        version: Option<u64>,
    ) -> GateResult<ModelDetail> {
        let registry = self.registry.read().await;
        let entry = registry
            .entry(name)
            .ok_or_else(|| ModelGateError::ModelNotFound(name.to_string()))?;

        let versions: Vec<VersionInfo> = match version {
            Some(v) => {
                let mv = entry.versions.get(&v).ok_or_else(|| {
                    ModelGateError::VersionNotFound {
                        model: name.to_string(),
                        version: v,
                    }
                })?;
                vec![VersionInfo {
                    version: mv.version,
                    state: mv.state,
                }]
            }
            None => entry
                .versions
                .values()
                .map(|mv| VersionInfo {
                    version: mv.version,
                    state: mv.state,
                })
                .collect(),
        };

        Ok(ModelDetail {
            name: entry.name.clone(),
            backend: entry.config.backend.clone(),
            max_batch_size: entry.config.max_batch_size,
            versions,
            inputs: entry.config.inputs.clone(),
            outputs: entry.config.outputs.clone(),
        })
    }

    /// Whether a (name, optional version) pair is ready to serve
    pub async fn model_ready(&self, name: &str, version: Option<u64>) -> bool {
        self.registry.read().await.is_ready(name, version)
    }

    // ========== Lifecycle ==========

    /// Start the dispatch loop
    pub async fn start(&self) {
        {
            let mut is_running = self.is_running.write().await;
            if *is_running {
                return;
            }
            *is_running = true;
        }
        tokio::spawn(self.pool.clone().run());
        info!("gateway started");
    }

    /// Stop accepting requests and wind down the dispatch loop
    pub async fn stop(&self) {
        let mut is_running = self.is_running.write().await;
        *is_running = false;
        info!("gateway stopping");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    // ========== Request lifecycle ==========

    /// Admit a request and return its id
    pub async fn submit(
        &self,
        model: &str,
        version: Option<u64>,
        inputs: Vec<Tensor>,
        params: InferParams,
    ) -> GateResult<u32> {
        if !self.is_running().await {
            return Err(ModelGateError::GatewayNotRunning);
        }

        let request_id = self.router.route(model, version, inputs, params).await?;

        {
            let mut notifiers = self.notifiers.write().await;
            notifiers
                .entry(request_id)
                .or_insert_with(|| Arc::new(Notify::new()));
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_request_start();
            let stats = self.scheduler.read().await.stats();
            metrics.set_queue_length(stats.pending_requests as u64);
        }

        Ok(request_id)
    }

    /// Block until a request finishes, with an optional deadline
    ///
    /// A deadline miss leaves the request running; callers can keep polling
    /// its status or cancel it.
    pub async fn wait(
        &self,
        request_id: u32,
        timeout: Option<Duration>,
    ) -> GateResult<InferenceRequest> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let notifier = {
            let notifiers = self.notifiers.read().await;
            notifiers.get(&request_id).cloned()
        };

        loop {
            let request = {
                let scheduler = self.scheduler.read().await;
                scheduler.get_request(request_id).cloned()
            }?;

            if request.is_finished() {
                self.drop_notifier(request_id).await;
                return Ok(request);
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(ModelGateError::DeadlineExceeded(request_id));
                }
            }

            // The notifier can race with completion; a short timeout keeps
            // the poll fallback live either way.
            match &notifier {
                Some(notify) => {
                    let _ = tokio::time::timeout(WAIT_POLL_INTERVAL, notify.notified()).await;
                }
                None => tokio::time::sleep(WAIT_POLL_INTERVAL).await,
            }
        }
    }

    /// Submit a request and wait for its result
    pub async fn infer(
        &self,
        model: &str,
        version: Option<u64>,
        inputs: Vec<Tensor>,
        params: InferParams,
    ) -> GateResult<InferenceRequest> {
        let timeout = params.timeout_ms.map(Duration::from_millis);
        let request_id = self.submit(model, version, inputs, params).await?;
        self.wait(request_id, timeout).await
    }

    /// Snapshot of a request's current state
    pub async fn status(&self, request_id: u32) -> GateResult<InferenceRequest> {
        let scheduler = self.scheduler.read().await;
        Ok(scheduler.get_request(request_id)?.clone())
    }

    /// Cancel a pending or processing request
    pub async fn cancel(&self, request_id: u32) -> GateResult<InferenceRequest> {
        let cancelled = {
            let mut scheduler = self.scheduler.write().await;
            scheduler.cancel(request_id)?
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_request_cancelled();
        }

        if let Some(notify) = {
            let mut notifiers = self.notifiers.write().await;
            notifiers.remove(&request_id)
        } {
            notify.notify_waiters();
        }

        Ok(cancelled)
    }

    async fn drop_notifier(&self, request_id: u32) {
        let mut notifiers = self.notifiers.write().await;
        notifiers.remove(&request_id);
    }

    // ========== Monitoring ==========

    async fn update_ready_gauge(&self) {
        if let Some(metrics) = &self.metrics {
            let ready = self.registry.read().await.ready_count();
            metrics.set_models_ready(ready as u64);
        }
    }

    /// Runtime statistics snapshot
    pub async fn stats(&self) -> GatewayStats {
        let scheduler_stats = self.scheduler.read().await.stats();
        let (models_registered, models_ready) = {
            let registry = self.registry.read().await;
            (registry.model_count(), registry.ready_count())
        };
        GatewayStats {
            is_running: self.is_running().await,
            scheduler_stats,
            models_registered,
            models_ready,
        }
    }

    /// Health document for monitoring endpoints
    pub async fn health(&self) -> HealthStatus {
        let stats = self.stats().await;
        let status = if !stats.is_running {
            "unhealthy"
        } else if stats.models_ready == 0 {
            "degraded"
        } else {
            "healthy"
        };

        HealthStatus {
            status: status.to_string(),
            gateway_running: stats.is_running,
            models_registered: stats.models_registered,
            models_ready: stats.models_ready,
            active_requests: stats.scheduler_stats.processing_requests,
            queued_requests: stats.scheduler_stats.pending_requests,
            completed_requests: stats.scheduler_stats.completed_requests,
        }
    }
}
