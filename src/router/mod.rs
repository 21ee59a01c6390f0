//! Request router
//!
//! Maps inbound requests to the correct model version and enqueues them
//! into the batch scheduler. Admission control happens here: resolution
//! against the registry, readiness checks, and input schema validation,
//! each surfacing as a categorized error the HTTP layer can map to a
//! status code.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::GateResult;
use crate::registry::{ModelRegistry, Tensor};
use crate::scheduler::BatchScheduler;

/// Caller-supplied parameters that ride along with an inference request
#[derive(Debug, Clone, Default)]
pub struct InferParams {
    /// Correlation id echoed back in responses
    pub correlation_id: Option<String>,
    /// Recorded on the request; the shipped queue policy is FIFO
    pub priority: u32,
    /// Per-request completion deadline in milliseconds
    pub timeout_ms: Option<u64>,
}

/// Routes inbound requests into the batch scheduler
#[derive(Debug, Clone)]
pub struct RequestRouter {
    registry: Arc<RwLock<ModelRegistry>>,
    scheduler: Arc<RwLock<BatchScheduler>>,
}

impl RequestRouter {
    pub fn new(
        registry: Arc<RwLock<ModelRegistry>>,
        scheduler: Arc<RwLock<BatchScheduler>>,
    ) -> Self {
        RequestRouter {
            registry,
            scheduler,
        }
    }

    /// Admit a request: resolve, validate, enqueue
    ///
    /// Resolution picks the explicit version or the highest Ready one.
    /// Inputs are validated against the model's declared schemas before the
    /// request enters its queue, so backends only ever see well-formed
    /// batches.
    pub async fn route(
        &self,
        model: &str,
        version: Option<u64>,
        inputs: Vec<Tensor>,
        params: InferParams,
    ) -> GateResult<u32> {
        if inputs.is_empty() {
            return Err(crate::error::ModelGateError::InvalidRequest(
                "request carries no input tensors".to_string(),
            ));
        }

        let key = {
            let registry = self.registry.read().await;
            let key = registry.resolve(model, version)?;
            registry.validate_inputs(&key, &inputs)?;
            key
        };

        let request_id = {
            let mut scheduler = self.scheduler.write().await;
            scheduler.submit(key.clone(), inputs, params.correlation_id, params.priority)?
        };

        debug!(request_id, model = %key, "request routed");
        Ok(request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelGateError;
    use crate::registry::{DType, ModelConfig, TensorData, TensorSchema};
    use crate::scheduler::SchedulerConfig;

    fn echo_config() -> ModelConfig {
        ModelConfig {
            name: None,
            max_batch_size: 4,
            instance_count: 1,
            preferred_batch_sizes: vec![],
            max_queue_delay_ms: None,
            backend: None,
            inputs: vec![TensorSchema::new("in", DType::Fp32, vec![-1])],
            outputs: vec![TensorSchema::new("in", DType::Fp32, vec![-1])],
        }
    }

    fn input(len: usize) -> Tensor {
        Tensor::new(
            "in",
            DType::Fp32,
            vec![len as i64],
            TensorData::Fp64(vec![1.0; len]),
        )
    }

    async fn router_with_ready_model() -> RequestRouter {
        let mut registry = ModelRegistry::new();
        let registry_key = registry.register("echo", echo_config(), 1, None).unwrap();
        registry.mark_ready(&registry_key).unwrap();

        let registry = Arc::new(RwLock::new(registry));
        let scheduler = Arc::new(RwLock::new(BatchScheduler::new(SchedulerConfig::default())));
        RequestRouter::new(registry, scheduler)
    }

    #[tokio::test]
    async fn test_route_enqueues_request() {
        let router = router_with_ready_model().await;
        let id = router
            .route("echo", None, vec![input(3)], InferParams::default())
            .await
            .unwrap();
        assert_eq!(id, 0);

        let stats = router.scheduler.read().await.stats();
        assert_eq!(stats.pending_requests, 1);
    }

    #[tokio::test]
    async fn test_route_unknown_model() {
        let router = router_with_ready_model().await;
        let err = router
            .route("missing", None, vec![input(1)], InferParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelGateError::ModelNotFound(_)));
    }

    #[tokio::test]
    async fn test_route_unknown_version() {
        let router = router_with_ready_model().await;
        let err = router
            .route("echo", Some(7), vec![input(1)], InferParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelGateError::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_route_schema_mismatch() {
        let router = router_with_ready_model().await;
        let bad = Tensor::new(
            "in",
            DType::Int64,
            vec![2],
            TensorData::Int64(vec![1, 2]),
        );
        let err = router
            .route("echo", None, vec![bad], InferParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelGateError::SchemaViolation(_)));
    }

    #[tokio::test]
    async fn test_route_empty_inputs_rejected() {
        let router = router_with_ready_model().await;
        let err = router
            .route("echo", None, vec![], InferParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelGateError::InvalidRequest(_)));
    }
}
