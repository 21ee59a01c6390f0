//! Integration tests for the dispatch worker pool
//!
//! Exercises batch execution end-to-end through a gateway wired with test
//! backends: echo paths, retry on transient unavailability, hard failures,
//! and backend contract violations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use modelgate::dispatch::{
    BackendError, BackendRegistry, BackendResult, BatchPayload, ModelBackend, RequestOutputs,
    RetryConfig,
};
use modelgate::gateway::{Gateway, GatewayConfig};
use modelgate::registry::{DType, ModelConfig, Tensor, TensorData, TensorSchema};
use modelgate::router::InferParams;
use modelgate::scheduler::RequestState;

fn echo_outputs(batch: &BatchPayload) -> Vec<RequestOutputs> {
    batch
        .requests
        .iter()
        .map(|r| RequestOutputs {
            request_id: r.request_id,
            outputs: r.inputs.clone(),
        })
        .collect()
}

/// Fails with `Unavailable` a fixed number of times, then echoes
struct FlakyBackend {
    failures: AtomicUsize,
    calls: AtomicUsize,
}

impl FlakyBackend {
    fn new(failures: usize) -> Self {
        FlakyBackend {
            failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }
}

impl ModelBackend for FlakyBackend {
    fn name(&self) -> &str {
        "flaky"
    }

    fn execute(&self, batch: &BatchPayload) -> BackendResult<Vec<RequestOutputs>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| f.checked_sub(1))
            .is_ok()
        {
            return Err(BackendError::Unavailable("warming up".to_string()));
        }
        Ok(echo_outputs(batch))
    }
}

/// Always fails with a non-recoverable execution error
struct BrokenBackend;

impl ModelBackend for BrokenBackend {
    fn name(&self) -> &str {
        "broken"
    }

    fn execute(&self, _batch: &BatchPayload) -> BackendResult<Vec<RequestOutputs>> {
        Err(BackendError::Execution("kernel fault".to_string()))
    }
}

/// Violates the backend contract by returning no result sets
struct SilentBackend;

impl ModelBackend for SilentBackend {
    fn name(&self) -> &str {
        "silent"
    }

    fn execute(&self, _batch: &BatchPayload) -> BackendResult<Vec<RequestOutputs>> {
        Ok(vec![])
    }
}

/// Returns outputs that do not match the declared output schema
struct WrongShapeBackend;

impl ModelBackend for WrongShapeBackend {
    fn name(&self) -> &str {
        "wrong_shape"
    }

    fn execute(&self, batch: &BatchPayload) -> BackendResult<Vec<RequestOutputs>> {
        Ok(batch
            .requests
            .iter()
            .map(|r| RequestOutputs {
                request_id: r.request_id,
                outputs: vec![Tensor::new(
                    "unexpected",
                    DType::Int64,
                    vec![1],
                    TensorData::Int64(vec![0]),
                )],
            })
            .collect())
    }
}

fn model_config(backend: &str) -> ModelConfig {
    ModelConfig {
        name: None,
        max_batch_size: 4,
        instance_count: 1,
        preferred_batch_sizes: vec![],
        max_queue_delay_ms: Some(0),
        backend: Some(backend.to_string()),
        inputs: vec![TensorSchema::new("in", DType::Fp32, vec![-1])],
        outputs: vec![TensorSchema::new("in", DType::Fp32, vec![-1])],
    }
}

fn input(len: usize) -> Vec<Tensor> {
    vec![Tensor::new(
        "in",
        DType::Fp32,
        vec![len as i64],
        TensorData::Fp64(vec![3.0; len]),
    )]
}

async fn gateway_with(backends: BackendRegistry, retry: RetryConfig) -> Gateway {
    let config = GatewayConfig::new()
        .with_batch_timeout(Duration::ZERO)
        .with_poll_interval(Duration::from_millis(1))
        .with_retry_config(retry);
    let gateway = Gateway::with_parts(config, backends, None);
    gateway.start().await;
    gateway
}

async fn register_ready(gateway: &Gateway, name: &str, backend: &str) {
    let key = gateway
        .register_model(name, model_config(backend), 1, None)
        .await
        .unwrap();
    gateway.mark_model_ready(&key).await.unwrap();
}

#[tokio::test]
async fn test_loopback_round_trip() {
    let gateway = gateway_with(BackendRegistry::new(), RetryConfig::no_retry()).await;
    let key = gateway
        .register_model(
            "echo",
            ModelConfig {
                backend: None,
                ..model_config("loopback")
            },
            1,
            None,
        )
        .await
        .unwrap();
    gateway.mark_model_ready(&key).await.unwrap();

    let result = gateway
        .infer("echo", None, input(4), InferParams::default())
        .await
        .unwrap();
    assert_eq!(result.state, RequestState::Completed);
    assert_eq!(result.outputs, input(4));
    gateway.stop().await;
}

#[tokio::test]
async fn test_transient_unavailability_is_retried() {
    let flaky = Arc::new(FlakyBackend::new(2));
    let mut backends = BackendRegistry::new();
    backends.register(flaky.clone());

    let retry = RetryConfig::new()
        .with_max_retries(3)
        .with_initial_delay_ms(1)
        .with_jitter(false);
    let gateway = gateway_with(backends, retry).await;
    register_ready(&gateway, "shaky_model", "flaky").await;

    let result = gateway
        .infer("shaky_model", None, input(2), InferParams::default())
        .await
        .unwrap();
    assert_eq!(result.state, RequestState::Completed);
    // 2 failures + 1 success
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    gateway.stop().await;
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_batch() {
    let flaky = Arc::new(FlakyBackend::new(10));
    let mut backends = BackendRegistry::new();
    backends.register(flaky);

    let retry = RetryConfig::new()
        .with_max_retries(1)
        .with_initial_delay_ms(1)
        .with_jitter(false);
    let gateway = gateway_with(backends, retry).await;
    register_ready(&gateway, "shaky_model", "flaky").await;

    let result = gateway
        .infer("shaky_model", None, input(1), InferParams::default())
        .await
        .unwrap();
    assert_eq!(result.state, RequestState::Failed);
    assert!(result.error.unwrap().contains("unavailable"));
    gateway.stop().await;
}

#[tokio::test]
async fn test_execution_error_fails_without_retry() {
    let mut backends = BackendRegistry::new();
    backends.register(Arc::new(BrokenBackend));

    let gateway = gateway_with(backends, RetryConfig::default()).await;
    register_ready(&gateway, "broken_model", "broken").await;

    let result = gateway
        .infer("broken_model", None, input(1), InferParams::default())
        .await
        .unwrap();
    assert_eq!(result.state, RequestState::Failed);
    assert!(result.error.unwrap().contains("kernel fault"));
    gateway.stop().await;
}

#[tokio::test]
async fn test_result_count_mismatch_fails_batch() {
    let mut backends = BackendRegistry::new();
    backends.register(Arc::new(SilentBackend));

    let gateway = gateway_with(backends, RetryConfig::no_retry()).await;
    register_ready(&gateway, "silent_model", "silent").await;

    let result = gateway
        .infer("silent_model", None, input(1), InferParams::default())
        .await
        .unwrap();
    assert_eq!(result.state, RequestState::Failed);
    assert!(result.error.unwrap().contains("result sets"));
    gateway.stop().await;
}

#[tokio::test]
async fn test_output_schema_violation_fails_request() {
    let mut backends = BackendRegistry::new();
    backends.register(Arc::new(WrongShapeBackend));

    let gateway = gateway_with(backends, RetryConfig::no_retry()).await;
    register_ready(&gateway, "liar_model", "wrong_shape").await;

    let result = gateway
        .infer("liar_model", None, input(1), InferParams::default())
        .await
        .unwrap();
    assert_eq!(result.state, RequestState::Failed);
    assert!(result.error.unwrap().contains("output validation failed"));
    gateway.stop().await;
}

#[tokio::test]
async fn test_unknown_backend_fails_requests() {
    let gateway = gateway_with(BackendRegistry::new(), RetryConfig::no_retry()).await;
    register_ready(&gateway, "orphan_model", "missing_backend").await;

    let result = gateway
        .infer("orphan_model", None, input(1), InferParams::default())
        .await
        .unwrap();
    assert_eq!(result.state, RequestState::Failed);
    gateway.stop().await;
}

#[tokio::test]
async fn test_concurrent_requests_share_batches() {
    let gateway = gateway_with(BackendRegistry::new(), RetryConfig::no_retry()).await;
    let key = gateway
        .register_model(
            "echo",
            ModelConfig {
                backend: None,
                max_queue_delay_ms: Some(5),
                ..model_config("loopback")
            },
            1,
            None,
        )
        .await
        .unwrap();
    gateway.mark_model_ready(&key).await.unwrap();

    let mut handles = Vec::new();
    for i in 1..=8usize {
        let gateway = gateway.clone();
        handles.push(tokio::spawn(async move {
            gateway
                .infer("echo", None, input(i), InferParams::default())
                .await
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.state, RequestState::Completed);
        assert_eq!(result.outputs[0].data.len(), result.inputs[0].data.len());
    }
    gateway.stop().await;
}
