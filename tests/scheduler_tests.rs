//! Integration tests for the batching scheduler

use std::time::Duration;

use modelgate::registry::{DType, ModelKey, Tensor, TensorData};
use modelgate::scheduler::{
    BatchScheduler, QueuePolicy, RequestState, SchedulerConfig, SchedulerError,
};

fn inputs(len: usize) -> Vec<Tensor> {
    vec![Tensor::new(
        "in",
        DType::Fp32,
        vec![len as i64],
        TensorData::Fp64(vec![1.0; len]),
    )]
}

fn immediate_scheduler() -> BatchScheduler {
    BatchScheduler::new(SchedulerConfig {
        batch_timeout: Duration::ZERO,
        ..Default::default()
    })
}

#[test]
fn test_requests_accumulate_per_model() {
    let mut scheduler = immediate_scheduler();
    let model_a = ModelKey::new("model_a", 1);
    let model_b = ModelKey::new("model_b", 1);

    for _ in 0..3 {
        scheduler.submit(model_a.clone(), inputs(1), None, 0).unwrap();
    }
    for _ in 0..2 {
        scheduler.submit(model_b.clone(), inputs(1), None, 0).unwrap();
    }

    let stats = scheduler.stats();
    assert_eq!(stats.pending_requests, 5);
    assert_eq!(stats.pending_per_model.get("model_a"), Some(&3));
    assert_eq!(stats.pending_per_model.get("model_b"), Some(&2));
}

#[test]
fn test_batch_never_mixes_models() {
    let mut scheduler = immediate_scheduler();
    let model_a = ModelKey::new("model_a", 1);
    let model_b = ModelKey::new("model_b", 1);

    scheduler.submit(model_a.clone(), inputs(1), None, 0).unwrap();
    scheduler.submit(model_b.clone(), inputs(1), None, 0).unwrap();
    scheduler.submit(model_a.clone(), inputs(1), None, 0).unwrap();

    let mut batches = Vec::new();
    while let Some(batch) = scheduler.next_batch() {
        assert!(batch.requests.iter().all(|r| r.key == batch.key));
        for request in &batch.requests {
            scheduler.complete_request(request.request_id, vec![]).unwrap();
        }
        batches.push(batch);
    }
    assert_eq!(batches.len(), 2);
}

#[test]
fn test_versions_queue_independently() {
    let mut scheduler = immediate_scheduler();
    let v1 = ModelKey::new("model", 1);
    let v2 = ModelKey::new("model", 2);

    scheduler.submit(v1.clone(), inputs(1), None, 0).unwrap();
    scheduler.submit(v2.clone(), inputs(1), None, 0).unwrap();

    let first = scheduler.next_batch().unwrap();
    let second = scheduler.next_batch().unwrap();
    assert_ne!(first.key, second.key);
    assert_eq!(first.size(), 1);
    assert_eq!(second.size(), 1);
}

#[test]
fn test_timeout_makes_partial_batch_due() {
    let mut scheduler = BatchScheduler::new(SchedulerConfig {
        batch_timeout: Duration::from_millis(10),
        default_max_batch_size: 8,
        ..Default::default()
    });
    let key = ModelKey::new("model", 1);
    scheduler.submit(key, inputs(1), None, 0).unwrap();

    // Not yet due
    assert!(scheduler.next_batch().is_none());

    std::thread::sleep(Duration::from_millis(20));
    let batch = scheduler.next_batch().expect("aged queue must be due");
    assert_eq!(batch.size(), 1);
}

#[test]
fn test_per_model_policy_overrides_default() {
    let mut scheduler = BatchScheduler::new(SchedulerConfig {
        batch_timeout: Duration::from_secs(60),
        default_max_batch_size: 32,
        ..Default::default()
    });
    let key = ModelKey::new("model", 1);
    scheduler.set_policy(
        key.clone(),
        QueuePolicy {
            max_batch_size: 2,
            preferred_batch_sizes: vec![],
            max_queue_delay: Duration::from_secs(60),
        },
    );

    scheduler.submit(key.clone(), inputs(1), None, 0).unwrap();
    assert!(scheduler.next_batch().is_none());

    scheduler.submit(key, inputs(1), None, 0).unwrap();
    let batch = scheduler.next_batch().expect("policy-sized queue is due");
    assert_eq!(batch.size(), 2);
}

#[test]
fn test_preferred_batch_sizes_shape_batches() {
    let mut scheduler = immediate_scheduler();
    let key = ModelKey::new("model", 1);
    scheduler.set_policy(
        key.clone(),
        QueuePolicy {
            max_batch_size: 16,
            preferred_batch_sizes: vec![4, 8],
            max_queue_delay: Duration::ZERO,
        },
    );

    for _ in 0..11 {
        scheduler.submit(key.clone(), inputs(1), None, 0).unwrap();
    }

    // 11 pending -> 8, then 3 remaining -> drained as 3 (below smallest
    // preferred size but due)
    let first = scheduler.next_batch().unwrap();
    assert_eq!(first.size(), 8);
    for r in &first.requests {
        scheduler.complete_request(r.request_id, vec![]).unwrap();
    }

    let second = scheduler.next_batch().unwrap();
    assert_eq!(second.size(), 3);
}

#[test]
fn test_request_lifecycle_through_scheduler() {
    let mut scheduler = immediate_scheduler();
    let key = ModelKey::new("model", 1);
    let id = scheduler.submit(key, inputs(2), None, 0).unwrap();

    assert_eq!(
        scheduler.get_request(id).unwrap().state,
        RequestState::Pending
    );

    let batch = scheduler.next_batch().unwrap();
    assert_eq!(
        scheduler.get_request(id).unwrap().state,
        RequestState::Processing
    );

    let outputs = batch.requests[0].inputs.clone();
    scheduler.complete_request(id, outputs).unwrap();
    let done = scheduler.get_request(id).unwrap();
    assert_eq!(done.state, RequestState::Completed);
    assert!(done.queue_wait().is_some());
    assert!(done.execution_time().is_some());
}

#[test]
fn test_cancelled_request_result_is_dropped() {
    let mut scheduler = immediate_scheduler();
    let key = ModelKey::new("model", 1);
    let id = scheduler.submit(key, inputs(1), None, 0).unwrap();
    scheduler.next_batch().unwrap();

    // Cancel mid-flight, then the worker reports back
    scheduler.cancel(id).unwrap();
    assert!(matches!(
        scheduler.complete_request(id, vec![]),
        Err(SchedulerError::RequestNotFound(_))
    ));
    assert_eq!(
        scheduler.get_request(id).unwrap().state,
        RequestState::Cancelled
    );
}

#[test]
fn test_capacity_rejection_names_model() {
    let mut scheduler = BatchScheduler::new(SchedulerConfig {
        max_queue_size: 1,
        batch_timeout: Duration::from_secs(60),
        ..Default::default()
    });
    let key = ModelKey::new("busy_model", 1);
    scheduler.submit(key.clone(), inputs(1), None, 0).unwrap();

    match scheduler.submit(key, inputs(1), None, 0) {
        Err(SchedulerError::QueueCapacityExceeded { model }) => {
            assert_eq!(model, "busy_model");
        }
        other => panic!("expected capacity error, got {other:?}"),
    }
}
