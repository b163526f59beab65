//! Property-based tests for the upload buffer bound and requeue order

use std::sync::Arc;

use chrono::Utc;
use eventlog::error::UploadError;
use eventlog::telemetry::upload::{BufferConfig, UploadBatch, UploadPipeline};
use eventlog::telemetry::{NoBackgroundHost, Parameters};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Enqueue,
    Sync,
    Succeed,
    Fail,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => Just(Op::Enqueue),
        2 => Just(Op::Sync),
        1 => Just(Op::Succeed),
        1 => Just(Op::Fail),
    ]
}

fn pipeline(max_buffer_size: usize) -> UploadPipeline {
    let config = BufferConfig {
        enabled: true,
        max_buffer_size,
        sync_buffer_size_threshold: 0,
        ..BufferConfig::default()
    };
    UploadPipeline::new(config, Arc::new(NoBackgroundHost), Utc::now())
}

fn names(pipeline: &UploadPipeline) -> Vec<String> {
    pipeline
        .records()
        .map(|r| r["event"].as_str().unwrap().to_string())
        .collect()
}

proptest! {
    /// Buffered plus in-flight records never exceed the configured maximum,
    /// whatever the interleaving of enqueues, syncs and upload outcomes.
    #[test]
    fn test_buffer_never_exceeds_max(
        max in 1usize..20,
        ops in proptest::collection::vec(op(), 0..200),
    ) {
        let mut pipeline = pipeline(max);
        let mut in_flight: Option<UploadBatch> = None;
        let now = Utc::now();

        for (i, op) in ops.into_iter().enumerate() {
            match op {
                Op::Enqueue => {
                    pipeline.enqueue(&format!("e{}", i), &Parameters::new(), now);
                }
                Op::Sync => {
                    if let Some(batch) = pipeline.begin_sync() {
                        prop_assert!(in_flight.is_none());
                        prop_assert!(!batch.records.is_empty());
                        in_flight = Some(batch);
                    }
                }
                Op::Succeed => {
                    if let Some(batch) = in_flight.take() {
                        prop_assert!(pipeline.finish_upload(batch.id, Ok(()), now));
                    }
                }
                Op::Fail => {
                    if let Some(batch) = in_flight.take() {
                        prop_assert!(pipeline.finish_upload(batch.id, Err(UploadError::Timeout), now));
                    }
                }
            }
            let stats = pipeline.stats();
            prop_assert!(stats.buffered + stats.in_flight <= max);
            prop_assert!(pipeline.len() <= max);
            prop_assert_eq!(pipeline.upload_in_flight(), in_flight.is_some());
        }
    }

    /// A failed snapshot goes back ahead of everything enqueued meanwhile,
    /// preserving the original order.
    #[test]
    fn test_failed_upload_preserves_order(
        before in 1usize..20,
        during in 0usize..20,
    ) {
        let mut pipeline = pipeline(before + during);
        let now = Utc::now();
        let expected: Vec<String> = (0..before + during).map(|i| format!("e{}", i)).collect();

        for name in &expected[..before] {
            pipeline.enqueue(name, &Parameters::new(), now);
        }
        let batch = pipeline.begin_sync().unwrap();
        for name in &expected[before..] {
            pipeline.enqueue(name, &Parameters::new(), now);
        }
        pipeline.finish_upload(batch.id, Err(UploadError::Timeout), now);

        prop_assert_eq!(names(&pipeline), expected);
        prop_assert!(!pipeline.upload_in_flight());
    }
}
