//! Behavior tests for the end-to-end ETL pipeline.
//!
//! These verify HOW a scheduled configuration flows through extract,
//! transform, and load against a scripted Refocus endpoint.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeRefocus, Stack};

use pyplyn_duct::model::test_support::sample_configuration;
use pyplyn_duct::model::{Load, Transform};
use pyplyn_duct::refocus::{RefocusClient, RefocusLoad, Sample};
use pyplyn_duct::transform::{InfoStatus, Threshold, ThresholdType};

const BREACHED_SAMPLE: &str = r#"[
    {"name": "usa.east.web|latency", "value": "200", "updatedAt": "2024-01-01T00:00:00Z"}
]"#;

const HEALTHY_SAMPLE: &str = r#"[
    {"name": "usa.east.web|latency", "value": "12.5", "updatedAt": "2024-01-01T00:00:00Z"}
]"#;

const QUIET_SAMPLE: &str = r#"[
    {"name": "usa.east.web|latency", "value": "5", "updatedAt": "2024-01-01T00:00:00Z"}
]"#;

fn graded_configuration() -> pyplyn_duct::model::Configuration {
    let mut configuration = sample_configuration("refocus-prod", 60_000);
    configuration.transforms = vec![Transform::Threshold(Threshold {
        threshold_type: ThresholdType::GreaterThan,
        critical_threshold: Some(100.0),
        warn_threshold: Some(50.0),
        info_threshold: Some(10.0),
    })];
    configuration.loads = vec![Load::Refocus(RefocusLoad {
        endpoint: "refocus-prod".to_string(),
        subject: "usa.east.web".to_string(),
        aspect: "latency-status".to_string(),
    })];
    configuration
}

async fn first_delivery(stack: &Stack) -> Vec<Sample> {
    tokio::time::sleep(Duration::from_millis(100)).await;
    stack.shutdown.initiate();
    stack.scheduler.drain().await;

    let upserts = stack.refocus.upserted();
    assert!(!upserts.is_empty(), "sink should have received a delivery");
    serde_json::from_str(&upserts[0]).expect("upsert body should be samples")
}

#[tokio::test]
async fn breached_sample_is_delivered_as_critical_status() {
    // Given: a sample far over the critical threshold
    let stack = Stack::new(FakeRefocus::serving(BREACHED_SAMPLE));

    // When: the scheduler fires the first run
    stack.scheduler.schedule(graded_configuration());
    let samples = first_delivery(&stack).await;

    // Then: the sink received a single CRIT sample
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].name, "usa.east.web|latency-status");
    assert_eq!(samples[0].value, "3");
}

#[tokio::test]
async fn ok_status_is_clamped_to_info_when_requested() {
    // Threshold grades 5 as OK; the trailing InfoStatus clamps OK up to INFO
    let stack = Stack::new(FakeRefocus::serving(QUIET_SAMPLE));

    let mut configuration = graded_configuration();
    configuration
        .transforms
        .push(Transform::InfoStatus(InfoStatus {}));

    stack.scheduler.schedule(configuration);
    let samples = first_delivery(&stack).await;

    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].value, "1");
}

#[tokio::test]
async fn default_configuration_relays_the_extracted_value() {
    // the default fixture applies LastDatapoint only, which is the identity
    // on the extract's single-column rows
    let stack = Stack::new(FakeRefocus::serving(HEALTHY_SAMPLE));

    stack
        .scheduler
        .schedule(sample_configuration("refocus-prod", 60_000));
    let samples = first_delivery(&stack).await;

    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].value, "12.5");
}

#[tokio::test]
async fn concurrent_authentication_issues_a_single_exchange() {
    let stack = Stack::new(FakeRefocus::serving(HEALTHY_SAMPLE));

    let (client, _cache) = stack
        .connectors
        .client_and_cache::<RefocusClient, Sample>("refocus-prod")
        .expect("client should build");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move { client.authenticate().await }));
    }
    for handle in handles {
        handle
            .await
            .expect("task should complete")
            .expect("auth should succeed");
    }

    assert_eq!(stack.refocus.auth_count(), 1);
}

#[tokio::test]
async fn pipeline_runs_are_timed_per_configuration() {
    let stack = Stack::new(FakeRefocus::serving(HEALTHY_SAMPLE));
    let configuration = sample_configuration("refocus-prod", 60_000);
    let key = format!("{:016x}", configuration.key());

    stack.scheduler.schedule(configuration);
    tokio::time::sleep(Duration::from_millis(100)).await;
    stack.shutdown.initiate();
    stack.scheduler.drain().await;

    let (count, _mean) = stack
        .status
        .timer_snapshot("pipeline", &key)
        .expect("pipeline timer should have recorded");
    assert!(count >= 1);
}
