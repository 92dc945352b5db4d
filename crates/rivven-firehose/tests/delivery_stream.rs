//! End-to-end delivery tests against the scripted mock firehose
//!
//! Run with: cargo test -p rivven-firehose --test delivery_stream

use rivven_firehose::prelude::*;
use rivven_firehose::testing::MockFirehose;
use rivven_firehose::{BufferConfig, DeliveryStreamConfig, RecordFormat, RetryPolicy};
use std::time::Duration;
use tokio::time::Instant;

fn person_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "firstName": {"type": "string", "maxLength": 3}
        },
        "required": ["firstName"]
    })
}

fn people(n: usize) -> Vec<Record> {
    (0..n).map(|i| json!({"firstName": "Don", "id": i})).collect()
}

#[tokio::test(start_paused = true)]
async fn accepts_a_single_record() {
    let firehose = Arc::new(MockFirehose::new());
    let stream = DeliveryStream::new("test", firehose.clone()).unwrap();

    stream.put_record(json!("hello firehose")).await.unwrap();

    assert_eq!(firehose.call_count(), 1);
    assert_eq!(firehose.batches()[0].texts(), vec!["hello firehose\n"]);
}

#[tokio::test(start_paused = true)]
async fn accepts_multiple_records_in_one_call() {
    let firehose = Arc::new(MockFirehose::new());
    let stream = DeliveryStream::json("test", firehose.clone()).unwrap();

    stream.put_records(people(3)).await.unwrap();

    assert_eq!(firehose.call_count(), 1);
    assert_eq!(firehose.batches()[0].len(), 3);
    assert_eq!(stream.stats().records_delivered, 3);
}

#[tokio::test(start_paused = true)]
async fn splits_large_calls_into_bounded_chunks() {
    let firehose = Arc::new(MockFirehose::new().with_latency(Duration::from_millis(20)));
    let stream = DeliveryStream::json("test", firehose.clone()).unwrap();

    let records = people(900);
    stream.put_records(records.clone()).await.unwrap();

    let batches = firehose.batches();
    let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![400, 400, 100]);
    assert!(firehose.max_in_flight() <= 3);

    // Concatenated payloads reconstruct the input in order
    let delivered: Vec<Value> = batches
        .iter()
        .flat_map(|b| b.texts())
        .map(|text| serde_json::from_str(text.trim_end()).unwrap())
        .collect();
    assert_eq!(delivered, records);
}

#[tokio::test(start_paused = true)]
async fn concurrency_respects_max_drains() {
    let firehose = Arc::new(MockFirehose::new().with_latency(Duration::from_millis(20)));
    let stream = DeliveryStream::builder("test", firehose.clone())
        .max_batch_size(10)
        .max_drains(2)
        .build()
        .unwrap();

    stream.put_records(people(95)).await.unwrap();

    assert_eq!(firehose.call_count(), 10);
    assert_eq!(firehose.max_in_flight(), 2);
}

#[tokio::test(start_paused = true)]
async fn rejects_records_that_do_not_match_the_schema() {
    let firehose = Arc::new(MockFirehose::new());
    let stream = DeliveryStream::builder("test", firehose.clone())
        .format(RecordFormat::Json)
        .schema(person_schema())
        .build()
        .unwrap();

    let mut records = people(4);
    records.insert(2, json!({"firstName": "Toolong"}));

    let errors = stream.put_records(records).await.unwrap_err();

    assert_eq!(errors.len(), 1);
    let error = &errors.as_slice()[0];
    assert_eq!(error.error_type(), "schema");
    assert_eq!(error.original_record(), Some(&json!({"firstName": "Toolong"})));
    assert_eq!(error.details()["instance_path"], json!("/firstName"));
    assert_eq!(firehose.submitted_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn accepts_records_that_match_the_schema() {
    let firehose = Arc::new(MockFirehose::new());
    let stream = DeliveryStream::builder("test", firehose.clone())
        .schema(person_schema())
        .build()
        .unwrap();

    stream.put_record(json!({"firstName": "Don"})).await.unwrap();
    assert_eq!(firehose.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn surfaces_transport_errors() {
    let firehose = Arc::new(MockFirehose::fail_with("OH NOES! Firehose Error!"));
    let stream = DeliveryStream::new("test", firehose.clone()).unwrap();

    let errors = stream.put_records(people(2)).await.unwrap_err();

    assert_eq!(errors.len(), 1);
    let error = &errors.as_slice()[0];
    assert!(error.is_transport());
    assert_eq!(error.description(), "OH NOES! Firehose Error!");
    assert_eq!(firehose.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_halt_reports_every_undelivered_record() {
    let firehose = Arc::new(MockFirehose::fail_with("down"));
    let stream = DeliveryStream::builder("test", firehose.clone())
        .max_batch_size(2)
        .max_drains(1)
        .build()
        .unwrap();

    let records = people(6);
    let errors = stream.put_records(records.clone()).await.unwrap_err();

    assert_eq!(firehose.call_count(), 1);
    assert_eq!(errors.counts(), (0, 1, 0));
    assert_eq!(errors.original_records(), records);
    assert_eq!(errors.record_count(), 6);
    assert_eq!(stream.stats().chunks_skipped, 2);
}

#[tokio::test(start_paused = true)]
async fn retries_only_the_rejected_records() {
    // First call rejects two of five records, everything after succeeds
    let firehose = Arc::new(MockFirehose::with_responder(|call, batch| {
        let results = (0..batch.len())
            .map(|i| {
                if call == 0 && (i == 1 || i == 3) {
                    RecordResult::rejected("ServiceUnavailableException", "Slow down.")
                } else {
                    RecordResult::accepted(format!("id-{}", i))
                }
            })
            .collect();
        Ok(BatchResponse::from_results(results))
    }));
    let stream = DeliveryStream::builder("test", firehose.clone())
        .retry_interval(Duration::from_millis(1500))
        .build()
        .unwrap();

    let start = Instant::now();
    let records: Vec<Record> = (0..5).map(|i| json!(format!("line {}", i))).collect();
    stream.put_records(records).await.unwrap();

    assert_eq!(firehose.call_count(), 2);
    assert!(start.elapsed() >= Duration::from_millis(1500));
    assert_eq!(firehose.batches()[1].texts(), vec!["line 1\n", "line 3\n"]);
}

#[tokio::test(start_paused = true)]
async fn json_retries_are_not_double_encoded() {
    let firehose = Arc::new(MockFirehose::new().reject_first_calls(3));
    let stream = DeliveryStream::json("test", firehose.clone()).unwrap();

    stream.put_record(json!({"firstName": "Al"})).await.unwrap();

    let texts: Vec<String> = firehose
        .batches()
        .iter()
        .flat_map(|b| b.texts())
        .collect();
    assert_eq!(texts.len(), 4);
    assert!(texts.iter().all(|t| t == "{\"firstName\":\"Al\"}\n"));
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_retries() {
    let firehose = Arc::new(MockFirehose::reject_always());
    let stream = DeliveryStream::builder("test", firehose.clone())
        .max_retries(3)
        .retry_interval(Duration::from_millis(10))
        .build()
        .unwrap();

    let errors = stream.put_records(people(2)).await.unwrap_err();

    let attempts = RetryPolicy::fixed(3, Duration::ZERO).max_attempts();
    assert_eq!(firehose.call_count(), attempts as usize);
    assert_eq!(errors.counts(), (0, 0, 2));
    assert_eq!(errors.original_records(), people(2));
    assert_eq!(stream.stats().records_failed, 2);
}

#[tokio::test(start_paused = true)]
async fn stream_from_yaml_config() {
    let config = DeliveryStreamConfig::from_yaml_str(
        "stream_name: yaml-stream\nformat: json\nmax_batch_size: 2\n",
    )
    .unwrap();
    let firehose = Arc::new(MockFirehose::new());
    let stream = DeliveryStream::from_config(config, firehose.clone()).unwrap();

    stream.put_records(people(5)).await.unwrap();

    let sizes: Vec<usize> = firehose.batches().iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert!(firehose.batches().iter().all(|b| b.stream_name == "yaml-stream"));
}

#[tokio::test(start_paused = true)]
async fn buffered_stream_flushes_on_size() {
    let firehose = Arc::new(MockFirehose::new());
    let stream = DeliveryStream::json("test", firehose.clone()).unwrap();
    let buffered =
        QueuableDeliveryStream::new(stream, BufferConfig::new(Duration::from_secs(30), 500));
    let start = Instant::now();

    buffered.put_records(people(500)).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(30));
    let sizes: Vec<usize> = firehose.batches().iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![400, 100]);
}

#[tokio::test(start_paused = true)]
async fn buffered_stream_flushes_on_time() {
    let firehose = Arc::new(MockFirehose::new());
    let stream = DeliveryStream::json("test", firehose.clone()).unwrap();
    let buffered = QueuableDeliveryStream::from_stream(stream);
    let start = Instant::now();

    buffered.put_records(people(10)).await.unwrap();

    assert!(start.elapsed() >= Duration::from_secs(30));
    assert_eq!(firehose.call_count(), 1);
    assert!(buffered.is_idle());
}

#[tokio::test(start_paused = true)]
async fn buffered_empty_cycle_makes_no_call() {
    let firehose = Arc::new(MockFirehose::new());
    let stream = DeliveryStream::new("test", firehose.clone()).unwrap();
    let buffered = QueuableDeliveryStream::from_stream(stream);

    buffered.put_records(Vec::new()).await.unwrap();

    assert_eq!(firehose.call_count(), 0);
}
