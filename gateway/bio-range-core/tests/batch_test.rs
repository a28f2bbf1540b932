//! Integration tests for batch dispatch over an in-memory coverage track.
//!
//! The track holds 83 unit-value records on chr14 starting at 19485969, spaced
//! 5 bases apart.

use gateway_bio_range_core::model::{DataRecord, QueryBatch};
use gateway_bio_range_core::test_utils::{MemoryFactory, MemorySource, value_record};
use gateway_bio_range_core::{ObjectStorageOptions, RangeQuery, RequestDispatcher};
use std::sync::Arc;

const TRACK: &str = "https://test.host/testbw.bigwig";
const FIRST_START: u64 = 19_485_969;

fn track() -> MemorySource {
    MemorySource::coverage(
        (0..83)
            .map(|i| value_record("chr14", FIRST_START + i * 5, FIRST_START + i * 5 + 5, 1.0))
            .collect(),
    )
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn dispatcher() -> RequestDispatcher {
    init_logging();
    let factory = MemoryFactory::new().with_source(TRACK, track());
    RequestDispatcher::new(Arc::new(factory), ObjectStorageOptions::default(), None)
}

#[tokio::test]
async fn test_raw_track_passthrough() {
    let envelopes = dispatcher()
        .dispatch(&[RangeQuery::new(TRACK, "chr14", 19_485_000, 20_000_000)])
        .await;
    let records = envelopes[0].data().unwrap().records().unwrap();
    assert_eq!(records.len(), 83);
    match &records[0] {
        DataRecord::Value(value) => {
            assert_eq!(value.chr, "chr14");
            assert_eq!(value.start, 19_485_969);
            assert_eq!(value.end, 19_485_974);
            assert_eq!(value.value, 1.0);
        }
        other => panic!("expected a value record, got {other:?}"),
    }
}

#[tokio::test]
async fn test_pixel_width_yields_one_bucket_per_pixel() {
    let width = 37;
    let envelopes = dispatcher()
        .dispatch(&[
            RangeQuery::new(TRACK, "chr14", 19_485_000, 20_000_000).with_pixel_width(width)
        ])
        .await;
    let records = envelopes[0].data().unwrap().records().unwrap();
    assert_eq!(records.len(), width as usize);
    for (x, record) in records.iter().enumerate() {
        match record {
            DataRecord::Pixel(bucket) => assert_eq!(bucket.x, x as u32),
            other => panic!("expected a pixel bucket, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_batch_wire_shape() {
    init_logging();
    let batch: QueryBatch = serde_json::from_str(&format!(
        r#"{{"requests":[
            {{"url":"{TRACK}","chr1":"chr14","start":19485969,"end":19485974}},
            {{"url":"gs:/","chr1":"chr14","start":0,"end":10}}
        ]}}"#
    ))
    .unwrap();
    let factory = MemoryFactory::new().with_source(TRACK, track());
    let dispatcher = RequestDispatcher::new(
        Arc::new(factory),
        ObjectStorageOptions::default(),
        batch.credential.clone(),
    );
    let envelopes = dispatcher.dispatch(&batch.requests).await;
    let json = serde_json::to_value(&envelopes).unwrap();

    assert_eq!(json[0]["data"][0]["type"], "value");
    assert_eq!(json[0]["data"][0]["start"], 19_485_969);
    assert!(json[0].get("error").is_none());
    assert_eq!(json[1]["error"]["errortype"], "ValidationError");
    assert!(json[1].get("data").is_none());
}
