//! In-process tests of every route against in-memory sources.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use gateway_bio_range_core::multiplex::{Terminal, parse_multiplexed};
use gateway_bio_range_core::test_utils::{MemoryFactory, MemorySource, alignment, value_record};
use gateway_bio_range_server::handlers::MULTIPLEXED_CONTENT_TYPE;
use gateway_bio_range_server::{AppState, ServerConfig, router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const TRACK: &str = "http://test.host/track.bigwig";
const BAM: &str = "http://test.host/reads.bam";
const BAI: &str = "http://test.host/reads.bam.bai";

fn app() -> Router {
    let _ = env_logger::builder().is_test(true).try_init();
    let reads = MemorySource::alignments(vec![
        alignment("chr1", 100, 50, "r1"),
        alignment("chr2", 200, 50, "r2"),
    ]);
    let factory = MemoryFactory::new()
        .with_source(
            TRACK,
            MemorySource::coverage(
                (0..10)
                    .map(|i| value_record("chr1", i * 100, i * 100 + 100, i as f64))
                    .collect(),
            ),
        )
        .with_source(BAM, reads.clone())
        .with_source(BAI, reads);
    router(AppState::new(Arc::new(factory), ServerConfig::default()))
}

async fn post(app: Router, path: &str, body: Value) -> (StatusCode, Option<String>, Vec<u8>) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, bytes.to_vec())
}

async fn get(app: Router, path: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder().uri(path).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn test_healthz() {
    let (status, body) = get(app(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_rest_lists_post_paths() {
    let (status, body) = get(app(), "/rest").await;
    assert_eq!(status, StatusCode::OK);
    let paths: Vec<String> = serde_json::from_slice(&body).unwrap();
    assert!(paths.contains(&"/big".to_string()));
    assert!(paths.contains(&"/bam".to_string()));
}

#[tokio::test]
async fn test_big_streams_multiplexed_body() {
    let (status, content_type, body) = post(
        app(),
        "/big",
        json!([
            {"url": TRACK, "chr1": "chr1", "start": 0, "end": 1000},
            {"url": "http://test.host/missing.bigwig", "chr1": "chr1", "start": 0, "end": 1000},
            {"url": TRACK, "chr1": "chr1", "start": 0, "end": 1000, "preRenderedWidth": 5}
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(MULTIPLEXED_CONTENT_TYPE));

    let body = String::from_utf8(body).unwrap();
    let streams = parse_multiplexed(&body).unwrap();
    assert_eq!(streams.len(), 3);
    assert_eq!(streams[&0].records().unwrap().len(), 10);
    assert_eq!(streams[&0].terminal, Terminal::End);
    assert!(matches!(streams[&1].terminal, Terminal::Error(_)));
    let pixels = streams[&2].records().unwrap();
    assert_eq!(pixels.len(), 5);
    assert_eq!(pixels[0]["min"], 0.0);
    assert_eq!(pixels[0]["max"], 1.0);
}

#[tokio::test]
async fn test_big_rejects_malformed_body() {
    let (status, _, _) = post(app(), "/big", json!({"url": TRACK})).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_big_batch_keeps_order() {
    let (status, _, body) = post(
        app(),
        "/big/batch",
        json!({
            "requests": [
                {"url": "ftp://test.host/a.bigwig", "chr1": "chr1", "start": 0, "end": 10},
                {"url": TRACK, "chr1": "chr1", "start": 0, "end": 250}
            ],
            "googleProject": "billing-project"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let envelopes: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(envelopes[0]["error"]["errortype"], "ValidationError");
    assert_eq!(envelopes[1]["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_bam_window_cap() {
    let request = |end: u64| {
        json!({"bamUrl": BAM, "refId": 0, "chr": "chr1", "start": 0, "end": end, "chunks": []})
    };
    let (status, _, body) = post(app(), "/bam", request(20_000)).await;
    assert_eq!(status, StatusCode::OK);
    let alignments: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(alignments[0]["readName"], "r1");

    let (status, _, body) = post(app(), "/bam", request(20_001)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["errortype"], "ValidationError");
}

#[tokio::test]
async fn test_bam_header() {
    let (status, _, body) = post(app(), "/bamHeader", json!({"bamUrl": BAM})).await;
    assert_eq!(status, StatusCode::OK);
    let header: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(header["chromToId"]["chr2"], 1);

    let (status, _, _) = post(
        app(),
        "/bamHeader",
        json!({"bamUrl": "http://test.host/missing.bam"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_bam_index_is_raw_bytes() {
    let (status, content_type, body) =
        post(app(), "/bamIndex", json!({"baiUrl": BAI, "refId": 1})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/octet-stream"));
    assert!(!body.is_empty());
}

#[tokio::test]
async fn test_bam_index_requests() {
    let (status, _, body) = post(
        app(),
        "/bam/indexRequests",
        json!([
            {"baiUrl": BAI, "bamUrl": BAM, "chr": "chr2"},
            {"baiUrl": BAI, "bamUrl": BAM, "chr": "chrX"}
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let envelopes: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(envelopes[0]["data"]["refId"], 1);
    assert_eq!(envelopes[1]["error"]["errortype"], "FormatError");
}

#[tokio::test]
async fn test_bam_requests() {
    let (status, _, body) = post(
        app(),
        "/bam/requests",
        json!([
            {"bamUrl": BAM, "refId": 1, "chr": "chr2", "start": 0, "end": 1000},
            {"bamUrl": BAM, "refId": 1, "chr": "chr2", "start": 0, "end": 100000}
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let envelopes: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(envelopes[0]["data"][0]["readName"], "r2");
    assert_eq!(envelopes[1]["error"]["errortype"], "ValidationError");
}
