use crate::AppState;
use crate::error::ApiError;
use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use gateway_bio_range_core::alignment::{
    read_alignment_batch, read_alignment_header, read_alignments, read_index_batch,
    read_raw_index,
};
use gateway_bio_range_core::model::{
    Alignment, AlignmentHeader, AlignmentHeaderRequest, AlignmentIndexData,
    AlignmentIndexRequest, AlignmentRequest, QueryBatch, QueryData, RangeQuery, RawIndexRequest,
};
use gateway_bio_range_core::{MultiplexedStreamer, ResultEnvelope};
use log::info;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

/// Content type of multiplexed bodies.
pub const MULTIPLEXED_CONTENT_TYPE: &str = "text/x-multiplexed-stream; charset=utf-8";

/// Frames waiting for the transport per streamed response.
const FRAME_CHANNEL_CAPACITY: usize = 64;

/// POST paths served by the router, as listed by `GET /rest`.
pub const POST_PATHS: &[&str] = &[
    "/big",
    "/big/batch",
    "/bam",
    "/bamHeader",
    "/bamIndex",
    "/bam/indexRequests",
    "/bam/requests",
];

/// Liveness check.
pub async fn healthz() -> impl IntoResponse {
    "ok"
}

/// Lists the POST paths.
pub async fn rest() -> Json<Vec<&'static str>> {
    Json(POST_PATHS.to_vec())
}

/// Streams every query of the body as one multiplexed response.
pub async fn big(State(state): State<AppState>, Json(queries): Json<Vec<RangeQuery>>) -> Response {
    info!("Streaming {} range queries", queries.len());
    let dispatcher = Arc::new(state.dispatcher(None));
    let (streamer, receiver) =
        MultiplexedStreamer::channel(state.config.stream_buffer_size, FRAME_CHANNEL_CAPACITY);
    tokio::spawn(dispatcher.dispatch_streaming(queries, streamer));

    let body = Body::from_stream(ReceiverStream::new(receiver).map(Ok::<_, Infallible>));
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, MULTIPLEXED_CONTENT_TYPE)],
        body,
    )
        .into_response()
}

/// Answers a batch of range queries with one envelope per query.
pub async fn big_batch(
    State(state): State<AppState>,
    Json(batch): Json<QueryBatch>,
) -> Json<Vec<ResultEnvelope<QueryData>>> {
    info!("Answering a batch of {} range queries", batch.requests.len());
    let dispatcher = state.dispatcher(batch.credential);
    Json(dispatcher.dispatch(&batch.requests).await)
}

/// Reads alignments overlapping one window.
pub async fn bam(
    State(state): State<AppState>,
    Json(request): Json<AlignmentRequest>,
) -> Result<Json<Vec<Alignment>>, ApiError> {
    let cache = state.cache(None);
    let alignments =
        read_alignments(&cache, &request, state.config.max_alignment_range).await?;
    Ok(Json(alignments))
}

/// Reads the header of an alignment file.
pub async fn bam_header(
    State(state): State<AppState>,
    Json(request): Json<AlignmentHeaderRequest>,
) -> Result<Json<AlignmentHeader>, ApiError> {
    let cache = state.cache(None);
    Ok(Json(read_alignment_header(&cache, &request).await?))
}

/// Returns the raw index bytes of one reference.
pub async fn bam_index(
    State(state): State<AppState>,
    Json(request): Json<RawIndexRequest>,
) -> Result<Response, ApiError> {
    let cache = state.cache(None);
    let bytes = read_raw_index(&cache, &request).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}

/// Resolves a batch of index lookups.
pub async fn bam_index_requests(
    State(state): State<AppState>,
    Json(requests): Json<Vec<AlignmentIndexRequest>>,
) -> Json<Vec<ResultEnvelope<AlignmentIndexData>>> {
    let cache = state.cache(None);
    Json(read_index_batch(&cache, &requests).await)
}

/// Reads a batch of alignment windows.
pub async fn bam_requests(
    State(state): State<AppState>,
    Json(requests): Json<Vec<AlignmentRequest>>,
) -> Json<Vec<ResultEnvelope<Vec<Alignment>>>> {
    let cache = state.cache(None);
    Json(read_alignment_batch(&cache, &requests, state.config.max_alignment_range).await)
}
