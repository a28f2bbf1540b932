//! Fan-out of a batch of range queries.
//!
//! Every query of a batch runs concurrently against a reader shared through the
//! batch's [`ReaderCache`]. Results are delivered in input order, either
//! collected into [`ResultEnvelope`]s or written as they arrive to a
//! [`MultiplexedStreamer`].

use crate::alignment::{MAX_ALIGNMENT_RANGE, validate_alignment_range};
use crate::cache::ReaderCache;
use crate::envelope::{ResultEnvelope, wrap_request};
use crate::error::{GatewayError, Result};
use crate::model::{DataRecord, QueryData, RangeQuery, SequenceData, SourceHeader, SourceKind};
use crate::multiplex::MultiplexedStreamer;
use crate::object_storage::ObjectStorageOptions;
use crate::reader::{ItemStream, ReadPlan, ReaderFactory, SourceReader, StreamItem, read_records};
use crate::resample::{condense_values, condense_zoom};
use crate::resolution::select_resolution;
use futures::future::join_all;
use futures::{StreamExt, stream};
use log::{debug, warn};
use std::sync::Arc;

/// Chooses the read path of a query from its source header.
///
/// Fails only for requests that must be rejected before any data read.
pub fn plan_query(
    query: &RangeQuery,
    header: &SourceHeader,
    max_alignment_range: u64,
) -> Result<ReadPlan> {
    if query.is_single_chromosome() && query.end <= query.start {
        return Err(GatewayError::Validation(format!(
            "Invalid range {}:{}-{}",
            query.chr1, query.start, query.end
        )));
    }
    let plan = match header.source_kind {
        SourceKind::Sequence => ReadPlan::Sequence {
            chr: query.chr1.clone(),
            start: query.start,
            end: query.end,
            encoding: query.encoding,
        },
        SourceKind::Alignment => {
            validate_alignment_range(query.start, query.end, max_alignment_range)?;
            ReadPlan::Alignment {
                chr: query.chr1.clone(),
                start: query.start,
                end: query.end,
            }
        }
        kind => match select_resolution(query.requested_granularity, &header.resolution_levels) {
            Some(level) => ReadPlan::Aggregated {
                span: query.span(),
                level_index: level.index,
            },
            None if kind == SourceKind::Coverage => ReadPlan::Track(query.span()),
            None => ReadPlan::Feature(query.span()),
        },
    };
    Ok(plan)
}

/// Pixel width to condense into, if condensing applies to this query and plan.
fn resample_width(query: &RangeQuery, plan: &ReadPlan) -> Option<u32> {
    let width = query.target_pixel_width?;
    if !matches!(plan, ReadPlan::Track(_) | ReadPlan::Aggregated { .. }) {
        return None;
    }
    if !query.is_single_chromosome() {
        debug!(
            "Skipping pixel condensing for cross-chromosome query {}:{}-{}:{}",
            query.chr1,
            query.start,
            query.end_chromosome(),
            query.end
        );
        return None;
    }
    Some(width)
}

/// Runs a plan to completion and applies pixel condensing where requested.
pub async fn execute_plan<R: SourceReader + ?Sized>(
    reader: &R,
    query: &RangeQuery,
    plan: &ReadPlan,
) -> Result<QueryData> {
    let width = resample_width(query, plan);
    let data = match (plan, width) {
        (
            ReadPlan::Sequence {
                chr,
                start,
                end,
                encoding,
            },
            _,
        ) => QueryData::Sequence(
            reader
                .read_sequence_data(chr, *start, *end, *encoding)
                .await?,
        ),
        (ReadPlan::Alignment { chr, start, end }, _) => {
            QueryData::Alignments(reader.read_alignment_range(chr, *start, *end).await?)
        }
        (ReadPlan::Track(span), Some(width)) => {
            let values = reader.read_track_data(span).await?;
            QueryData::Records(
                condense_values(&values, span.start, span.end, width)
                    .into_iter()
                    .map(DataRecord::from)
                    .collect(),
            )
        }
        (ReadPlan::Aggregated { span, level_index }, Some(width)) => {
            let records = reader.read_aggregated_data(span, *level_index).await?;
            QueryData::Records(
                condense_zoom(&records, span.start, span.end, width)
                    .into_iter()
                    .map(DataRecord::from)
                    .collect(),
            )
        }
        _ => QueryData::Records(read_records(reader, plan).await?),
    };
    Ok(data)
}

fn into_items(data: QueryData) -> Result<Vec<StreamItem>> {
    let items = match data {
        QueryData::Sequence(SequenceData::Bases(bases)) => vec![StreamItem::Text(bases)],
        QueryData::Sequence(SequenceData::OneHot(vectors)) => vectors
            .into_iter()
            .map(|v| serde_json::to_value(v).map(StreamItem::Record))
            .collect::<std::result::Result<_, _>>()?,
        QueryData::Records(records) => records
            .into_iter()
            .map(|r| serde_json::to_value(r).map(StreamItem::Record))
            .collect::<std::result::Result<_, _>>()?,
        QueryData::Alignments(alignments) => alignments
            .into_iter()
            .map(|a| serde_json::to_value(a).map(StreamItem::Record))
            .collect::<std::result::Result<_, _>>()?,
    };
    Ok(items)
}

/// Answers the queries of one batch.
///
/// Owns the batch's reader cache: readers opened for one batch are released with it.
pub struct RequestDispatcher {
    cache: ReaderCache,
    max_alignment_range: u64,
}

impl RequestDispatcher {
    /// Creates a dispatcher for one batch.
    pub fn new(
        factory: Arc<dyn ReaderFactory>,
        options: ObjectStorageOptions,
        credential: Option<String>,
    ) -> Self {
        RequestDispatcher {
            cache: ReaderCache::new(factory, options, credential),
            max_alignment_range: MAX_ALIGNMENT_RANGE,
        }
    }

    /// Overrides the widest alignment window served.
    pub fn with_max_alignment_range(mut self, max_alignment_range: u64) -> Self {
        self.max_alignment_range = max_alignment_range;
        self
    }

    /// Reader cache of the batch.
    pub fn cache(&self) -> &ReaderCache {
        &self.cache
    }

    /// Widest alignment window served.
    pub fn max_alignment_range(&self) -> u64 {
        self.max_alignment_range
    }

    /// Answers one query.
    pub async fn execute(&self, query: &RangeQuery) -> Result<QueryData> {
        let handle = self
            .cache
            .get(&query.locator, query.credential.as_deref())
            .await?;
        let plan = plan_query(query, handle.header().await?, self.max_alignment_range)?;
        debug!("Reading {} with {:?}", query.locator, plan);
        execute_plan(handle.reader().as_ref(), query, &plan).await
    }

    /// Answers every query concurrently.
    ///
    /// The returned envelopes follow the order of `queries`; a failing query only
    /// affects its own envelope.
    pub async fn dispatch(&self, queries: &[RangeQuery]) -> Vec<ResultEnvelope<QueryData>> {
        join_all(queries.iter().map(|query| wrap_request(self.execute(query)))).await
    }

    /// Opens the item stream of one query.
    ///
    /// Failures before the first item are reported as the stream's only item.
    pub async fn open_stream(&self, query: &RangeQuery) -> ItemStream {
        match self.prepare_stream(query).await {
            Ok(items) => items,
            Err(err) => stream::iter(vec![Err::<StreamItem, _>(err)]).boxed(),
        }
    }

    async fn prepare_stream(&self, query: &RangeQuery) -> Result<ItemStream> {
        let handle = self
            .cache
            .get(&query.locator, query.credential.as_deref())
            .await?;
        let plan = plan_query(query, handle.header().await?, self.max_alignment_range)?;
        if resample_width(query, &plan).is_some() {
            // Condensing needs every record before the first bucket is final.
            let data = execute_plan(handle.reader().as_ref(), query, &plan).await?;
            let items = into_items(data)?;
            return Ok(stream::iter(items.into_iter().map(Ok::<_, GatewayError>)).boxed());
        }
        Ok(handle.reader().clone().stream_plan(plan))
    }

    /// Streams every query of the batch through `streamer`, one task per query.
    ///
    /// Completes when every producer has settled. A producer that dies before
    /// ending its stream gets an `ERROR` frame in its place. The streamer is
    /// dropped at the end, so the multiplexed body ends once this future returns.
    pub async fn dispatch_streaming(
        self: Arc<Self>,
        queries: Vec<RangeQuery>,
        streamer: MultiplexedStreamer,
    ) {
        let producers: Vec<_> = queries
            .into_iter()
            .enumerate()
            .map(|(index, query)| {
                let dispatcher = self.clone();
                let streamer = streamer.clone();
                tokio::spawn(async move {
                    let items = dispatcher.open_stream(&query).await;
                    streamer.pipe(index, items).await
                })
            })
            .collect();
        for (index, producer) in join_all(producers).await.into_iter().enumerate() {
            if let Err(err) = producer {
                warn!("Producer for stream {} did not finish: {}", index, err);
                streamer
                    .fail(index, &GatewayError::from(err).to_string())
                    .await;
            }
        }
    }
}
