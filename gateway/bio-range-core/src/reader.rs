//! Contract consumed from the binary-format decoding library.
//!
//! The gateway never parses file formats itself. A decoder crate implements
//! [`SourceReader`] for its file kinds and a [`ReaderFactory`] that builds a reader
//! on top of a [`ByteRangeLoader`]; the dispatcher only orchestrates calls
//! against these traits.

use crate::error::{GatewayError, Result};
use crate::model::{
    Alignment, AlignmentHeader, AlignmentIndex, Chunk, DataRecord, EncodingMode, FeatureRecord,
    RangeSpan, SequenceData, SourceHeader, ValueRecord, ZoomRecord,
};
use crate::object_storage::ByteRangeLoader;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt, stream};
use std::sync::Arc;

/// Read path chosen for a query once its header is known.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadPlan {
    /// Unreduced values of a coverage track
    Track(RangeSpan),
    /// Pre-aggregated records of one resolution level
    Aggregated {
        /// Coordinates of the read
        span: RangeSpan,
        /// Index of the selected resolution level
        level_index: u32,
    },
    /// Feature records
    Feature(RangeSpan),
    /// Raw sequence of one chromosome
    Sequence {
        /// Chromosome
        chr: String,
        /// Start position
        start: u64,
        /// End position
        end: u64,
        /// Requested encoding
        encoding: EncodingMode,
    },
    /// Raw alignments of one chromosome
    Alignment {
        /// Chromosome
        chr: String,
        /// Start position
        start: u64,
        /// End position
        end: u64,
    },
}

/// Item produced by a streamed read.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// Text fragment, concatenated with its neighbours on the wire
    Text(String),
    /// Structured record, batched into JSON arrays on the wire
    Record(serde_json::Value),
}

/// Owned stream of items from one query.
pub type ItemStream = BoxStream<'static, Result<StreamItem>>;

/// Range-addressed reads over one source.
///
/// All methods take `&self`: a reader is shared by every query of a batch that
/// targets the same locator and must not keep a per-call cursor.
#[async_trait]
pub trait SourceReader: Send + Sync + 'static {
    /// Header with the source kind and available resolution levels.
    async fn header(&self) -> Result<SourceHeader>;

    /// Unreduced values of a coverage track.
    async fn read_track_data(&self, span: &RangeSpan) -> Result<Vec<ValueRecord>>;

    /// Records of the resolution level with the given index.
    async fn read_aggregated_data(
        &self,
        span: &RangeSpan,
        level_index: u32,
    ) -> Result<Vec<ZoomRecord>>;

    /// Feature records.
    async fn read_feature_data(&self, span: &RangeSpan) -> Result<Vec<FeatureRecord>>;

    /// Raw sequence.
    async fn read_sequence_data(
        &self,
        chr: &str,
        start: u64,
        end: u64,
        encoding: EncodingMode,
    ) -> Result<SequenceData>;

    /// Reference dictionary of an alignment file.
    async fn read_alignment_header(&self) -> Result<AlignmentHeader>;

    /// Parsed alignment index.
    async fn read_alignment_index(&self) -> Result<AlignmentIndex>;

    /// Undecoded index bytes for one reference.
    async fn read_raw_alignment_index(&self, ref_id: u32) -> Result<Bytes>;

    /// Alignments stored in the given index chunks and overlapping the range.
    async fn read_alignment_data(
        &self,
        chunks: &[Chunk],
        ref_id: u32,
        chr: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<Alignment>>;

    /// Alignments overlapping the range, resolving the index internally.
    async fn read_alignment_range(&self, chr: &str, start: u64, end: u64)
    -> Result<Vec<Alignment>>;

    /// Streams the result of a read plan.
    ///
    /// The default implementation performs the whole read and then yields its
    /// entries one by one; decoders able to emit records incrementally override it.
    fn stream_plan(self: Arc<Self>, plan: ReadPlan) -> ItemStream {
        stream::once(async move { execute_for_stream(self.as_ref(), &plan).await })
            .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, GatewayError>)))
            .try_flatten()
            .boxed()
    }
}

async fn execute_for_stream<R: SourceReader + ?Sized>(
    reader: &R,
    plan: &ReadPlan,
) -> Result<Vec<StreamItem>> {
    let items = match plan {
        ReadPlan::Sequence {
            chr,
            start,
            end,
            encoding,
        } => match reader.read_sequence_data(chr, *start, *end, *encoding).await? {
            SequenceData::Bases(bases) => vec![StreamItem::Text(bases)],
            SequenceData::OneHot(vectors) => vectors
                .into_iter()
                .map(|v| serde_json::to_value(v).map(StreamItem::Record))
                .collect::<std::result::Result<_, _>>()?,
        },
        ReadPlan::Alignment { chr, start, end } => reader
            .read_alignment_range(chr, *start, *end)
            .await?
            .into_iter()
            .map(|a| serde_json::to_value(a).map(StreamItem::Record))
            .collect::<std::result::Result<_, _>>()?,
        _ => read_records(reader, plan)
            .await?
            .into_iter()
            .map(|r| serde_json::to_value(r).map(StreamItem::Record))
            .collect::<std::result::Result<_, _>>()?,
    };
    Ok(items)
}

/// Runs a track read plan and tags each record with its shape.
///
/// Sequence and alignment plans yield no track records.
pub async fn read_records<R: SourceReader + ?Sized>(
    reader: &R,
    plan: &ReadPlan,
) -> Result<Vec<DataRecord>> {
    let records = match plan {
        ReadPlan::Track(span) => reader
            .read_track_data(span)
            .await?
            .into_iter()
            .map(DataRecord::from)
            .collect(),
        ReadPlan::Aggregated { span, level_index } => reader
            .read_aggregated_data(span, *level_index)
            .await?
            .into_iter()
            .map(DataRecord::from)
            .collect(),
        ReadPlan::Feature(span) => reader
            .read_feature_data(span)
            .await?
            .into_iter()
            .map(DataRecord::from)
            .collect(),
        ReadPlan::Sequence { .. } | ReadPlan::Alignment { .. } => Vec::new(),
    };
    Ok(records)
}

/// Builds readers on top of byte-range loaders.
#[async_trait]
pub trait ReaderFactory: Send + Sync {
    /// Opens a reader for the object behind `loader`.
    async fn open(&self, loader: Arc<dyn ByteRangeLoader>) -> Result<Arc<dyn SourceReader>>;
}
