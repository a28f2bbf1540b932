//! Request and record types shared by the dispatcher, the resampler and the transports.
//!
//! Field names on the wire follow the camelCase JSON shape existing genome browser
//! clients already send (`chr1`, `zoomLevel`, `preRenderedWidth`, ...).

use serde::{Deserialize, Serialize};

/// Kind of source file, as reported by its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Numeric coverage track (bigWig-like)
    Coverage,
    /// Annotated feature track (bigBed-like)
    Feature,
    /// Raw alignments (BAM-like)
    Alignment,
    /// Raw reference sequence (2bit-like)
    Sequence,
}

/// One precomputed aggregation level of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionLevel {
    /// Index of the level inside the source file
    pub index: u32,
    /// Source units represented by one aggregated record
    pub reduction_factor: u64,
}

/// Header metadata of a source, fetched once per reader handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHeader {
    /// Kind of file behind the locator
    pub source_kind: SourceKind,
    /// Available resolution levels in source-declared order (not necessarily sorted)
    #[serde(default)]
    pub resolution_levels: Vec<ResolutionLevel>,
}

/// How raw sequence is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EncodingMode {
    /// One character per base
    #[default]
    Plain,
    /// One `[A, C, G, T]` indicator vector per base
    OneHot,
}

/// A single range request against one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    /// Source locator (`gs://bucket/object`, `s3://bucket/object` or `http(s)://...`)
    #[serde(rename = "url")]
    pub locator: String,
    /// Chromosome the range starts on
    pub chr1: String,
    /// Start position (0-based)
    pub start: u64,
    /// Chromosome the range ends on; defaults to `chr1`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chr2: Option<String>,
    /// End position (exclusive)
    pub end: u64,
    /// Approximate source units per displayed point
    #[serde(
        rename = "zoomLevel",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub requested_granularity: Option<u64>,
    /// Number of pixel buckets to condense the result into
    #[serde(
        rename = "preRenderedWidth",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub target_pixel_width: Option<u32>,
    /// One-hot encoding for sequence sources
    #[serde(
        rename = "oneHotEncodedFormat",
        default,
        deserialize_with = "one_hot_flag",
        serialize_with = "serialize_one_hot_flag"
    )]
    pub encoding: EncodingMode,
    /// Per-query credential overriding the batch credential
    #[serde(
        rename = "googleProject",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub credential: Option<String>,
}

fn one_hot_flag<'de, D>(deserializer: D) -> Result<EncodingMode, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let flag = Option::<bool>::deserialize(deserializer)?;
    Ok(if flag.unwrap_or(false) {
        EncodingMode::OneHot
    } else {
        EncodingMode::Plain
    })
}

fn serialize_one_hot_flag<S>(encoding: &EncodingMode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_bool(*encoding == EncodingMode::OneHot)
}

impl RangeQuery {
    /// Creates a single-chromosome query with no resolution or resampling hints.
    pub fn new(locator: impl Into<String>, chr: impl Into<String>, start: u64, end: u64) -> Self {
        RangeQuery {
            locator: locator.into(),
            chr1: chr.into(),
            start,
            chr2: None,
            end,
            requested_granularity: None,
            target_pixel_width: None,
            encoding: EncodingMode::Plain,
            credential: None,
        }
    }

    /// Sets the requested granularity (`zoomLevel`).
    pub fn with_granularity(mut self, granularity: u64) -> Self {
        self.requested_granularity = Some(granularity);
        self
    }

    /// Sets the target pixel width (`preRenderedWidth`).
    pub fn with_pixel_width(mut self, width: u32) -> Self {
        self.target_pixel_width = Some(width);
        self
    }

    /// Sets the end chromosome of a cross-chromosome query.
    pub fn with_end_chromosome(mut self, chr2: impl Into<String>) -> Self {
        self.chr2 = Some(chr2.into());
        self
    }

    /// End chromosome, falling back to the start chromosome.
    pub fn end_chromosome(&self) -> &str {
        self.chr2.as_deref().unwrap_or(&self.chr1)
    }

    /// True when the query stays on one chromosome.
    pub fn is_single_chromosome(&self) -> bool {
        self.end_chromosome() == self.chr1
    }

    /// Coordinates handed to the track readers.
    pub fn span(&self) -> RangeSpan {
        RangeSpan {
            chr1: self.chr1.clone(),
            start: self.start,
            chr2: self.end_chromosome().to_string(),
            end: self.end,
        }
    }
}

/// Possibly cross-chromosome coordinates of a track read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSpan {
    /// Start chromosome
    pub chr1: String,
    /// Start position
    pub start: u64,
    /// End chromosome
    pub chr2: String,
    /// End position
    pub end: u64,
}

/// Raw value at a range of positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRecord {
    /// Chromosome
    pub chr: String,
    /// Start position
    pub start: u64,
    /// End position
    pub end: u64,
    /// Value over `[start, end)`
    pub value: f64,
}

/// Pre-aggregated summary of an interval at some resolution level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoomRecord {
    /// Chromosome
    pub chr: String,
    /// Start position
    pub start: u64,
    /// End position
    pub end: u64,
    /// Number of bases with data
    pub valid_count: u64,
    /// Minimum value
    pub min_val: f64,
    /// Maximum value
    pub max_val: f64,
    /// Sum of values
    pub sum_data: f64,
    /// Sum of squared values
    pub sum_squares: f64,
}

/// Exon block of a feature record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exon {
    /// Start position
    pub start: u64,
    /// End position
    pub end: u64,
}

/// Annotated interval from a feature track.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRecord {
    /// Chromosome
    pub chr: String,
    /// Start position
    pub start: u64,
    /// End position
    pub end: u64,
    /// Feature name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Strand (`+`, `-` or `.`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strand: Option<String>,
    /// Coding start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cd_start: Option<u64>,
    /// Coding end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cd_end: Option<u64>,
    /// Display color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Exon blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exons: Option<Vec<Exon>>,
}

/// One slot of a resampled result.
///
/// `min` and `max` are `None` when no record overlapped the bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelBucket {
    /// Bucket index, `0..width`
    pub x: u32,
    /// First source position covered by the bucket
    pub start: u64,
    /// Position after the last one covered by the bucket
    pub end: u64,
    /// Smallest value seen in the bucket
    pub min: Option<f64>,
    /// Largest value seen in the bucket
    pub max: Option<f64>,
}

/// A track record whose shape is fixed when it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataRecord {
    /// Raw value record
    Value(ValueRecord),
    /// Pre-aggregated record
    Zoom(ZoomRecord),
    /// Feature record
    Feature(FeatureRecord),
    /// Resampled bucket
    Pixel(PixelBucket),
}

impl From<ValueRecord> for DataRecord {
    fn from(record: ValueRecord) -> Self {
        DataRecord::Value(record)
    }
}

impl From<ZoomRecord> for DataRecord {
    fn from(record: ZoomRecord) -> Self {
        DataRecord::Zoom(record)
    }
}

impl From<FeatureRecord> for DataRecord {
    fn from(record: FeatureRecord) -> Self {
        DataRecord::Feature(record)
    }
}

impl From<PixelBucket> for DataRecord {
    fn from(bucket: PixelBucket) -> Self {
        DataRecord::Pixel(bucket)
    }
}

/// Raw sequence in the requested encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SequenceData {
    /// Bases as text
    Bases(String),
    /// One-hot vectors, one per base
    OneHot(Vec<[u8; 4]>),
}

/// BGZF virtual file offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualOffset {
    /// Offset of the compressed block
    pub block_position: u64,
    /// Offset inside the uncompressed block
    pub data_position: u16,
}

/// Contiguous byte range of an alignment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// First virtual offset
    pub start: VirtualOffset,
    /// Virtual offset after the last record
    pub end: VirtualOffset,
}

/// Index data for one reference sequence of an alignment file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRefData {
    /// Chunks per bin number
    pub bin_index: std::collections::BTreeMap<u32, Vec<Chunk>>,
    /// Linear index offsets
    pub linear_index: Vec<VirtualOffset>,
}

/// Whole alignment index, one entry per reference id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentIndex {
    /// Per-reference index data, indexed by reference id
    pub ref_data: Vec<IndexRefData>,
    /// Offset of the first alignment block, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_alignment_block: Option<u64>,
}

/// Reference dictionary of an alignment file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentHeader {
    /// Chromosome name to reference id
    pub chrom_to_id: std::collections::BTreeMap<String, u32>,
    /// Reference id to chromosome name
    pub id_to_chrom: Vec<String>,
}

/// One aligned read.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alignment {
    /// Chromosome
    pub chr: String,
    /// 0-based leftmost position
    pub start: u64,
    /// SAM flag
    pub flag: u16,
    /// True for the forward strand
    pub strand: bool,
    /// Read name
    pub read_name: String,
    /// CIGAR string
    pub cigar: String,
    /// Mapping quality
    pub mapq: u8,
    /// Read bases
    pub seq: String,
    /// Base qualities
    pub phred_qual_scores: Vec<u8>,
    /// Length along the reference
    pub length_on_ref: u64,
}

/// Payload of one successful query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryData {
    /// Track records (raw, aggregated, feature or resampled)
    Records(Vec<DataRecord>),
    /// Raw sequence
    Sequence(SequenceData),
    /// Aligned reads
    Alignments(Vec<Alignment>),
}

impl QueryData {
    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        match self {
            QueryData::Records(records) => records.len(),
            QueryData::Sequence(SequenceData::Bases(bases)) => bases.len(),
            QueryData::Sequence(SequenceData::OneHot(vectors)) => vectors.len(),
            QueryData::Alignments(alignments) => alignments.len(),
        }
    }

    /// True when the query returned nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Track records, if this is a track result.
    pub fn records(&self) -> Option<&[DataRecord]> {
        match self {
            QueryData::Records(records) => Some(records),
            _ => None,
        }
    }
}

/// Request for the index data of one chromosome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentIndexRequest {
    /// Index file locator
    pub bai_url: String,
    /// Alignment file locator
    pub bam_url: String,
    /// Chromosome name
    pub chr: String,
    /// Optional credential
    #[serde(rename = "googleProject", default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Index data of one chromosome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentIndexData {
    /// Reference id of the chromosome
    pub ref_id: u32,
    /// Index data for the reference
    pub index_ref_data: IndexRefData,
}

/// Request for the alignments inside a set of index chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentRequest {
    /// Alignment file locator
    pub bam_url: String,
    /// Reference id
    pub ref_id: u32,
    /// Chromosome name
    pub chr: String,
    /// Start position
    pub start: u64,
    /// End position
    pub end: u64,
    /// Index chunks covering the range
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    /// Optional credential
    #[serde(rename = "googleProject", default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Request for the reference dictionary of an alignment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentHeaderRequest {
    /// Alignment file locator
    pub bam_url: String,
    /// Optional credential
    #[serde(rename = "googleProject", default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Request for the undecoded index bytes of one reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIndexRequest {
    /// Index file locator
    pub bai_url: String,
    /// Reference id
    pub ref_id: u32,
    /// Optional credential
    #[serde(rename = "googleProject", default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// A batch of range queries sharing an optional credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryBatch {
    /// Queries in response order
    pub requests: Vec<RangeQuery>,
    /// Credential used by queries that carry none
    #[serde(rename = "googleProject", default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_query_wire_shape() {
        let query: RangeQuery = serde_json::from_str(
            r#"{"url":"https://host/a.bigwig","chr1":"chr2","start":0,"chr2":"chr6","end":1000,"zoomLevel":100,"preRenderedWidth":50}"#,
        )
        .unwrap();
        assert_eq!(query.locator, "https://host/a.bigwig");
        assert_eq!(query.end_chromosome(), "chr6");
        assert!(!query.is_single_chromosome());
        assert_eq!(query.requested_granularity, Some(100));
        assert_eq!(query.target_pixel_width, Some(50));
        assert_eq!(query.encoding, EncodingMode::Plain);
    }

    #[test]
    fn test_one_hot_flag() {
        let query: RangeQuery = serde_json::from_str(
            r#"{"url":"gs://b/ref.2bit","chr1":"chr1","start":0,"end":10,"oneHotEncodedFormat":true}"#,
        )
        .unwrap();
        assert_eq!(query.encoding, EncodingMode::OneHot);
        assert_eq!(query.end_chromosome(), "chr1");
    }

    #[test]
    fn test_data_record_is_tagged() {
        let record = DataRecord::from(ValueRecord {
            chr: "chr14".to_string(),
            start: 19_485_969,
            end: 19_485_974,
            value: 1.0,
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "value");
        assert_eq!(json["chr"], "chr14");
        assert_eq!(json["start"], 19_485_969);
    }

    #[test]
    fn test_empty_bucket_serializes_null() {
        let bucket = PixelBucket {
            x: 3,
            start: 300,
            end: 400,
            min: None,
            max: None,
        };
        let json = serde_json::to_value(&bucket).unwrap();
        assert!(json["min"].is_null());
        assert!(json["max"].is_null());
    }
}
