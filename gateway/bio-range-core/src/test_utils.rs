//! In-memory sources for exercising the gateway without a decoder or a network

use crate::error::{GatewayError, Result};
use crate::model::{
    Alignment, AlignmentHeader, AlignmentIndex, Chunk, EncodingMode, FeatureRecord, RangeSpan,
    ResolutionLevel, SequenceData, SourceHeader, SourceKind, ValueRecord, ZoomRecord,
};
use crate::object_storage::ByteRangeLoader;
use crate::reader::{ReaderFactory, SourceReader};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A source whose records live in memory.
#[derive(Clone)]
pub struct MemorySource {
    header: SourceHeader,
    values: Vec<ValueRecord>,
    zoom: HashMap<u32, Vec<ZoomRecord>>,
    features: Vec<FeatureRecord>,
    sequences: HashMap<String, String>,
    alignments: Vec<Alignment>,
    alignment_header: AlignmentHeader,
    alignment_index: AlignmentIndex,
    read_delay: Duration,
    header_delay: Duration,
    failure: Option<GatewayErrorTemplate>,
    header_calls: Arc<AtomicUsize>,
    read_calls: Arc<AtomicUsize>,
}

#[derive(Clone)]
enum GatewayErrorTemplate {
    Fetch(String),
    Format(String),
    Panic(String),
}

impl GatewayErrorTemplate {
    fn to_error(&self) -> GatewayError {
        match self {
            GatewayErrorTemplate::Fetch(message) => GatewayError::SourceFetch(message.clone()),
            GatewayErrorTemplate::Format(message) => GatewayError::Format(message.clone()),
            GatewayErrorTemplate::Panic(message) => panic!("{message}"),
        }
    }
}

impl MemorySource {
    fn empty(kind: SourceKind) -> Self {
        MemorySource {
            header: SourceHeader {
                source_kind: kind,
                resolution_levels: Vec::new(),
            },
            values: Vec::new(),
            zoom: HashMap::new(),
            features: Vec::new(),
            sequences: HashMap::new(),
            alignments: Vec::new(),
            alignment_header: AlignmentHeader::default(),
            alignment_index: AlignmentIndex::default(),
            read_delay: Duration::ZERO,
            header_delay: Duration::ZERO,
            failure: None,
            header_calls: Arc::new(AtomicUsize::new(0)),
            read_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Coverage track holding raw values.
    pub fn coverage(values: Vec<ValueRecord>) -> Self {
        MemorySource {
            values,
            ..Self::empty(SourceKind::Coverage)
        }
    }

    /// Feature track.
    pub fn features(features: Vec<FeatureRecord>) -> Self {
        MemorySource {
            features,
            ..Self::empty(SourceKind::Feature)
        }
    }

    /// Sequence source with one sequence per chromosome.
    pub fn sequence(sequences: &[(&str, &str)]) -> Self {
        MemorySource {
            sequences: sequences
                .iter()
                .map(|(chr, bases)| (chr.to_string(), bases.to_string()))
                .collect(),
            ..Self::empty(SourceKind::Sequence)
        }
    }

    /// Alignment source; the reference dictionary follows first appearance order.
    pub fn alignments(alignments: Vec<Alignment>) -> Self {
        let mut header = AlignmentHeader::default();
        for alignment in &alignments {
            if !header.chrom_to_id.contains_key(&alignment.chr) {
                header
                    .chrom_to_id
                    .insert(alignment.chr.clone(), header.id_to_chrom.len() as u32);
                header.id_to_chrom.push(alignment.chr.clone());
            }
        }
        let index = AlignmentIndex {
            ref_data: vec![Default::default(); header.id_to_chrom.len()],
            first_alignment_block: Some(0),
        };
        MemorySource {
            alignments,
            alignment_header: header,
            alignment_index: index,
            ..Self::empty(SourceKind::Alignment)
        }
    }

    /// Adds a resolution level with its records.
    pub fn with_level(mut self, index: u32, reduction_factor: u64, records: Vec<ZoomRecord>) -> Self {
        self.header.resolution_levels.push(ResolutionLevel {
            index,
            reduction_factor,
        });
        self.zoom.insert(index, records);
        self
    }

    /// Delays every data read.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Delays the header fetch.
    pub fn with_header_delay(mut self, delay: Duration) -> Self {
        self.header_delay = delay;
        self
    }

    /// Makes every data read fail with a fetch error.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(GatewayErrorTemplate::Fetch(message.to_string()));
        self
    }

    /// Makes every data read fail with a format error.
    pub fn malformed(mut self, message: &str) -> Self {
        self.failure = Some(GatewayErrorTemplate::Format(message.to_string()));
        self
    }

    /// Makes every data read panic, as a crashing decoder would.
    pub fn panicking(mut self, message: &str) -> Self {
        self.failure = Some(GatewayErrorTemplate::Panic(message.to_string()));
        self
    }

    /// Number of data reads served so far.
    pub fn read_count(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    async fn before_read(&self) -> Result<()> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        match &self.failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    fn chromosome_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        let chroms = self
            .values
            .iter()
            .map(|r| &r.chr)
            .chain(self.zoom.values().flatten().map(|r| &r.chr))
            .chain(self.features.iter().map(|r| &r.chr));
        for chr in chroms {
            if !order.contains(chr) {
                order.push(chr.clone());
            }
        }
        order
    }

    fn overlaps(&self, span: &RangeSpan, chr: &str, start: u64, end: u64) -> bool {
        if span.chr1 == span.chr2 {
            return chr == span.chr1 && end > span.start && start < span.end;
        }
        let order = self.chromosome_order();
        let position = |name: &str| order.iter().position(|c| c == name);
        match (position(&span.chr1), position(&span.chr2), position(chr)) {
            (Some(first), Some(last), Some(current)) => {
                (current > first && current < last)
                    || (current == first && end > span.start)
                    || (current == last && start < span.end)
            }
            _ => false,
        }
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn header(&self) -> Result<SourceHeader> {
        self.header_calls.fetch_add(1, Ordering::SeqCst);
        if !self.header_delay.is_zero() {
            tokio::time::sleep(self.header_delay).await;
        }
        Ok(self.header.clone())
    }

    async fn read_track_data(&self, span: &RangeSpan) -> Result<Vec<ValueRecord>> {
        self.before_read().await?;
        Ok(self
            .values
            .iter()
            .filter(|r| self.overlaps(span, &r.chr, r.start, r.end))
            .cloned()
            .collect())
    }

    async fn read_aggregated_data(
        &self,
        span: &RangeSpan,
        level_index: u32,
    ) -> Result<Vec<ZoomRecord>> {
        self.before_read().await?;
        let records = self.zoom.get(&level_index).ok_or_else(|| {
            GatewayError::Format(format!("No resolution level with index {level_index}"))
        })?;
        Ok(records
            .iter()
            .filter(|r| self.overlaps(span, &r.chr, r.start, r.end))
            .cloned()
            .collect())
    }

    async fn read_feature_data(&self, span: &RangeSpan) -> Result<Vec<FeatureRecord>> {
        self.before_read().await?;
        Ok(self
            .features
            .iter()
            .filter(|r| self.overlaps(span, &r.chr, r.start, r.end))
            .cloned()
            .collect())
    }

    async fn read_sequence_data(
        &self,
        chr: &str,
        start: u64,
        end: u64,
        encoding: EncodingMode,
    ) -> Result<SequenceData> {
        self.before_read().await?;
        let sequence = self
            .sequences
            .get(chr)
            .ok_or_else(|| GatewayError::Format(format!("Unknown chromosome {chr}")))?;
        let end = (end as usize).min(sequence.len());
        let start = (start as usize).min(end);
        let bases = &sequence[start..end];
        Ok(match encoding {
            EncodingMode::Plain => SequenceData::Bases(bases.to_string()),
            EncodingMode::OneHot => SequenceData::OneHot(
                bases
                    .bytes()
                    .map(|b| match b.to_ascii_uppercase() {
                        b'A' => [1, 0, 0, 0],
                        b'C' => [0, 1, 0, 0],
                        b'G' => [0, 0, 1, 0],
                        b'T' => [0, 0, 0, 1],
                        _ => [0, 0, 0, 0],
                    })
                    .collect(),
            ),
        })
    }

    async fn read_alignment_header(&self) -> Result<AlignmentHeader> {
        self.before_read().await?;
        Ok(self.alignment_header.clone())
    }

    async fn read_alignment_index(&self) -> Result<AlignmentIndex> {
        self.before_read().await?;
        Ok(self.alignment_index.clone())
    }

    async fn read_raw_alignment_index(&self, ref_id: u32) -> Result<Bytes> {
        self.before_read().await?;
        let data = self
            .alignment_index
            .ref_data
            .get(ref_id as usize)
            .ok_or_else(|| GatewayError::Format(format!("No index data for reference {ref_id}")))?;
        Ok(Bytes::from(serde_json::to_vec(data)?))
    }

    async fn read_alignment_data(
        &self,
        _chunks: &[Chunk],
        _ref_id: u32,
        chr: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<Alignment>> {
        self.read_alignment_range(chr, start, end).await
    }

    async fn read_alignment_range(
        &self,
        chr: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<Alignment>> {
        self.before_read().await?;
        Ok(self
            .alignments
            .iter()
            .filter(|a| a.chr == chr && a.start < end && a.start + a.length_on_ref > start)
            .cloned()
            .collect())
    }
}

/// Factory serving [`MemorySource`]s by locator.
#[derive(Default)]
pub struct MemoryFactory {
    sources: HashMap<String, MemorySource>,
    opens: Mutex<HashMap<String, usize>>,
}

impl MemoryFactory {
    /// Factory with no sources; every open fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source under a locator.
    pub fn with_source(mut self, locator: &str, source: MemorySource) -> Self {
        self.sources.insert(locator.to_string(), source);
        self
    }

    /// Number of readers opened for a locator.
    pub fn open_count(&self, locator: &str) -> usize {
        self.opens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(locator)
            .copied()
            .unwrap_or(0)
    }

    /// Number of header fetches served for a locator.
    pub fn header_count(&self, locator: &str) -> usize {
        self.sources
            .get(locator)
            .map_or(0, |s| s.header_calls.load(Ordering::SeqCst))
    }

    /// Number of data reads served for a locator.
    pub fn read_count(&self, locator: &str) -> usize {
        self.sources.get(locator).map_or(0, MemorySource::read_count)
    }
}

#[async_trait]
impl ReaderFactory for MemoryFactory {
    async fn open(&self, loader: Arc<dyn ByteRangeLoader>) -> Result<Arc<dyn SourceReader>> {
        let locator = loader.locator().to_string();
        *self
            .opens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(locator.clone())
            .or_default() += 1;
        match self.sources.get(&locator) {
            Some(source) => Ok(Arc::new(source.clone())),
            None => Err(GatewayError::SourceFetch(format!(
                "404 Not Found: {locator}"
            ))),
        }
    }
}

/// Raw value record on `chr`.
pub fn value_record(chr: &str, start: u64, end: u64, value: f64) -> ValueRecord {
    ValueRecord {
        chr: chr.to_string(),
        start,
        end,
        value,
    }
}

/// Zoom record on `chr` with the given bounds.
pub fn zoom_record(chr: &str, start: u64, end: u64, min_val: f64, max_val: f64) -> ZoomRecord {
    ZoomRecord {
        chr: chr.to_string(),
        start,
        end,
        valid_count: end - start,
        min_val,
        max_val,
        sum_data: (min_val + max_val) / 2.0 * (end - start) as f64,
        sum_squares: 0.0,
    }
}

/// Forward-strand alignment of `length` bases on `chr`.
pub fn alignment(chr: &str, start: u64, length: u64, name: &str) -> Alignment {
    Alignment {
        chr: chr.to_string(),
        start,
        flag: 0,
        strand: true,
        read_name: name.to_string(),
        cigar: format!("{length}M"),
        mapq: 60,
        seq: "A".repeat(length as usize),
        phred_qual_scores: vec![30; length as usize],
        length_on_ref: length,
    }
}
