//! Reads against alignment files and their indexes.
//!
//! Alignment reads are capped to a short window of the reference; everything
//! wider is rejected before any byte is fetched.

use crate::cache::ReaderCache;
use crate::envelope::{ResultEnvelope, wrap_request};
use crate::error::{GatewayError, Result};
use crate::model::{
    Alignment, AlignmentHeader, AlignmentHeaderRequest, AlignmentIndexData, AlignmentIndexRequest,
    AlignmentRequest, RawIndexRequest,
};
use bytes::Bytes;
use futures::future::join_all;
use log::debug;

/// Widest alignment window served, in bases.
pub const MAX_ALIGNMENT_RANGE: u64 = 20_000;

/// Rejects alignment windows wider than `max_range` bases.
pub fn validate_alignment_range(start: u64, end: u64, max_range: u64) -> Result<()> {
    if end < start {
        return Err(GatewayError::Validation(format!(
            "Invalid alignment range: end {end} is before start {start}"
        )));
    }
    if end - start > max_range {
        return Err(GatewayError::Validation(format!(
            "Invalid base pair length. Only ranges < {max_range} bp supported."
        )));
    }
    Ok(())
}

/// Reference dictionary of an alignment file.
pub async fn read_alignment_header(
    cache: &ReaderCache,
    request: &AlignmentHeaderRequest,
) -> Result<AlignmentHeader> {
    let handle = cache
        .get(&request.bam_url, request.credential.as_deref())
        .await?;
    handle.reader().read_alignment_header().await
}

/// Undecoded index bytes of one reference.
pub async fn read_raw_index(cache: &ReaderCache, request: &RawIndexRequest) -> Result<Bytes> {
    let handle = cache
        .get(&request.bai_url, request.credential.as_deref())
        .await?;
    handle.reader().read_raw_alignment_index(request.ref_id).await
}

/// Resolves a chromosome to its reference id and returns that reference's index data.
pub async fn read_index_data(
    cache: &ReaderCache,
    request: &AlignmentIndexRequest,
) -> Result<AlignmentIndexData> {
    let credential = request.credential.as_deref();
    let (bam, bai) = futures::try_join!(
        cache.get(&request.bam_url, credential),
        cache.get(&request.bai_url, credential)
    )?;
    let (header, index) = futures::try_join!(
        bam.reader().read_alignment_header(),
        bai.reader().read_alignment_index()
    )?;
    let ref_id = *header.chrom_to_id.get(&request.chr).ok_or_else(|| {
        GatewayError::Format(format!(
            "Chromosome {} not found in {}",
            request.chr, request.bam_url
        ))
    })?;
    let index_ref_data = index
        .ref_data
        .get(ref_id as usize)
        .cloned()
        .ok_or_else(|| {
            GatewayError::Format(format!(
                "No index data for reference {} in {}",
                ref_id, request.bai_url
            ))
        })?;
    Ok(AlignmentIndexData {
        ref_id,
        index_ref_data,
    })
}

/// Alignments inside the request's index chunks, after checking the window size.
pub async fn read_alignments(
    cache: &ReaderCache,
    request: &AlignmentRequest,
    max_range: u64,
) -> Result<Vec<Alignment>> {
    validate_alignment_range(request.start, request.end, max_range)?;
    let handle = cache
        .get(&request.bam_url, request.credential.as_deref())
        .await?;
    let alignments = handle
        .reader()
        .read_alignment_data(
            &request.chunks,
            request.ref_id,
            &request.chr,
            request.start,
            request.end,
        )
        .await?;
    debug!(
        "Read {} alignments from {}:{}-{}",
        alignments.len(),
        request.chr,
        request.start,
        request.end
    );
    Ok(alignments)
}

/// Index lookups for a batch, one envelope per request in request order.
pub async fn read_index_batch(
    cache: &ReaderCache,
    requests: &[AlignmentIndexRequest],
) -> Vec<ResultEnvelope<AlignmentIndexData>> {
    join_all(
        requests
            .iter()
            .map(|request| wrap_request(read_index_data(cache, request))),
    )
    .await
}

/// Alignment reads for a batch, one envelope per request in request order.
pub async fn read_alignment_batch(
    cache: &ReaderCache,
    requests: &[AlignmentRequest],
    max_range: u64,
) -> Vec<ResultEnvelope<Vec<Alignment>>> {
    join_all(
        requests
            .iter()
            .map(|request| wrap_request(read_alignments(cache, request, max_range))),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_storage::ObjectStorageOptions;
    use crate::test_utils::{MemoryFactory, MemorySource, alignment};
    use std::sync::Arc;

    const BAM: &str = "http://test/reads.bam";
    const BAI: &str = "http://test/reads.bam.bai";

    fn cache() -> (Arc<MemoryFactory>, ReaderCache) {
        let source = MemorySource::alignments(vec![
            alignment("chr1", 100, 50, "r1"),
            alignment("chr2", 200, 50, "r2"),
            alignment("chr2", 30_000, 50, "r3"),
        ]);
        let factory = Arc::new(
            MemoryFactory::new()
                .with_source(BAM, source.clone())
                .with_source(BAI, source),
        );
        let cache = ReaderCache::new(factory.clone(), ObjectStorageOptions::default(), None);
        (factory, cache)
    }

    fn request(start: u64, end: u64) -> AlignmentRequest {
        AlignmentRequest {
            bam_url: BAM.to_string(),
            ref_id: 1,
            chr: "chr2".to_string(),
            start,
            end,
            chunks: Vec::new(),
            credential: None,
        }
    }

    #[test]
    fn test_range_cap() {
        assert!(validate_alignment_range(0, 20_000, MAX_ALIGNMENT_RANGE).is_ok());
        let err = validate_alignment_range(0, 20_001, MAX_ALIGNMENT_RANGE).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "Invalid base pair length. Only ranges < 20000 bp supported."
        );
        assert!(validate_alignment_range(10, 5, MAX_ALIGNMENT_RANGE).is_err());
    }

    #[tokio::test]
    async fn test_wide_window_reads_nothing() {
        let (factory, cache) = cache();
        let err = read_alignments(&cache, &request(0, 20_001), MAX_ALIGNMENT_RANGE)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(factory.open_count(BAM), 0);
        assert_eq!(factory.read_count(BAM), 0);
    }

    #[tokio::test]
    async fn test_reads_window() {
        let (_, cache) = cache();
        let alignments = read_alignments(&cache, &request(0, 20_000), MAX_ALIGNMENT_RANGE)
            .await
            .unwrap();
        assert_eq!(alignments.len(), 1);
        assert_eq!(alignments[0].read_name, "r2");
    }

    #[tokio::test]
    async fn test_index_lookup_by_chromosome() {
        let (_, cache) = cache();
        let request = AlignmentIndexRequest {
            bai_url: BAI.to_string(),
            bam_url: BAM.to_string(),
            chr: "chr2".to_string(),
            credential: None,
        };
        let data = read_index_data(&cache, &request).await.unwrap();
        assert_eq!(data.ref_id, 1);

        let missing = AlignmentIndexRequest {
            chr: "chrX".to_string(),
            ..request
        };
        let err = read_index_data(&cache, &missing).await.unwrap_err();
        assert_eq!(err.kind(), "FormatError");
    }

    #[tokio::test]
    async fn test_index_reads_skip_source_header() {
        let (factory, cache) = cache();
        let raw = RawIndexRequest {
            bai_url: BAI.to_string(),
            ref_id: 1,
            credential: None,
        };
        assert!(!read_raw_index(&cache, &raw).await.unwrap().is_empty());
        let lookup = AlignmentIndexRequest {
            bai_url: BAI.to_string(),
            bam_url: BAM.to_string(),
            chr: "chr1".to_string(),
            credential: None,
        };
        assert_eq!(read_index_data(&cache, &lookup).await.unwrap().ref_id, 0);
        assert_eq!(factory.open_count(BAI), 1);
        assert_eq!(factory.header_count(BAI), 0);
        assert_eq!(factory.header_count(BAM), 0);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let (_, cache) = cache();
        let mut unknown = request(0, 100);
        unknown.bam_url = "http://test/missing.bam".to_string();
        let envelopes = read_alignment_batch(
            &cache,
            &[request(0, 100), unknown, request(0, 50_000)],
            MAX_ALIGNMENT_RANGE,
        )
        .await;
        assert_eq!(envelopes.len(), 3);
        assert!(envelopes[0].is_ok());
        assert_eq!(envelopes[1].error().unwrap().errortype, "SourceFetchError");
        assert_eq!(envelopes[2].error().unwrap().errortype, "ValidationError");
    }
}
