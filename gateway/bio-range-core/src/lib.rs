//! Core of the genomic range query gateway
//!
//! This crate answers batches of range queries against remote genomic files
//! (coverage tracks, feature tracks, reference sequences and read alignments). It
//! does not decode any file format itself: a decoder implements
//! [`reader::SourceReader`] and [`reader::ReaderFactory`], and this crate takes care of
//! everything around it:
//!
//! - **Object Storage Integration**: byte-range loaders for GCS, S3 and HTTP(S)
//!   locators via OpenDAL
//! - **Dispatch**: concurrent execution of a batch with results in input order
//! - **Resolution Selection**: picking the coarsest pre-aggregated level that still
//!   satisfies the requested granularity
//! - **Resampling**: condensing records into a fixed number of pixel buckets
//! - **Stream Multiplexing**: interleaving many result streams over one line-framed body
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gateway_bio_range_core::test_utils::{MemoryFactory, MemorySource, value_record};
//! use gateway_bio_range_core::{ObjectStorageOptions, RangeQuery, RequestDispatcher};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let factory = MemoryFactory::new().with_source(
//!     "https://example.org/a.bigwig",
//!     MemorySource::coverage(vec![value_record("chr1", 0, 10, 1.0)]),
//! );
//! let dispatcher =
//!     RequestDispatcher::new(Arc::new(factory), ObjectStorageOptions::default(), None);
//! let query = RangeQuery::new("https://example.org/a.bigwig", "chr1", 0, 1000)
//!     .with_pixel_width(100);
//! let results = dispatcher.dispatch(&[query]).await;
//! assert!(results[0].is_ok());
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`dispatch`]: batch fan-out and read path routing
//! - [`multiplex`]: line-framed stream multiplexing
//! - [`object_storage`]: locator parsing and byte-range loaders

#![warn(missing_docs)]

/// Alignment file reads and the alignment window cap
pub mod alignment;
/// Batch-scoped reader cache
pub mod cache;
/// Batch dispatch
pub mod dispatch;
/// Per-query result envelopes
pub mod envelope;
/// Error types
pub mod error;
/// Request, record and header types
pub mod model;
/// Stream multiplexing
pub mod multiplex;
/// Object storage integration for remote file access
pub mod object_storage;
/// Decoder contract
pub mod reader;
/// Pixel condensing
pub mod resample;
/// Resolution level selection
pub mod resolution;
/// In-memory sources for tests
pub mod test_utils;

pub use cache::{ReaderCache, ReaderHandle};
pub use dispatch::RequestDispatcher;
pub use envelope::{RequestError, ResultEnvelope, wrap_request};
pub use error::{GatewayError, Result};
pub use model::{DataRecord, QueryBatch, QueryData, RangeQuery, SourceHeader, SourceKind};
pub use multiplex::{MultiplexedStreamer, parse_multiplexed};
pub use object_storage::ObjectStorageOptions;
pub use reader::{ReaderFactory, SourceReader};
