//! Batch-scoped cache of reader handles.
//!
//! A batch usually holds many queries against a handful of files. Each distinct
//! `(locator, credential)` pair gets exactly one loader, one reader and at most one
//! header fetch, even when several queries ask for it at the same moment. Outcomes
//! are remembered for the whole batch, failures included.

use crate::error::Result;
use crate::model::SourceHeader;
use crate::object_storage::{ObjectStorageOptions, loader_for_locator};
use crate::reader::{ReaderFactory, SourceReader};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Reader of one source together with its lazily fetched header.
///
/// Shared read-only by every query of the batch. Index files never need a header,
/// so it is fetched on the first call to [`ReaderHandle::header`].
pub struct ReaderHandle {
    locator: String,
    reader: Arc<dyn SourceReader>,
    header: OnceCell<Result<SourceHeader>>,
}

impl ReaderHandle {
    /// Locator the handle reads from.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Shared reader.
    pub fn reader(&self) -> &Arc<dyn SourceReader> {
        &self.reader
    }

    /// Header of the source, fetched once per handle.
    pub async fn header(&self) -> Result<&SourceHeader> {
        let header = self
            .header
            .get_or_init(|| async {
                let header = self.reader.header().await;
                if let Ok(header) = &header {
                    debug!(
                        "Read {:?} header of {} with {} resolution levels",
                        header.source_kind,
                        self.locator,
                        header.resolution_levels.len()
                    );
                }
                header
            })
            .await;
        header.as_ref().map_err(Clone::clone)
    }
}

type CacheKey = (String, Option<String>);
type CacheEntry = Arc<OnceCell<Result<Arc<ReaderHandle>>>>;

/// Memoizing map from locator to reader handle.
pub struct ReaderCache {
    factory: Arc<dyn ReaderFactory>,
    options: ObjectStorageOptions,
    credential: Option<String>,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl ReaderCache {
    /// Creates an empty cache.
    ///
    /// `credential` is used for every locator whose query does not carry its own.
    pub fn new(
        factory: Arc<dyn ReaderFactory>,
        options: ObjectStorageOptions,
        credential: Option<String>,
    ) -> Self {
        ReaderCache {
            factory,
            options,
            credential,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the handle for `locator`, opening the reader on first use.
    ///
    /// Concurrent callers for the same key wait on a single construction. A failed
    /// construction is remembered as well: every later call with the same key gets
    /// the same error without touching the source again.
    pub async fn get(
        &self,
        locator: &str,
        credential: Option<&str>,
    ) -> Result<Arc<ReaderHandle>> {
        let credential = credential.or(self.credential.as_deref());
        let key = (locator.to_string(), credential.map(str::to_string));
        let cell = {
            let mut entries = self.entries.lock().await;
            entries.entry(key).or_default().clone()
        };
        cell.get_or_init(|| self.build(locator, credential))
            .await
            .clone()
    }

    async fn build(&self, locator: &str, credential: Option<&str>) -> Result<Arc<ReaderHandle>> {
        debug!("Opening reader for {}", locator);
        let loader = loader_for_locator(locator, credential, &self.options).await?;
        let reader = self.factory.open(loader).await?;
        Ok(Arc::new(ReaderHandle {
            locator: locator.to_string(),
            reader,
            header: OnceCell::new(),
        }))
    }

    /// Number of distinct keys requested so far.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// True when nothing was requested yet.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
