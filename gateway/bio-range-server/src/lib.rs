//! HTTP surface of the genomic range query gateway
//!
//! Exposes the dispatcher of [`gateway_bio_range_core`] over a small set of JSON
//! routes built with axum:
//!
//! - `POST /big`: multiplexed streaming of a batch of range queries
//! - `POST /big/batch`: the same batch answered as a JSON array of result envelopes
//! - `POST /bam`, `/bamHeader`, `/bamIndex`, `/bam/indexRequests`, `/bam/requests`:
//!   alignment reads
//! - `GET /healthz` and `GET /rest`
//!
//! The crate ships no decoder. Embedders pass their [`ReaderFactory`] to [`router`]
//! or [`serve`].

#![warn(missing_docs)]

/// Server configuration
pub mod config;
/// HTTP error mapping
pub mod error;
/// Route handlers
pub mod handlers;

pub use config::ServerConfig;
pub use error::ApiError;

use axum::Router;
use axum::routing::{get, post};
use gateway_bio_range_core::{ReaderCache, ReaderFactory, RequestDispatcher};
use log::info;
use std::sync::Arc;

/// Shared state of every route.
#[derive(Clone)]
pub struct AppState {
    /// Builds readers for the locators of incoming requests
    pub factory: Arc<dyn ReaderFactory>,
    /// Server settings
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Creates the state from a factory and a configuration.
    pub fn new(factory: Arc<dyn ReaderFactory>, config: ServerConfig) -> Self {
        AppState {
            factory,
            config: Arc::new(config),
        }
    }

    /// Dispatcher for one request batch.
    pub fn dispatcher(&self, credential: Option<String>) -> RequestDispatcher {
        RequestDispatcher::new(
            self.factory.clone(),
            self.config.storage.clone(),
            credential,
        )
        .with_max_alignment_range(self.config.max_alignment_range)
    }

    /// Reader cache for one request.
    pub fn cache(&self, credential: Option<String>) -> ReaderCache {
        ReaderCache::new(self.factory.clone(), self.config.storage.clone(), credential)
    }
}

/// Builds the router with every route.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/rest", get(handlers::rest))
        .route("/big", post(handlers::big))
        .route("/big/batch", post(handlers::big_batch))
        .route("/bam", post(handlers::bam))
        .route("/bamHeader", post(handlers::bam_header))
        .route("/bamIndex", post(handlers::bam_index))
        .route("/bam/indexRequests", post(handlers::bam_index_requests))
        .route("/bam/requests", post(handlers::bam_requests))
        .with_state(state)
}

/// Binds the configured address and serves until the listener fails.
pub async fn serve(config: ServerConfig, factory: Arc<dyn ReaderFactory>) -> std::io::Result<()> {
    let address = config.bind_address();
    info!("Starting gateway with {}", config);
    let app = router(AppState::new(factory, config));
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Listening on http://{}", address);
    axum::serve(listener, app).await
}
