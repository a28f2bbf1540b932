//! Uniform success/error shape for per-query results.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Error half of a [`ResultEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestError {
    /// Error category, `"unknown"` when the failure carries none
    pub errortype: String,
    /// Human readable message
    pub message: String,
}

impl From<&GatewayError> for RequestError {
    fn from(err: &GatewayError) -> Self {
        RequestError {
            errortype: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one query: exactly one of `data` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RequestError>,
}

impl<T> ResultEnvelope<T> {
    /// Successful result.
    pub fn ok(data: T) -> Self {
        ResultEnvelope {
            data: Some(data),
            error: None,
        }
    }

    /// Failed result.
    pub fn err(err: &GatewayError) -> Self {
        ResultEnvelope {
            data: None,
            error: Some(err.into()),
        }
    }

    /// Payload of a successful result.
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Error of a failed result.
    pub fn error(&self) -> Option<&RequestError> {
        self.error.as_ref()
    }

    /// Consumes the envelope, returning the payload.
    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// True when the query succeeded.
    pub fn is_ok(&self) -> bool {
        self.data.is_some()
    }
}

impl<T> From<Result<T>> for ResultEnvelope<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => ResultEnvelope::ok(data),
            Err(err) => ResultEnvelope::err(&err),
        }
    }
}

/// Awaits a fallible computation and captures its outcome.
pub async fn wrap_request<T, F>(read: F) -> ResultEnvelope<T>
where
    F: Future<Output = Result<T>>,
{
    let result = read.await;
    if let Err(err) = &result {
        log::debug!("Query failed with {}: {}", err.kind(), err);
    }
    result.into()
}
