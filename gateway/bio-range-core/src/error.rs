use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors raised while answering a range query.
///
/// Every variant maps to a stable category string through [`GatewayError::kind`],
/// which is what callers see in the `errortype` field of a response envelope.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Network or byte-range read failure
    #[error("{0}")]
    SourceFetch(String),

    /// Malformed header, index or record reported by the format reader
    #[error("{0}")]
    Format(String),

    /// Request rejected before any read was attempted
    #[error("{0}")]
    Validation(String),

    /// Unexpected failure inside the gateway
    #[error("{0}")]
    Internal(String),

    /// Failure without a known category
    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    /// Category string reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::SourceFetch(_) => "SourceFetchError",
            GatewayError::Format(_) => "FormatError",
            GatewayError::Validation(_) => "ValidationError",
            GatewayError::Internal(_) => "InternalError",
            GatewayError::Other(_) => "unknown",
        }
    }

    /// Returns true for errors that must short-circuit a request with a 4xx.
    pub fn is_validation(&self) -> bool {
        matches!(self, GatewayError::Validation(_))
    }
}

impl From<opendal::Error> for GatewayError {
    fn from(err: opendal::Error) -> Self {
        GatewayError::SourceFetch(err.to_string())
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::SourceFetch(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Format(err.to_string())
    }
}

impl From<url::ParseError> for GatewayError {
    fn from(err: url::ParseError) -> Self {
        GatewayError::Validation(format!("Invalid source locator: {err}"))
    }
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(err: tokio::task::JoinError) -> Self {
        GatewayError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings() {
        assert_eq!(
            GatewayError::SourceFetch("x".into()).kind(),
            "SourceFetchError"
        );
        assert_eq!(GatewayError::Format("x".into()).kind(), "FormatError");
        assert_eq!(
            GatewayError::Validation("x".into()).kind(),
            "ValidationError"
        );
        assert_eq!(GatewayError::Internal("x".into()).kind(), "InternalError");
        assert_eq!(GatewayError::Other("x".into()).kind(), "unknown");
    }

    #[test]
    fn test_io_error_is_fetch_error() {
        let err: GatewayError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into();
        assert_eq!(err.kind(), "SourceFetchError");
        assert_eq!(err.to_string(), "reset");
    }
}
