use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gateway_bio_range_core::{GatewayError, RequestError};
use log::warn;

/// Failure of a single-item route.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    /// HTTP status for the wrapped error.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::SourceFetch(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Format(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::Internal(_) | GatewayError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed with {}: {}", self.0.kind(), self.0);
        }
        (status, Json(RequestError::from(&self.0))).into_response()
    }
}
