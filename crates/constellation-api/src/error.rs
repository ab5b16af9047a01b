//! Error responses — every failure leaves as an `ErrorBody` with the
//! matching HTTP status.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use constellation_core::message::ErrorBody;
use constellation_services::handshake::HandshakeError;
use constellation_services::routing::ForwardError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::new(status.as_u16(), error),
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorBody {
        &self.body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<HandshakeError> for ApiError {
    fn from(e: HandshakeError) -> Self {
        if e.is_malformed() {
            ApiError::bad_request(e.to_string())
        } else {
            ApiError::new(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

impl From<ForwardError> for ApiError {
    fn from(e: ForwardError) -> Self {
        let status = match &e {
            ForwardError::NoRoute { .. } => StatusCode::NOT_FOUND,
            ForwardError::LoopDetected { .. } | ForwardError::HopLimitExceeded { .. } => {
                StatusCode::CONFLICT
            }
            ForwardError::Exhausted { .. } | ForwardError::Undeliverable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        let mut err = ApiError::new(status, e.to_string());
        err.body.code = Some(e.code().to_string());
        err.body.failed_nodes = e.failed_nodes().to_vec();
        err
    }
}
