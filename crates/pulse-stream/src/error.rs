use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pulse_protocol::frames::ErrorBody;
use thiserror::Error;

/// Errors surfaced by the streaming layer. Per-connection transport faults
/// are not errors here; they end up as a [`crate::CloseReason`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The auth layer resolved no tenant for the request.
    #[error("no tenant resolved for request")]
    Unauthorized,

    /// The `Origin` header is missing or not on the allowlist.
    #[error("origin not allowed: {origin}")]
    OriginRejected { origin: String },

    /// The hub has been shut down and accepts no new clients.
    #[error("hub is shut down")]
    HubClosed,
}

impl StreamError {
    pub fn code(&self) -> &'static str {
        match self {
            StreamError::Unauthorized => "unauthorized",
            StreamError::OriginRejected { .. } => "origin_not_allowed",
            StreamError::HubClosed => "unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            StreamError::Unauthorized => StatusCode::UNAUTHORIZED,
            StreamError::OriginRejected { .. } => StatusCode::FORBIDDEN,
            StreamError::HubClosed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        let body = ErrorBody::new(self.code(), self.to_string());
        (self.status(), Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
