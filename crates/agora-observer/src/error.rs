//! Error types for the operator API.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use agora_core::CommandError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors that can occur in the operator API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request was well-formed JSON but not acceptable.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A UUID could not be parsed from the request path.
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),

    /// The request conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The simulation is not accepting commands.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<CommandError> for ObserverError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::UnknownAgent(_) | CommandError::UnknownConversation(_) => {
                Self::NotFound(err.to_string())
            }
            CommandError::BlankInput => Self::BadRequest(err.to_string()),
            CommandError::SessionMismatch(_) => Self::Conflict(err.to_string()),
            CommandError::Stopped => Self::Unavailable(err.to_string()),
        }
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::BadRequest(msg) | Self::InvalidUuid(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
