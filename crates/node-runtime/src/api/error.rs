//! HTTP error responses.

use crate::actors::{now_millis, ActorError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared_types::ServerAddress;
use thiserror::Error;
use uuid::Uuid;

/// Failures surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No authenticated user on a protected route.
    #[error("Authentication required")]
    Unauthorized,

    /// The user may not touch the device.
    #[error("Access to device {0} is denied")]
    Forbidden(Uuid),

    /// Device is not in the credential store.
    #[error("Device {0} not found")]
    DeviceNotFound(Uuid),

    /// Another node owns the device.
    #[error("Device {device} is owned by {owner}")]
    NotOwner {
        /// Device id.
        device: Uuid,
        /// Owning node.
        owner: ServerAddress,
    },

    /// Malformed request.
    #[error("{0}")]
    BadRequest(String),

    /// Device actor failure.
    #[error(transparent)]
    Actor(#[from] ActorError),

    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::DeviceNotFound(_) | Self::Actor(ActorError::UnknownDevice(_)) => {
                StatusCode::NOT_FOUND
            }
            Self::NotOwner { .. } => StatusCode::MISDIRECTED_REQUEST,
            Self::BadRequest(_) | Self::Actor(ActorError::ClaimRejected(..)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Actor(ActorError::NotSubscribed(_)) => StatusCode::CONFLICT,
            Self::Actor(ActorError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Self::Actor(ActorError::Stopped(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "status": status.as_u16(),
            "message": self.to_string(),
            "timestamp": now_millis(),
        });
        (status, Json(body)).into_response()
    }
}
