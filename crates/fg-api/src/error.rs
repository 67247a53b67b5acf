//! Unified API error type with Axum `IntoResponse` support.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fg_mqtt_channel::{ConnectionError, PublishError, ShadowError, SubscribeError};
use fg_provisioning::{OrphanedResources, ProvisioningError};
use serde_json::{Value, json};

use crate::store::StoreError;

/// API error type that converts to proper HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// The broker answered with a failure.
    #[error("bad gateway: {0}")]
    BadGateway(String),

    /// The broker connection is not available.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Provisioning failed after creating broker-side resources.
    #[error("partial failure: {message}")]
    PartialFailure {
        message: String,
        orphaned: OrphanedResources,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, data) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, Value::Null),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, Value::Null),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, Value::Null),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg, Value::Null),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, Value::Null),
            ApiError::PartialFailure { message, orphaned } => (
                StatusCode::BAD_GATEWAY,
                message,
                json!({ "orphaned": orphaned }),
            ),
        };

        let body = json!({
            "message": message,
            "status": status.as_u16(),
            "data": data,
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<ConnectionError> for ApiError {
    fn from(e: ConnectionError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl From<PublishError> for ApiError {
    fn from(e: PublishError) -> Self {
        match e {
            PublishError::NotConnected | PublishError::Connection(_) => {
                ApiError::Unavailable(e.to_string())
            }
            PublishError::Rejected(_) => ApiError::BadGateway(e.to_string()),
            PublishError::Invalid(_) => ApiError::BadRequest(e.to_string()),
            PublishError::Serialization(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<SubscribeError> for ApiError {
    fn from(e: SubscribeError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl From<ShadowError> for ApiError {
    fn from(e: ShadowError) -> Self {
        match e {
            ShadowError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            ShadowError::InvalidSection => ApiError::BadRequest(e.to_string()),
            ShadowError::Rejected { .. }
            | ShadowError::Timeout { .. }
            | ShadowError::Malformed(_) => {
                ApiError::BadGateway(e.to_string())
            }
            ShadowError::Connection(e) => e.into(),
            ShadowError::Publish(e) => e.into(),
            ShadowError::Subscribe(e) => e.into(),
        }
    }
}

impl From<ProvisioningError> for ApiError {
    fn from(e: ProvisioningError) -> Self {
        let message = e.to_string();
        match e {
            ProvisioningError::BootstrapUnreachable(_) => ApiError::Unavailable(message),
            ProvisioningError::IssuanceFailed(_) => ApiError::BadGateway(message),
            ProvisioningError::AttachFailed { orphaned, .. }
            | ProvisioningError::GroupAttachFailed { orphaned, .. }
            | ProvisioningError::SeedFailed { orphaned, .. } => {
                ApiError::PartialFailure { message, orphaned }
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::NotFound(e.to_string()),
            StoreError::Backend(_) => ApiError::Internal(e.to_string()),
        }
    }
}

/// Convenience alias.
pub type ApiResult<T> = Result<T, ApiError>;
