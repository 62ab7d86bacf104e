//! API error types with HTTP response mapping.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use downloads::{Denial, DownloadError, StorageError};
use order_store::OrderStoreError;
use payments::{PaymentError, WebhookError};

/// API-level error type that maps to HTTP responses.
///
/// Client errors carry the message returned to the caller. Server errors
/// carry internal detail that is logged and replaced by a generic message.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or missing input.
    Validation(String),
    /// Missing or invalid credentials.
    Authentication(String),
    /// Authenticated, but not allowed.
    Authorization(String),
    /// Resource not found.
    NotFound(String),
    /// A required secret or setting is absent.
    Configuration(String),
    /// Stored data violates a safety invariant.
    Integrity(String),
    /// An upstream provider failed.
    Upstream(String),
    /// An upstream provider did not answer in time.
    Timeout(String),
    /// Internal server error.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Authorization(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Configuration(_) | ApiError::Integrity(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Validation(msg)
            | ApiError::Authentication(msg)
            | ApiError::Authorization(msg)
            | ApiError::NotFound(msg) => msg,
            ApiError::Configuration(detail) => {
                tracing::error!(error = %detail, "server misconfiguration");
                "Server misconfiguration".to_string()
            }
            ApiError::Integrity(detail) => {
                tracing::error!(error = %detail, "integrity violation");
                "Failed to prepare download".to_string()
            }
            ApiError::Upstream(detail) => {
                tracing::error!(error = %detail, "upstream failure");
                "Upstream provider error".to_string()
            }
            ApiError::Timeout(detail) => {
                tracing::error!(error = %detail, "upstream timeout");
                "Upstream provider timed out, please retry".to_string()
            }
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "internal server error");
                "Internal server error".to_string()
            }
        };

        let body = serde_json::json!({ "error": message });
        let mut response = (status, axum::Json(body)).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

impl From<OrderStoreError> for ApiError {
    fn from(err: OrderStoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::ProductNotFound(_) => ApiError::NotFound("Product not found".to_string()),
            PaymentError::NotConfigured(_) => ApiError::Configuration(err.to_string()),
            PaymentError::Provider(_) | PaymentError::Http(_) => ApiError::Upstream(err.to_string()),
            PaymentError::Timeout(_) => ApiError::Timeout(err.to_string()),
            PaymentError::OrderNotRecorded { .. } | PaymentError::Store(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::NotConfigured => ApiError::Configuration(err.to_string()),
            WebhookError::MissingSignature => {
                ApiError::Validation("Missing webhook signature".to_string())
            }
            WebhookError::MalformedHeader(_)
            | WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange => {
                ApiError::Validation("Invalid webhook signature".to_string())
            }
            WebhookError::MalformedPayload(_) => {
                ApiError::Validation("Invalid webhook payload".to_string())
            }
            WebhookError::Store(e) => e.into(),
        }
    }
}

impl From<DownloadError> for ApiError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::NotConfigured => ApiError::Configuration(err.to_string()),
            DownloadError::InvalidToken(_) => {
                ApiError::Authentication("Invalid or expired download token".to_string())
            }
            DownloadError::OrderNotFound => ApiError::NotFound("Order not found".to_string()),
            DownloadError::Forbidden(Denial::NotPaid) => {
                ApiError::Authorization("Order not yet paid".to_string())
            }
            DownloadError::Forbidden(_) => {
                ApiError::Authorization("Not authorized to access this order".to_string())
            }
            DownloadError::AssetNotFound => {
                ApiError::NotFound("Requested asset not found".to_string())
            }
            DownloadError::Timeout(_) => ApiError::Timeout(err.to_string()),
            DownloadError::Signing(_) => ApiError::Internal(err.to_string()),
            DownloadError::Storage(e) => e.into(),
            DownloadError::Store(e) => e.into(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => ApiError::NotFound("Requested asset not found".to_string()),
            StorageError::InvalidKey(_) | StorageError::OutsideRoot => {
                ApiError::Integrity(err.to_string())
            }
            StorageError::Backend(_) => ApiError::Upstream(err.to_string()),
            StorageError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}
