use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Machine-readable error kind (e.g., "InsufficientStockError")
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// Offending entity, when the error names one (e.g. the out-of-stock product)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Cart is empty and no buy-now item is staged")]
    EmptyCart,

    #[error("Missing parameters: {0}")]
    MissingParameters(String),

    #[error("Payment signature verification failed")]
    SignatureVerification,

    #[error("Insufficient stock: {message}")]
    InsufficientStock { product_id: Uuid, message: String },

    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    #[error("Payment does not match checkout: {0}")]
    PaymentMismatch(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    pub fn insufficient_stock(product_id: Uuid, message: impl Into<String>) -> Self {
        ServiceError::InsufficientStock {
            product_id,
            message: message.into(),
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidOperation(_)
            | Self::InvalidStatus(_)
            | Self::EmptyCart
            | Self::MissingParameters(_)
            | Self::SignatureVerification => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PaymentGateway(_) => StatusCode::BAD_GATEWAY,
            Self::PaymentMismatch(_) | Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    /// Machine-readable kind carried in the `code` field of [`ErrorResponse`].
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingParameters(_) => "MissingParameters",
            Self::SignatureVerification => "SignatureVerificationError",
            Self::InsufficientStock { .. } => "InsufficientStockError",
            Self::PaymentGateway(_) => "GatewayError",
            Self::EmptyCart => "EmptyCartError",
            Self::ValidationError(_) | Self::InvalidOperation(_) | Self::InvalidStatus(_) => {
                "ValidationError"
            }
            Self::NotFound(_) => "NotFound",
            Self::Unauthorized(_) => "Unauthorized",
            Self::Forbidden(_) => "Forbidden",
            Self::PaymentMismatch(_) => "PaymentMismatchError",
            Self::Conflict(_) => "Conflict",
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => "InternalError",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::InsufficientStock { product_id, .. } => Some(product_id.to_string()),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.error_code().to_string(),
            message: self.response_message(),
            details: self.details(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
