use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Unprocessable Entity")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Additional detail (validation messages, offending field)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

fn error_body(status: StatusCode, message: String, details: Option<String>) -> Response {
    let body = ErrorResponse {
        error: status.canonical_reason().unwrap_or("Error").to_string(),
        message,
        details,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    (status, Json(body)).into_response()
}

/// Failures of the checkout transaction.
///
/// Every variant aborts and rolls back the whole transaction: a failed
/// checkout leaves orders, order items and product quantities exactly as
/// they were before the attempt. The caller keeps the cart so the user can
/// retry.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    /// Caller precondition: an empty cart is never attempted.
    #[error("Cart is empty")]
    EmptyCart,

    /// A cart line references a product that is no longer in the catalog.
    /// The offending line should be dropped before retrying.
    #[error("Product {product_id} is no longer available")]
    ProductMissing { product_id: i32 },

    /// Requested quantity exceeds stock on hand. `available` lets the UI
    /// clamp the cart line instead of guessing.
    #[error("Insufficient stock for product {product_id}: only {available} left")]
    InsufficientStock { product_id: i32, available: i32 },

    /// The unique constraint on `orders.order_id` fired. With UUID order
    /// ids this is vanishingly unlikely; retry with a fresh id.
    #[error("Order identifier collision, please retry")]
    IdentifierCollision,

    /// Any other database-level failure (connectivity, lock timeout,
    /// constraint violation). Retryable.
    #[error("Checkout failed: {0}")]
    Persistence(#[from] DbErr),
}

impl CheckoutError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyCart => StatusCode::BAD_REQUEST,
            Self::ProductMissing { .. } => StatusCode::NOT_FOUND,
            Self::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::IdentifierCollision => StatusCode::CONFLICT,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn response_message(&self) -> String {
        match self {
            // Do not leak driver-level detail to clients.
            Self::Persistence(_) => "Checkout failed, please try again".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        error_body(self.status_code(), self.response_message(), None)
    }
}

/// Application-wide service error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Hash error: {0}")]
    HashError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_)
            | Self::HashError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::AuthError(_) | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Checkout(e) => e.status_code(),
        }
    }

    /// Message suitable for HTTP responses. Internal failures get a
    /// generic message so driver details never reach clients.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::HashError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::Checkout(e) => e.response_message(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        error_body(self.status_code(), self.response_message(), None)
    }
}

/// API error type for HTTP handler-level failures.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Service error: {0}")]
    ServiceError(#[from] ServiceError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::ServiceError(service_error) => (
                service_error.status_code(),
                service_error.response_message(),
            ),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };
        error_body(status, message, None)
    }
}
