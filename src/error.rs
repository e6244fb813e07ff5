use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Dispute error: {0}")]
    Dispute(#[from] DisputeError),

    #[error("Payment processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Checkout-time violations, surfaced synchronously to the buyer
#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("Ticket not found: {0}")]
    TicketNotFound(Uuid),

    #[error("Ticket already sold")]
    TicketSold,

    #[error("Ticket is not available: {0}")]
    TicketUnavailable(String),

    #[error("Buyer is not eligible for this ticket")]
    NotEligible,

    #[error("Buyer profile not found: {0}")]
    BuyerNotFound(Uuid),

    #[error("Checkout session could not be created: {0}")]
    SessionFailed(String),
}

/// Webhook ingestion failures - only these reject the request
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Missing signature header")]
    MissingSignature,

    #[error("Signature verification failed: {0}")]
    BadSignature(String),

    #[error("Malformed payload: {0}")]
    Malformed(String),
}

/// Dispute lifecycle errors
#[derive(Error, Debug)]
pub enum DisputeError {
    #[error("Dispute not found: {0}")]
    NotFound(Uuid),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Order has not been delivered yet")]
    NotDelivered,

    #[error("Dispute window has expired")]
    WindowExpired,

    #[error("An open dispute already exists for this order")]
    AlreadyOpen,

    #[error("Dispute already resolved")]
    AlreadyResolved,

    #[error("Invalid resolution action: {0}")]
    InvalidAction(String),
}

/// Payment processor boundary errors
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Processor request failed: {0}")]
    Request(String),

    #[error("Processor rejected the request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Processor response missing field: {0}")]
    MissingField(&'static str),

    #[error("Processor call timed out")]
    Timeout,
}

impl From<reqwest::Error> for ProcessorError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ProcessorError::Timeout
        } else {
            ProcessorError::Request(error.to_string())
        }
    }
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::Checkout(CheckoutError::TicketNotFound(id)) => (
                StatusCode::NOT_FOUND,
                "TICKET_NOT_FOUND",
                format!("Ticket not found: {}", id),
            ),
            AppError::Checkout(CheckoutError::TicketSold) => (
                StatusCode::CONFLICT,
                "TICKET_SOLD",
                "Ticket has already been sold".to_string(),
            ),
            AppError::Checkout(CheckoutError::TicketUnavailable(reason)) => (
                StatusCode::CONFLICT,
                "TICKET_UNAVAILABLE",
                format!("Ticket is not available: {}", reason),
            ),
            AppError::Checkout(CheckoutError::NotEligible) => (
                StatusCode::FORBIDDEN,
                "BUYER_NOT_ELIGIBLE",
                "Only buyers from the seller's institution may purchase this ticket".to_string(),
            ),
            AppError::Checkout(CheckoutError::BuyerNotFound(id)) => (
                StatusCode::NOT_FOUND,
                "BUYER_NOT_FOUND",
                format!("Buyer profile not found: {}", id),
            ),
            AppError::Checkout(CheckoutError::SessionFailed(_)) => (
                StatusCode::BAD_GATEWAY,
                "CHECKOUT_SESSION_FAILED",
                "Payment session could not be created, please retry".to_string(),
            ),
            AppError::Webhook(err) => (
                StatusCode::BAD_REQUEST,
                "WEBHOOK_REJECTED",
                err.to_string(),
            ),
            AppError::Dispute(DisputeError::WindowExpired) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "DISPUTE_WINDOW_EXPIRED",
                "The dispute window for this order has expired".to_string(),
            ),
            AppError::Dispute(DisputeError::AlreadyOpen) => (
                StatusCode::CONFLICT,
                "DISPUTE_ALREADY_OPEN",
                "An open dispute already exists for this order".to_string(),
            ),
            AppError::Dispute(DisputeError::AlreadyResolved) => (
                StatusCode::CONFLICT,
                "DISPUTE_ALREADY_RESOLVED",
                "Dispute has already been resolved".to_string(),
            ),
            AppError::Dispute(DisputeError::NotDelivered) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "ORDER_NOT_DELIVERED",
                "Disputes may only be raised against delivered orders".to_string(),
            ),
            AppError::Dispute(DisputeError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "DISPUTE_NOT_FOUND",
                format!("Dispute not found: {}", id),
            ),
            AppError::Dispute(DisputeError::OrderNotFound(id)) => (
                StatusCode::NOT_FOUND,
                "ORDER_NOT_FOUND",
                format!("Order not found: {}", id),
            ),
            AppError::Dispute(DisputeError::InvalidAction(action)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_DISPUTE_ACTION",
                format!("Invalid resolution action: {}", action),
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
            ),
            AppError::InvalidInput(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                msg.clone(),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Unauthorized".to_string(),
            ),
            AppError::Processor(_) => (
                StatusCode::BAD_GATEWAY,
                "PROCESSOR_ERROR",
                "Payment processor request failed".to_string(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("{:?}", error))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
