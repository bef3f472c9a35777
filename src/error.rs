use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    InvalidAmount(String),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// The account owning a funding intent vanished before it could be credited.
    #[error("Account {0} not found")]
    AccountNotFound(String),

    #[error("Payment already processed")]
    AlreadyProcessed,

    #[error("Payment has expired")]
    Expired,

    #[error("Amount mismatch: expected {expected}, got {presented}")]
    AmountMismatch { expected: Decimal, presented: Decimal },

    #[error("Insufficient points: required {required}, current {current}")]
    InsufficientPoints { required: i64, current: i64 },

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_)
            | AppError::InvalidAmount(_)
            | AppError::AlreadyProcessed
            | AppError::Expired
            | AppError::AmountMismatch { .. }
            | AppError::InsufficientPoints { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable code returned alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::InvalidAmount(_) => "invalid_amount",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::AccountNotFound(_) => "account_not_found",
            AppError::AlreadyProcessed => "already_processed",
            AppError::Expired => "expired",
            AppError::AmountMismatch { .. } => "amount_mismatch",
            AppError::InsufficientPoints { .. } => "insufficient_points",
            AppError::Conflict(_) => "conflict",
            AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) => "internal",
        }
    }

    fn is_internal(&self) -> bool {
        self.status() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let body = if self.is_internal() {
            tracing::error!("{}", self);
            json!({ "error": "Internal server error", "code": code })
        } else {
            match &self {
                AppError::InsufficientPoints { required, current } => json!({
                    "error": "Insufficient points",
                    "code": code,
                    "required": required,
                    "current": current,
                }),
                // The expected (salted) amount stays server-side.
                AppError::AmountMismatch { .. } => json!({
                    "error": "Amount does not match the payment",
                    "code": code,
                }),
                other => json!({ "error": other.to_string(), "code": code }),
            }
        };

        (status, Json(body)).into_response()
    }
}
