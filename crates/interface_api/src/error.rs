//! API error handling
//!
//! Domain errors are folded into a handful of HTTP outcomes. Transient
//! persistence failures surface as 503 so callers know a retry may succeed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use core_kernel::PortError;
use domain_agent::AgentError;
use domain_commission::CommissionError;
use domain_settlement::SettlementError;
use domain_wallet::WalletError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Request body failed field validation
    #[error("Invalid fields: {}", .0.join("; "))]
    InvalidFields(Vec<String>),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) | ApiError::InvalidFields(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InsufficientFunds(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => "conflict",
            ApiError::Validation(_) | ApiError::InvalidFields(_) => "validation_error",
            ApiError::InsufficientFunds(_) => "insufficient_funds",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.error_type().to_string();
        let (message, details) = match self {
            ApiError::InvalidFields(details) => ("Request validation failed".to_string(), Some(details)),
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::Validation(msg)
            | ApiError::InsufficientFunds(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::Internal(msg) => (msg, None),
        };
        let body = ErrorResponse {
            error,
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<PortError> for ApiError {
    fn from(err: PortError) -> Self {
        let message = err.to_string();
        match err {
            PortError::NotFound { .. } => ApiError::NotFound(message),
            PortError::Validation { .. } => ApiError::Validation(message),
            PortError::Conflict { .. } => ApiError::Conflict(message),
            e if e.is_transient() => ApiError::ServiceUnavailable(message),
            _ => {
                error!(error = %message, "Unhandled persistence error");
                ApiError::Internal(message)
            }
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        let message = err.to_string();
        match err {
            AgentError::AgentNotFound(_) => ApiError::NotFound(message),
            AgentError::MissingReferrer { .. }
            | AgentError::CycleDetected { .. }
            | AgentError::SelfReferral(_) => ApiError::Validation(message),
            AgentError::Port(e) => e.into(),
        }
    }
}

impl From<CommissionError> for ApiError {
    fn from(err: CommissionError) -> Self {
        let message = err.to_string();
        match err {
            CommissionError::InvalidPayment(_) | CommissionError::InvalidRule(_) => {
                ApiError::Validation(message)
            }
            CommissionError::RuleConflict { .. } | CommissionError::InvalidStateTransition { .. } => {
                ApiError::Conflict(message)
            }
            CommissionError::RuleNotFound(_) | CommissionError::LineItemNotFound(_) => {
                ApiError::NotFound(message)
            }
            CommissionError::Agent(e) => e.into(),
            CommissionError::Money(_) | CommissionError::Temporal(_) => ApiError::BadRequest(message),
            CommissionError::Port(e) => e.into(),
        }
    }
}

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        let message = err.to_string();
        match err {
            WalletError::InsufficientFunds { .. } | WalletError::NegativeBalance { .. } => {
                ApiError::InsufficientFunds(message)
            }
            WalletError::InvalidAmount(_)
            | WalletError::BelowMinimum { .. }
            | WalletError::MissingAuditInfo => ApiError::Validation(message),
            WalletError::WithdrawalNotFound(_) => ApiError::NotFound(message),
            WalletError::InvalidStateTransition { .. } => ApiError::Conflict(message),
            WalletError::Money(_) => ApiError::BadRequest(message),
            WalletError::Port(e) => e.into(),
        }
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        let message = err.to_string();
        match err {
            SettlementError::InvalidEvent(_)
            | SettlementError::Money(_)
            | SettlementError::Temporal(_) => ApiError::BadRequest(message),
            SettlementError::RunNotFound(_) => ApiError::NotFound(message),
            SettlementError::InvalidRunTransition { .. } | SettlementError::LineItemNotPosted(_) => {
                ApiError::Conflict(message)
            }
            SettlementError::QueueClosed => ApiError::ServiceUnavailable(message),
            SettlementError::InvalidConfig(_) => {
                error!(error = %message, "Settlement misconfigured");
                ApiError::Internal(message)
            }
            SettlementError::Commission(e) => e.into(),
            SettlementError::Wallet(e) => e.into(),
            SettlementError::Port(e) => e.into(),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details = Vec::new();
        for (field, field_errors) in errors.field_errors() {
            for e in field_errors {
                let reason = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                details.push(format!("{field}: {reason}"));
            }
        }
        details.sort();
        ApiError::InvalidFields(details)
    }
}
