//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use domain_payments::PaymentError;

use crate::auth::AuthError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    /// Request body failed field validation
    #[error("Validation error: {0}")]
    Validation(String, Vec<String>),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

/// HTTP status for a payments domain error
fn payment_status(err: &PaymentError) -> StatusCode {
    match err {
        PaymentError::Validation(_) => StatusCode::BAD_REQUEST,
        PaymentError::NotFound { .. } => StatusCode::NOT_FOUND,
        PaymentError::InvalidState { .. } => StatusCode::CONFLICT,
        PaymentError::GatewayCommunication(_) => StatusCode::BAD_GATEWAY,
        PaymentError::WebhookVerification(_) => StatusCode::BAD_REQUEST,
        PaymentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(..) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Payment(err) => payment_status(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::NotFound(msg) => ErrorResponse::new("not_found", msg),
            ApiError::BadRequest(msg) => ErrorResponse::new("bad_request", msg),
            ApiError::Unauthorized => ErrorResponse::new("unauthorized", "Unauthorized"),
            ApiError::Forbidden(msg) => ErrorResponse::new("forbidden", msg),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                ErrorResponse::new("internal_error", "Internal server error")
            }
            ApiError::Validation(msg, details) => ErrorResponse {
                details: Some(details),
                ..ErrorResponse::new("validation_error", msg)
            },
            ApiError::Payment(PaymentError::Store(err)) => {
                error!(error = %err, "Payment store failure");
                ErrorResponse::new("internal_error", "Internal server error")
            }
            ApiError::Payment(err) => ErrorResponse::new(err.code(), err.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

impl ErrorResponse {
    fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut details: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => format!("{}: {}", field, message),
                    None => format!("{}: {}", field, e.code),
                })
            })
            .collect();
        details.sort();
        ApiError::Validation("Request validation failed".to_string(), details)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingPermission(role) => {
                ApiError::Forbidden(format!("Requires role: {}", role))
            }
            AuthError::InvalidToken | AuthError::TokenExpired => ApiError::Unauthorized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::PortError;
    use domain_payments::TransactionStatus;

    #[test]
    fn test_payment_error_statuses() {
        let cases = [
            (PaymentError::validation("bad"), StatusCode::BAD_REQUEST),
            (PaymentError::not_found("Quote", "1"), StatusCode::NOT_FOUND),
            (
                PaymentError::InvalidState {
                    transaction_id: "BANK_1".to_string(),
                    status: TransactionStatus::Approved,
                },
                StatusCode::CONFLICT,
            ),
            (PaymentError::gateway("down"), StatusCode::BAD_GATEWAY),
            (PaymentError::verification("bad sig"), StatusCode::BAD_REQUEST),
            (
                PaymentError::Store(PortError::internal("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_auth_errors() {
        assert!(matches!(
            ApiError::from(AuthError::TokenExpired),
            ApiError::Unauthorized
        ));
        assert_eq!(
            ApiError::from(AuthError::MissingPermission("administrator".to_string())).status(),
            StatusCode::FORBIDDEN
        );
    }
}
