//! Payments domain errors

use thiserror::Error;

use core_kernel::{MoneyError, PortError};

use crate::transaction::TransactionStatus;

/// Errors that can occur in the payments domain
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Malformed input, unknown gateway type, unpayable quote, incompatible method
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// The transaction already reached a terminal status
    #[error("Transaction {transaction_id} is already {status}")]
    InvalidState {
        transaction_id: String,
        status: TransactionStatus,
    },

    /// The provider API failed or answered with something unusable
    #[error("Gateway communication error: {0}")]
    GatewayCommunication(String),

    /// Webhook signature or payload could not be authenticated
    #[error("Webhook verification failed: {0}")]
    WebhookVerification(String),

    #[error("Store error: {0}")]
    Store(PortError),
}

impl PaymentError {
    pub fn validation(message: impl Into<String>) -> Self {
        PaymentError::Validation(message.into())
    }

    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        PaymentError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn gateway(message: impl Into<String>) -> Self {
        PaymentError::GatewayCommunication(message.into())
    }

    pub fn verification(message: impl Into<String>) -> Self {
        PaymentError::WebhookVerification(message.into())
    }

    /// Stable machine-readable code, surfaced in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::Validation(_) => "validation_error",
            PaymentError::NotFound { .. } => "not_found",
            PaymentError::InvalidState { .. } => "invalid_state",
            PaymentError::GatewayCommunication(_) => "gateway_error",
            PaymentError::WebhookVerification(_) => "webhook_verification_failed",
            PaymentError::Store(_) => "internal_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PaymentError::NotFound { .. })
    }
}

impl From<PortError> for PaymentError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => PaymentError::NotFound {
                entity: entity_type,
                id,
            },
            PortError::Validation { message, .. } => PaymentError::Validation(message),
            other => PaymentError::Store(other),
        }
    }
}

impl From<MoneyError> for PaymentError {
    fn from(err: MoneyError) -> Self {
        PaymentError::Validation(err.to_string())
    }
}
