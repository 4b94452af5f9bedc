//! Billing error types

use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Mercado Pago API error ({status}): {message}")]
    ProviderApi { status: u16, message: String },

    #[error("Mercado Pago request failed: {0}")]
    ProviderTransport(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Invalid webhook notification: {0}")]
    InvalidNotification(String),

    /// Nothing was stored for the worker to retry; the provider must redeliver
    #[error("Webhook notification not recorded: {0}")]
    WebhookNotRecorded(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BillingError {
    /// Errors worth retrying: network failures, provider 5xx and rate limits
    pub fn is_transient(&self) -> bool {
        match self {
            BillingError::ProviderTransport(_) => true,
            BillingError::ProviderApi { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            BillingError::ProviderApi {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            BillingError::InvalidResponse(err.to_string())
        } else {
            BillingError::ProviderTransport(err.to_string())
        }
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
