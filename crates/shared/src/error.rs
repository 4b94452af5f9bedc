//! Error types for HeartBalance

use thiserror::Error;

/// Domain input that fails parsing or range checks
#[derive(Debug, Error)]
pub enum HeartError {
    #[error("Validation error: {0}")]
    Validation(String),
}

pub type HeartResult<T> = Result<T, HeartError>;
