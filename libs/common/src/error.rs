//! Custom error types for the common library
//!
//! This module defines the store-level error types shared by every
//! service that talks to the session store.

use redis::RedisError;
use thiserror::Error;

/// Custom error type for session-store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error occurred while talking to the store backend
    #[error("Store backend error: {0}")]
    Backend(#[from] RedisError),

    /// Error occurred while (de)serializing a stored record
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Store configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with StoreError
pub type StoreResult<T> = Result<T, StoreError>;
