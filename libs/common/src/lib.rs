//! Common library for the Worklane platform
//!
//! This crate provides shared functionality used across different services
//! in the Worklane platform: Redis connectivity for the shared session
//! store and the store-level error types.

pub mod cache;
pub mod error;
