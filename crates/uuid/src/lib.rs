//! Identifier utilities for booking sessions and submissions.
//!
//! Carebook uses a *canonical* UUID representation for identifiers that cross the REST
//! boundary: **32 lowercase hexadecimal characters** (no hyphens).
//!
//! This crate provides:
//! - [`SessionId`], a wrapper that *guarantees* the canonical format once constructed. It names
//!   one in-memory booking wizard session.
//! - [`SubmissionKey`], a time-prefixed identifier generated for every booking submission and
//!   sent to the remote API as its idempotency key.
//!
//! ## Canonical UUID form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Non-canonical values (uppercase, hyphenated, wrong length, non-hex) are rejected by
//! [`SessionId::parse`].

mod service;

pub use service::{SessionId, SubmissionKey, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
