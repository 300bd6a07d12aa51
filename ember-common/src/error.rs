//! Shared error model for cross-crate APIs.

use thiserror::Error;

/// Unified result type used by all public interfaces in `ember`.
pub type EmberResult<T> = Result<T, EmberError>;

/// High-level error categories shared across protocol, replication, and server layers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmberError {
    /// Configuration is invalid for the requested operation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Runtime state does not allow this operation.
    #[error("invalid runtime state: {0}")]
    InvalidState(&'static str),

    /// Wire payload is malformed or semantically invalid.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Replication negotiation with the primary failed and cannot continue.
    #[error("replication handshake failed: {0}")]
    Handshake(String),

    /// Socket or filesystem I/O failed.
    #[error("io error: {0}")]
    Io(String),
}
