// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Netpulse fleet service.

use thiserror::Error;

/// The primary error type used across all Netpulse components.
///
/// Components return these as typed results rather than panicking across
/// crate boundaries. The variants map onto the failure categories callers
/// must distinguish: `Unauthorized` is never retried outside the dedicated
/// re-auth sub-flow, `LeaseMismatch` is always non-fatal, `NotConnected`
/// means "fall back to queue-based delivery", and `Transport` is the
/// retry-with-backoff category.
#[derive(Debug, Error)]
pub enum NetpulseError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Bad or expired session token or device credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A stale or already-resolved claim token was presented.
    ///
    /// The attempted mutation was discarded; the work was reclaimed or
    /// completed through another path. Callers must treat this as non-fatal.
    #[error("lease mismatch for command {command_id}")]
    LeaseMismatch { command_id: String },

    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Direct push target has no live channel on this instance.
    #[error("device {device_id} is not connected")]
    NotConnected { device_id: String },

    /// Transient network or I/O failure (retried with bounded backoff).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed message on the gateway protocol. The offending message is
    /// dropped; the connection is not torn down.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl NetpulseError {
    /// True for the stale-claim rejection that callers discard without failing.
    pub fn is_lease_mismatch(&self) -> bool {
        matches!(self, NetpulseError::LeaseMismatch { .. })
    }
}
