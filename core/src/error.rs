//! Error types for the Xibo client.
//!
//! # Design
//! `Authentication` covers every failure of the token exchange, with the most
//! specific message the CMS offered. Resource calls that come back non-2xx
//! land in `Http` with the raw status and body, untouched. Parameter and
//! binary-data errors are raised before any request leaves the process.

use thiserror::Error;

/// Errors returned by `XiboClient` and the resource router.
#[derive(Debug, Error)]
pub enum XiboError {
    /// The token endpoint rejected the credential or answered without an
    /// `access_token`.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// A resource call returned a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never produced a response (DNS, connect, timeout, I/O).
    #[error("transport error: {0}")]
    Transport(String),

    /// A media upload named a binary property the item does not carry.
    #[error("No binary data found for property \"{property}\"")]
    MissingBinaryData { property: String },

    #[error("missing required parameter \"{name}\"")]
    MissingParameter { name: String },

    #[error("invalid parameter \"{name}\": {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("operation \"{operation}\" is not supported for resource \"{resource}\"")]
    UnsupportedOperation { resource: String, operation: String },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl XiboError {
    /// Upstream status code, if the CMS answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            XiboError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T, E = XiboError> = std::result::Result<T, E>;
