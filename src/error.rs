//! Error type for the reconciliation surface.
//!
//! Transport, session and config code returns `anyhow::Result`; the
//! reconciler returns [`Error`] so callers can tell a misuse of the node API
//! apart from a serialization failure.

use thiserror::Error;

/// Errors raised by the reconciler, translator and wire codec.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller used the node API in a way the remote widgets cannot express.
    #[error("usage error: {0}")]
    Usage(String),

    /// The node handle refers to a node that was already discarded.
    #[error("node {0} no longer exists")]
    StaleNode(String),

    /// An element-only operation was called on a root or text node.
    #[error("node {0} is not an element")]
    NotAnElement(String),

    /// A text-only operation was called on a root or element node.
    #[error("node {0} is not a text node")]
    NotAText(String),

    /// A frame payload could not be decoded.
    #[error("failed to decode payload: {0}")]
    Decode(String),

    /// A value could not be encoded into a frame payload.
    #[error("failed to encode payload: {0}")]
    Encode(String),
}

/// Result alias for reconciler operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
