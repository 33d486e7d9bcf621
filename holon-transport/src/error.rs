//! Transport-wide error type

use thiserror::Error;

/// Errors produced by URI parsing, listener lifecycle, and connection I/O.
///
/// Messages carry the offending URI or the underlying OS error string so
/// callers can log them without reconstructing context.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The URI has a recognised scheme but malformed content
    #[error("invalid URI: {0}")]
    InvalidUri(String),

    /// The URI scheme is not one of the six this SDK understands
    #[error("unsupported URI: {0}")]
    UnsupportedUri(String),

    /// The scheme parses but has no runtime listener at this layer
    #[error("runtime listener unsupported: {0}")]
    RuntimeUnsupported(String),

    /// Binding a listener failed; carries the last OS error observed
    #[error("listen failed: {0}")]
    ListenFailed(String),

    /// Accepting a connection failed for a live listener
    #[error("accept failed: {0}")]
    AcceptFailed(String),

    /// The listener (or connection) was closed
    #[error("listener closed: {0}")]
    ListenerClosed(String),

    /// A read or write on an open connection failed
    #[error("I/O failure: {0}")]
    Io(String),
}
