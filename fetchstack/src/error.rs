//! Error types for downloads and the download manager.

use thiserror::Error;

/// Errors returned synchronously by download and manager operations.
///
/// These are programmer errors: the offending call fails before it has
/// any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    /// The download was already started (or submitted twice in one batch).
    ///
    /// A finished download has to be replaced with
    /// [`Download::fresh_copy`](crate::Download::fresh_copy) before reuse.
    #[error("download has already been started")]
    AlreadyStarted,

    /// A stack with the same name is still in flight.
    #[error("a stack named '{name}' is already in flight")]
    DuplicateStack { name: String },

    /// A URL string could not be turned into a request.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Errors reported by the transport for a single download.
///
/// Carried on the failed [`Download`](crate::Download) and handed to
/// [`DownloadDelegate::download_did_fail`](crate::DownloadDelegate::download_did_fail).
/// A transport error never affects sibling downloads in the same stack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    /// The request could not be sent or the connection failed.
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The request did not complete within its timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The response body could not be read to the end.
    #[error("failed to read response body from {url}: {reason}")]
    Body { url: String, reason: String },
}
