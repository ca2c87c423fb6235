//! Transport abstraction for performing HTTP requests.
//!
//! The [`Transport`] trait is the seam between the download bookkeeping and
//! the network. A transport pushes zero or more body chunks into a
//! [`BodySink`] and resolves exactly once with the response status code or a
//! [`TransportError`].
//!
//! Aborting a request is done by dropping the future returned from
//! [`Transport::send`]; implementations must not deliver anything to the sink
//! once dropped.
//!
//! # Dyn Compatibility
//!
//! `send` returns a boxed future so managers can hold an
//! `Arc<dyn Transport>` and tests can substitute scripted transports.

mod http;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::TransportError;
use crate::request::DownloadRequest;

pub use http::ReqwestTransport;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Receiver for response body chunks as they arrive.
pub trait BodySink: Send {
    /// Called for every chunk of the response body, in order.
    fn data_received(&mut self, chunk: Bytes);
}

/// Asynchronous request/response primitive.
pub trait Transport: Send + Sync + 'static {
    /// Perform `request`, streaming the body into `body`.
    ///
    /// Resolves with the HTTP status code once the body has been fully
    /// delivered. Any response the server sends back, including error
    /// statuses, counts as a completed request.
    fn send<'a>(
        &'a self,
        request: &'a DownloadRequest,
        body: &'a mut dyn BodySink,
    ) -> BoxFuture<'a, Result<u16, TransportError>>;
}
