//! Scripted transport for unit tests.
//!
//! Requests for URLs without a gate complete immediately with a 200 and the
//! URL as body. Gated URLs wait until the test releases them.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::{BodySink, BoxFuture, Transport};
use crate::error::TransportError;
use crate::request::DownloadRequest;

/// Outcome a gated request resolves with.
pub(crate) enum Reply {
    Ok { status: u16, body: Vec<u8> },
    Err(TransportError),
}

impl Reply {
    pub(crate) fn ok(body: &str) -> Self {
        Reply::Ok {
            status: 200,
            body: body.as_bytes().to_vec(),
        }
    }

    pub(crate) fn failed(url: &str) -> Self {
        Reply::Err(TransportError::Request {
            url: url.to_string(),
            reason: "scripted failure".to_string(),
        })
    }
}

#[derive(Default)]
pub(crate) struct GatedTransport {
    gates: Mutex<HashMap<String, oneshot::Receiver<Reply>>>,
    sent: Mutex<Vec<String>>,
}

impl GatedTransport {
    /// Gate the given URL; the returned sender releases it.
    pub(crate) fn gate(&self, url: &str) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(url.to_string(), rx);
        tx
    }

    /// URLs that reached the transport, in arrival order.
    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

impl Transport for GatedTransport {
    fn send<'a>(
        &'a self,
        request: &'a DownloadRequest,
        body: &'a mut dyn BodySink,
    ) -> BoxFuture<'a, Result<u16, TransportError>> {
        Box::pin(async move {
            let url = request.url().as_str().to_string();
            self.sent.lock().push(url.clone());
            let gate = self.gates.lock().remove(&url);

            let reply = match gate {
                Some(rx) => rx.await.unwrap_or_else(|_| Reply::failed(&url)),
                None => Reply::ok(&url),
            };

            match reply {
                Reply::Ok { status, body: bytes } => {
                    body.data_received(Bytes::from(bytes));
                    Ok(status)
                }
                Reply::Err(e) => Err(e),
            }
        })
    }
}
