//! Real transport implementation using reqwest.

use reqwest::Client;

use super::{BodySink, BoxFuture, Transport};
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::request::DownloadRequest;

/// Transport backed by an async [`reqwest::Client`].
///
/// The client is shared by every download performed through it, so
/// connections are pooled across stacks.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport from the given configuration.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wraps an already configured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn perform(
        &self,
        request: &DownloadRequest,
        body: &mut dyn BodySink,
    ) -> Result<u16, TransportError> {
        let url = request.url().as_str();

        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());
        if let Some(timeout) = request.timeout() {
            builder = builder.timeout(timeout);
        }

        let mut response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    url: url.to_string(),
                }
            } else {
                TransportError::Request {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();

        loop {
            let chunk = response.chunk().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    TransportError::Body {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

            match chunk {
                Some(chunk) => body.data_received(chunk),
                None => break,
            }
        }

        Ok(status)
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(
        &'a self,
        request: &'a DownloadRequest,
        body: &'a mut dyn BodySink,
    ) -> BoxFuture<'a, Result<u16, TransportError>> {
        Box::pin(self.perform(request, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    struct Discard;

    impl BodySink for Discard {
        fn data_received(&mut self, _chunk: Bytes) {}
    }

    #[test]
    fn test_transport_from_default_config() {
        assert!(ReqwestTransport::new(&TransportConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused_is_request_error() {
        let transport = ReqwestTransport::new(&TransportConfig::default()).unwrap();
        let request = DownloadRequest::parse("http://127.0.0.1:1/unreachable").unwrap();
        let mut sink = Discard;

        let result = transport.send(&request, &mut sink).await;

        match result {
            Err(TransportError::Request { url, .. }) => {
                assert_eq!(url, "http://127.0.0.1:1/unreachable");
            }
            other => panic!("expected request error, got {:?}", other),
        }
    }
}
