//! Request descriptors.
//!
//! A [`DownloadRequest`] is the immutable description of what a
//! [`Download`](crate::Download) fetches. It is built from a URL string, a
//! parsed [`Url`], or assembled with the `with_*` builders.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};

use crate::error::DownloadError;

/// Description of a single HTTP request.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    url: Url,
    method: Method,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl DownloadRequest {
    /// Create a GET request for the given URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            timeout: None,
        }
    }

    /// Parse a URL string into a GET request.
    ///
    /// Only `http` and `https` URLs are accepted.
    pub fn parse(url: &str) -> Result<Self, DownloadError> {
        let parsed = Url::parse(url.trim()).map_err(|e| DownloadError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        match parsed.scheme() {
            "http" | "https" => Ok(Self::new(parsed)),
            other => Err(DownloadError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", other),
            }),
        }
    }

    /// Set the HTTP method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a header. Repeated names are appended, not replaced.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set a per-request timeout overriding the transport default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::ACCEPT;

    #[test]
    fn test_parse_defaults_to_get() {
        let request = DownloadRequest::parse("https://example.com/feed.json").unwrap();
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.url().as_str(), "https://example.com/feed.json");
        assert!(request.headers().is_empty());
        assert!(request.timeout().is_none());
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let request = DownloadRequest::parse("  http://example.com/  ").unwrap();
        assert_eq!(request.url().host_str(), Some("example.com"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = DownloadRequest::parse("not a url").unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl { .. }));
    }

    #[test]
    fn test_parse_rejects_non_http_scheme() {
        let err = DownloadRequest::parse("ftp://example.com/file").unwrap_err();
        match err {
            DownloadError::InvalidUrl { reason, .. } => assert!(reason.contains("ftp")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_builders() {
        let request = DownloadRequest::parse("https://example.com/")
            .unwrap()
            .with_method(Method::HEAD)
            .with_header(ACCEPT, HeaderValue::from_static("text/html"))
            .with_header(ACCEPT, HeaderValue::from_static("application/json"))
            .with_timeout(Duration::from_secs(5));

        assert_eq!(request.method(), &Method::HEAD);
        assert_eq!(request.headers().get_all(ACCEPT).iter().count(), 2);
        assert_eq!(request.timeout(), Some(Duration::from_secs(5)));
    }
}
