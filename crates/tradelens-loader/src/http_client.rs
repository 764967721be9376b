use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::LoaderError;

/// A GET request as seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
    /// Transports that can see the declared length should skip reading bodies above this.
    pub max_body_bytes: u64,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(15),
            max_body_bytes: u64::MAX,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// Response with lowercased header names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// Bytes read before the transport stopped at `max_body_bytes`. The body
    /// is empty when set.
    pub body_exceeded: Option<u64>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
            body_exceeded: None,
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Empty response recording that the body ran past the ceiling.
    pub fn exceeded(mut self, bytes_read: u64) -> Self {
        self.body.clear();
        self.body_exceeded = Some(bytes_read);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// `Retry-After` in whole seconds. HTTP-date values are ignored.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.header("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Other,
}

/// Failure below HTTP: no status line was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }
}

/// Transport seam. Mockable for testing.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Production transport using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self, LoaderError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tradelens/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LoaderError::Http(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.get(&request.url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let mut response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::timeout(format!("request timeout: {e}"))
            } else if e.is_connect() {
                TransportError::connect(format!("connection failed: {e}"))
            } else {
                TransportError::new(TransportErrorKind::Other, format!("request failed: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }

        // Declared length over the ceiling: hand back headers only and let the
        // executor classify it without buffering the body.
        if response
            .content_length()
            .is_some_and(|len| len > request.max_body_bytes)
        {
            return Ok(HttpResponse {
                status,
                headers,
                body: String::new(),
                body_exceeded: None,
            });
        }

        // No trustworthy length (chunked or lying): stop at the ceiling.
        let mut body = CappedBody::new(request.max_body_bytes);
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::timeout(format!("body read timeout: {e}"))
            } else {
                TransportError::new(
                    TransportErrorKind::Other,
                    format!("failed to read response body: {e}"),
                )
            }
        })? {
            if !body.push(&chunk) {
                return Ok(HttpResponse {
                    status,
                    headers,
                    body: String::new(),
                    body_exceeded: None,
                }
                .exceeded(body.len()));
            }
        }

        Ok(HttpResponse {
            status,
            headers,
            body: body.into_text(),
            body_exceeded: None,
        })
    }
}

/// Response body buffer bounded by a byte ceiling.
#[derive(Debug)]
struct CappedBody {
    bytes: Vec<u8>,
    read: u64,
    max: u64,
}

impl CappedBody {
    fn new(max: u64) -> Self {
        Self {
            bytes: Vec::new(),
            read: 0,
            max,
        }
    }

    /// Append a chunk. Returns false, keeping nothing more, once the total
    /// passes the ceiling.
    fn push(&mut self, chunk: &[u8]) -> bool {
        self.read = self.read.saturating_add(chunk.len() as u64);
        if self.read > self.max {
            self.bytes = Vec::new();
            return false;
        }
        self.bytes.extend_from_slice(chunk);
        true
    }

    fn len(&self) -> u64 {
        self.read
    }

    fn into_text(self) -> String {
        match String::from_utf8(self.bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_case_insensitive() {
        let response = HttpResponse::new(429, "")
            .with_header("Retry-After", "7")
            .with_header("Content-Length", "1024");
        assert_eq!(response.retry_after_secs(), Some(7));
        assert_eq!(response.content_length(), Some(1024));
        assert_eq!(response.header("RETRY-AFTER"), Some("7"));
    }

    #[test]
    fn http_date_retry_after_is_ignored() {
        let response =
            HttpResponse::new(429, "").with_header("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(response.retry_after_secs(), None);
    }

    #[test]
    fn request_builder() {
        let request = HttpRequest::get("https://api.test/x")
            .with_header("Accept", "application/json")
            .with_timeout(Duration::from_millis(250))
            .with_max_body_bytes(10);
        assert_eq!(
            request.headers.get("accept").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(request.timeout, Duration::from_millis(250));
        assert_eq!(request.max_body_bytes, 10);
    }

    #[test]
    fn capped_body_stops_past_the_ceiling() {
        let mut body = CappedBody::new(8);
        assert!(body.push(b"abcd"));
        assert!(body.push(b"efgh"));
        assert!(!body.push(b"i"));
        assert_eq!(body.len(), 9);
        assert!(body.bytes.is_empty());

        let mut body = CappedBody::new(8);
        assert!(body.push("h\u{e9}".as_bytes()));
        assert_eq!(body.into_text(), "h\u{e9}");
    }

    #[test]
    fn exceeded_response_drops_the_body() {
        let response = HttpResponse::ok("partial").exceeded(11);
        assert!(response.body.is_empty());
        assert_eq!(response.body_exceeded, Some(11));
    }

    /// Serve one chunked response with no Content-Length.
    async fn chunked_server(chunks: usize, chunk_size: usize) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ntransfer-encoding: chunked\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let chunk = format!("{chunk_size:x}\r\n{}\r\n", "a".repeat(chunk_size));
            for _ in 0..chunks {
                if socket.write_all(chunk.as_bytes()).await.is_err() {
                    return;
                }
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        });
        format!("http://{addr}/stream")
    }

    fn loopback_client() -> ReqwestHttpClient {
        ReqwestHttpClient::with_client(reqwest::Client::builder().no_proxy().build().unwrap())
    }

    #[tokio::test]
    async fn chunked_body_over_ceiling_is_not_buffered() {
        let url = chunked_server(64, 1024).await;
        let client = loopback_client();
        let response = client
            .get(HttpRequest::get(url).with_max_body_bytes(4 * 1024))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert!(response.content_length().is_none());
        assert!(response.body.is_empty());
        assert!(response.body_exceeded.is_some_and(|n| n > 4 * 1024));
    }

    #[tokio::test]
    async fn chunked_body_under_ceiling_is_read_whole() {
        let url = chunked_server(3, 100).await;
        let client = loopback_client();
        let response = client
            .get(HttpRequest::get(url).with_max_body_bytes(4 * 1024))
            .await
            .unwrap();
        assert_eq!(response.body.len(), 300);
        assert_eq!(response.body_exceeded, None);
    }

    #[test]
    fn success_range() {
        assert!(HttpResponse::ok("").is_success());
        assert!(!HttpResponse::new(500, "").is_success());
    }
}
