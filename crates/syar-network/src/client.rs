//! HTTP Client
//!
//! Uses hyper with tokio for async HTTP/1.1.
//! Features:
//! - Automatic HTTPS with rustls (memory-safe TLS)
//! - Connect and whole-request timeouts
//! - Response body size limit
//!
//! This is the unguarded transport behind the real fetch primitive.

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE, HOST, USER_AGENT};
use hyper::{Method, Request, StatusCode, Uri};
use rustls::ClientConfig;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use syar_policy::UrlLike;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

/// HTTP client errors
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Request blocked: {0}")]
    Blocked(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Body read error: {0}")]
    BodyError(String),

    #[error("Response body exceeds {0} bytes")]
    BodyTooLarge(usize),
}

impl HttpError {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// User-Agent string
    pub user_agent: String,
    /// Maximum response body size
    pub max_body_size: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: "Syar-Automation/0.1".to_string(),
            max_body_size: 10 * 1024 * 1024, // 10 MB
        }
    }
}

/// Everything a fetch call carries
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl FetchRequest {
    /// GET request with no headers
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: hyper::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

impl UrlLike for FetchRequest {
    fn url_like(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.url.as_str()))
    }
}

/// HTTP response wrapper
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Vec<u8>,
    /// Time to first byte
    pub ttfb: Duration,
    /// Total download time
    pub total_time: Duration,
    /// Final URL
    pub final_url: String,
}

impl Response {
    /// Response produced locally, without any network activity
    pub fn synthetic(status: StatusCode, content_type: &'static str, body: Vec<u8>, url: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            status,
            headers,
            body,
            ttfb: Duration::ZERO,
            total_time: Duration::ZERO,
            final_url: url.to_string(),
        }
    }

    /// Check if response was successful (2xx)
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get body as string
    pub fn text(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.clone())
    }

    /// Decode the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Get Content-Type header
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }
}

/// Plain HTTP client, no policy of its own
pub struct HttpClient {
    /// Configuration
    config: HttpClientConfig,
    /// Shared TLS configuration with webpki roots
    tls: Arc<ClientConfig>,
    /// Statistics
    stats: ClientStats,
}

/// Client statistics
#[derive(Debug, Default)]
pub struct ClientStats {
    pub requests_made: AtomicU64,
    pub requests_failed: AtomicU64,
    pub bytes_downloaded: AtomicU64,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: HttpClientConfig) -> Self {
        info!(
            "HTTP client initialized (timeout: {:?}, connect timeout: {:?})",
            config.timeout, config.connect_timeout
        );

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Self {
            config,
            tls: Arc::new(tls),
            stats: ClientStats::default(),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(HttpClientConfig::default())
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Perform a GET request
    pub async fn get(&self, url: &str) -> Result<Response, HttpError> {
        self.execute(FetchRequest::get(url)).await
    }

    /// Perform a POST request
    pub async fn post(&self, url: &str, body: Vec<u8>) -> Result<Response, HttpError> {
        self.execute(FetchRequest::new(Method::POST, url).with_body(body)).await
    }

    /// Perform a request, bounded by the configured timeout
    pub async fn execute(&self, request: FetchRequest) -> Result<Response, HttpError> {
        self.stats.requests_made.fetch_add(1, Ordering::Relaxed);

        let result = tokio::time::timeout(self.config.timeout, self.send(request))
            .await
            .unwrap_or(Err(HttpError::Timeout));

        if result.is_err() {
            self.stats.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn send(&self, request: FetchRequest) -> Result<Response, HttpError> {
        let start = Instant::now();
        let FetchRequest { method, url, headers, body } = request;

        // 1. Parse URL
        let uri: Uri = url
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| HttpError::InvalidUrl(e.to_string()))?;

        let host = uri
            .host()
            .ok_or_else(|| HttpError::InvalidUrl("No host in URL".to_string()))?
            .to_string();
        let is_https = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            other => return Err(HttpError::InvalidUrl(format!("Unsupported scheme: {:?}", other))),
        };
        let port = uri.port_u16().unwrap_or(if is_https { 443 } else { 80 });

        // 2. Build request
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(&uri)
            .header(USER_AGENT, &self.config.user_agent)
            .header(HOST, &host);
        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }
        let request = builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| HttpError::HttpError(e.to_string()))?;

        // 3. Connect
        let addr = format!("{}:{}", host, port);
        let ttfb_start = Instant::now();

        let stream = tokio::time::timeout(self.config.connect_timeout, tokio::net::TcpStream::connect(&addr))
            .await
            .map_err(|_| HttpError::Timeout)?
            .map_err(|e| HttpError::ConnectionFailed(e.to_string()))?;

        // 4. Send, wrapping in TLS for HTTPS
        let response = if is_https {
            let connector = TlsConnector::from(Arc::clone(&self.tls));
            let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                .map_err(|_| HttpError::TlsError("Invalid server name".to_string()))?;

            let tls_stream = connector
                .connect(server_name, stream)
                .await
                .map_err(|e| HttpError::TlsError(e.to_string()))?;

            Self::round_trip(tls_stream, request).await?
        } else {
            Self::round_trip(stream, request).await?
        };

        let ttfb = ttfb_start.elapsed();

        // 5. Read response
        let status = response.status();
        let headers = response.headers().clone();

        let limit = self.config.max_body_size;
        let collected = Limited::new(response.into_body(), limit)
            .collect()
            .await
            .map_err(|e| {
                if e.is::<LengthLimitError>() {
                    HttpError::BodyTooLarge(limit)
                } else {
                    HttpError::BodyError(e.to_string())
                }
            })?;
        let body_bytes = collected.to_bytes().to_vec();

        let total_time = start.elapsed();
        self.stats
            .bytes_downloaded
            .fetch_add(body_bytes.len() as u64, Ordering::Relaxed);

        debug!(
            "HTTP {} {} -> {} ({} bytes, {:?} TTFB)",
            method,
            url,
            status,
            body_bytes.len(),
            ttfb
        );

        Ok(Response {
            status,
            headers,
            body: body_bytes,
            ttfb,
            total_time,
            final_url: url,
        })
    }

    async fn round_trip<S>(
        io: S,
        request: Request<Full<Bytes>>,
    ) -> Result<hyper::Response<hyper::body::Incoming>, HttpError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let io = hyper_util::rt::TokioIo::new(io);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| HttpError::HttpError(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                warn!("Connection error: {}", e);
            }
        });

        sender
            .send_request(request)
            .await
            .map_err(|e| HttpError::HttpError(e.to_string()))
    }

    /// Get client statistics: (made, failed, bytes downloaded)
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.requests_made.load(Ordering::Relaxed),
            self.stats.requests_failed.load(Ordering::Relaxed),
            self.stats.bytes_downloaded.load(Ordering::Relaxed),
        )
    }
}
