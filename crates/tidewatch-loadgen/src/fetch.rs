//! Single-request execution and outcome classification.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Uri;
use http::header::{ACCEPT, HOST, USER_AGENT};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::trace;

/// Why a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    Timeout,
    ConnectionError,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Timeout => write!(f, "Timeout"),
            ErrorKind::ConnectionError => write!(f, "Connection Error"),
            ErrorKind::Other => write!(f, "Other"),
        }
    }
}

/// Outcome of one request as seen by the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestResult {
    pub success: bool,
    pub status_code: Option<u16>,
    pub latency: Duration,
    pub content_length: u64,
    pub error_kind: Option<ErrorKind>,
}

impl RequestResult {
    pub fn success(status_code: u16, latency: Duration, content_length: u64) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            latency,
            content_length,
            error_kind: None,
        }
    }

    pub fn failure(kind: ErrorKind, latency: Duration) -> Self {
        Self {
            success: false,
            status_code: None,
            latency,
            content_length: 0,
            error_kind: Some(kind),
        }
    }
}

/// A response that made it back, whatever its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_length: u64,
}

#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: ErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Issues the repeated request. Timing and timeouts are applied by the
/// caller.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send;
}

/// TLS client settings for `https` targets.
#[derive(Clone)]
struct TlsTarget {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

/// HTTP/1.1 GET against a fixed URI, one connection per request. `https`
/// targets are wrapped in rustls.
#[derive(Clone)]
pub struct HttpFetcher {
    uri: Uri,
    /// `host:port` to connect to.
    address: String,
    /// Origin-form request target.
    path: String,
    tls: Option<TlsTarget>,
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("uri", &self.uri)
            .field("address", &self.address)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl HttpFetcher {
    /// Fetcher for `uri`. `https` targets verify against the Mozilla root
    /// store.
    pub fn new(uri: Uri) -> Result<Self, FetchError> {
        if uri.scheme_str() == Some("https") {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            let config = client_config_builder()?
                .with_root_certificates(roots)
                .with_no_client_auth();
            Self::with_tls_config(uri, Arc::new(config))
        } else {
            Ok(Self::plain(uri))
        }
    }

    /// Fetcher with a caller-supplied TLS configuration, used for `https`
    /// targets only.
    pub fn with_tls_config(
        uri: Uri,
        config: Arc<rustls::ClientConfig>,
    ) -> Result<Self, FetchError> {
        let mut fetcher = Self::plain(uri);
        if fetcher.uri.scheme_str() == Some("https") {
            let host = fetcher.uri.host().unwrap_or_default().to_string();
            let server_name = ServerName::try_from(host).map_err(|e| {
                FetchError::new(ErrorKind::Other, format!("invalid TLS server name: {e}"))
            })?;
            fetcher.tls = Some(TlsTarget {
                connector: TlsConnector::from(config),
                server_name,
            });
        }
        Ok(fetcher)
    }

    fn plain(uri: Uri) -> Self {
        let default_port = if uri.scheme_str() == Some("https") { 443 } else { 80 };
        let host = uri.host().unwrap_or_default();
        let address = format!("{host}:{}", uri.port_u16().unwrap_or(default_port));
        let path = uri
            .path_and_query()
            .map(|p| p.as_str())
            .filter(|p| !p.is_empty())
            .unwrap_or("/")
            .to_string();
        Self {
            uri,
            address,
            path,
            tls: None,
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Send the GET over an established stream and drain the response.
    async fn exchange<T>(&self, stream: T) -> Result<FetchResponse, FetchError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| {
                trace!(error = %e, uri = %self.uri, "handshake failed");
                FetchError::new(ErrorKind::ConnectionError, e.to_string())
            })?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let host = self
            .uri
            .authority()
            .map(|a| a.as_str().to_string())
            .unwrap_or_else(|| self.address.clone());
        let req = http::Request::builder()
            .method("GET")
            .uri(self.path.as_str())
            .header(HOST, host)
            .header(USER_AGENT, "tidewatch-loadgen/0.1")
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .body(Empty::<Bytes>::new())
            .map_err(|e| FetchError::new(ErrorKind::Other, e.to_string()))?;

        let resp = sender.send_request(req).await.map_err(|e| {
            let kind = classify(&e);
            trace!(error = %e, uri = %self.uri, %kind, "request failed");
            FetchError::new(kind, e.to_string())
        })?;

        let status = resp.status().as_u16();
        let body = resp.into_body().collect().await.map_err(|e| {
            trace!(error = %e, uri = %self.uri, "reading response body failed");
            FetchError::new(ErrorKind::ConnectionError, e.to_string())
        })?;

        Ok(FetchResponse {
            status,
            content_length: body.to_bytes().len() as u64,
        })
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self) -> Result<FetchResponse, FetchError> {
        let stream = TcpStream::connect(&self.address).await.map_err(|e| {
            trace!(error = %e, uri = %self.uri, "connection failed");
            FetchError::new(ErrorKind::ConnectionError, e.to_string())
        })?;

        match &self.tls {
            Some(tls) => {
                let stream = tls
                    .connector
                    .connect(tls.server_name.clone(), stream)
                    .await
                    .map_err(|e| {
                        trace!(error = %e, uri = %self.uri, "TLS handshake failed");
                        FetchError::new(ErrorKind::ConnectionError, e.to_string())
                    })?;
                self.exchange(stream).await
            }
            None => self.exchange(stream).await,
        }
    }
}

fn client_config_builder()
-> Result<rustls::ConfigBuilder<rustls::ClientConfig, rustls::WantsVerifier>, FetchError> {
    rustls::ClientConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
        .with_safe_default_protocol_versions()
        .map_err(|e| FetchError::new(ErrorKind::Other, format!("tls protocol version error: {e}")))
}

/// Closed, truncated, or I/O-failed exchanges are connection errors;
/// anything else hyper reports is `Other`.
fn classify(e: &hyper::Error) -> ErrorKind {
    if e.is_closed() || e.is_incomplete_message() || e.is_canceled() {
        return ErrorKind::ConnectionError;
    }
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if err.is::<io::Error>() {
            return ErrorKind::ConnectionError;
        }
        source = err.source();
    }
    ErrorKind::Other
}
