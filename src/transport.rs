//! The pluggable HTTP transport.
//!
//! The protocol machine in [`crate::caldav`] never talks to `hyper` directly;
//! it is generic over anything implementing [`Transport`]. [`HyperTransport`]
//! is the default, production implementation: rustls with native roots,
//! falling back to the bundled webpki store, HTTP/1.1 + HTTP/2.

use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{HeaderMap, Method, Uri, header};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use std::collections::HashMap;
use tokio::time::{Duration, timeout};

use crate::common::compression::{ContentEncoding, add_accept_encoding, detect_encoding};

/// Basic or Digest credentials for the transport's auth header.
///
/// Digest auth requires a server challenge round-trip; the core does not
/// implement the digest handshake itself (that belongs to the transport),
/// it only carries the username/password pair through to whichever
/// transport is configured.
#[derive(Clone, Debug)]
pub enum Credentials {
    Basic { username: String, password: String },
    Digest { username: String, password: String },
    None,
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// A fully aggregated HTTP response: status, headers, and decompressed body.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The collaborator interface the core requires.
///
/// Implementors are responsible for credentials binding, cookie/redirect
/// policy, and TLS; the core only ever calls `execute`.
pub trait Transport: Clone + Send + Sync {
    fn execute(
        &self,
        method: &str,
        url: &str,
        headers: HashMap<String, String>,
        body: Option<Bytes>,
        timeout_override: Option<Duration>,
    ) -> impl std::future::Future<Output = Result<TransportResponse>> + Send;
}

/// Type alias for the hyper client used by [`HyperTransport`].
pub type HyperClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, Full<Bytes>>;

fn build_hyper_client() -> Result<HyperClient> {
    let https_builder = HttpsConnectorBuilder::new()
        .with_native_roots()
        .unwrap_or_else(|err| {
            #[cfg(debug_assertions)]
            eprintln!("caldav-core: falling back to webpki roots (native roots unavailable: {err})");
            HttpsConnectorBuilder::new().with_webpki_roots()
        });

    let https = https_builder
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();

    Ok(Client::builder(TokioExecutor::new())
        .http2_adaptive_window(true)
        .pool_max_idle_per_host(128)
        .build::<_, Full<Bytes>>(https))
}

/// Default transport built on `hyper` 1.x + `rustls`, with automatic
/// response decompression (br/gzip/zstd).
///
/// Cloning is cheap and reuses the same connection pool.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
    auth_header: Option<String>,
    default_timeout: Duration,
}

impl HyperTransport {
    pub fn new(credentials: Credentials) -> Result<Self> {
        let client = build_hyper_client()?;
        let auth_header = match credentials {
            Credentials::Basic { username, password } | Credentials::Digest { username, password } => {
                let token = format!("{username}:{password}");
                Some(format!("Basic {}", B64.encode(token)))
            }
            Credentials::None => None,
        };

        Ok(Self {
            client,
            auth_header,
            default_timeout: Duration::from_secs(60),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

impl Transport for HyperTransport {
    async fn execute(
        &self,
        method: &str,
        url: &str,
        mut headers: HashMap<String, String>,
        body: Option<Bytes>,
        timeout_override: Option<Duration>,
    ) -> Result<TransportResponse> {
        let uri: Uri = url.parse()?;
        let method = Method::from_bytes(method.as_bytes())?;
        let mut builder = hyper::Request::builder().method(method).uri(uri);

        if let Some(auth) = &self.auth_header {
            builder = builder.header(header::AUTHORIZATION, auth);
        }

        let mut header_map = HeaderMap::new();
        for (k, v) in headers.drain() {
            header_map.insert(
                header::HeaderName::from_bytes(k.as_bytes())?,
                header::HeaderValue::from_str(&v)?,
            );
        }
        add_accept_encoding(&mut header_map);
        for (k, v) in header_map.iter() {
            builder = builder.header(k, v);
        }

        let req = match body {
            Some(b) => builder.body(Full::new(b))?,
            None => builder.body(Full::new(Bytes::new()))?,
        };

        let fut = self.client.request(req);
        let resp = timeout(timeout_override.unwrap_or(self.default_timeout), fut)
            .await
            .map_err(|_| anyhow!("request timed out"))??;

        let encoding = detect_encoding(resp.headers());
        let status = resp.status().as_u16();
        let mut out_headers = HashMap::new();
        for (k, v) in resp.headers().iter() {
            if let Ok(value) = v.to_str() {
                out_headers.insert(k.as_str().to_string(), value.to_string());
            }
        }

        let body = crate::common::compression::decompress_body(resp.into_body(), encoding).await?;

        Ok(TransportResponse {
            status,
            headers: out_headers,
            body,
        })
    }
}
