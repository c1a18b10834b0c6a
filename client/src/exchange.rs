//! HTTP exchange with the remote service.
//!
//! One call to [`HttpExchange::send`] is exactly one HTTP request. There is
//! no retry anywhere in here; a failed request is reported as
//! `RemoteExchangeFailed` and the caller decides what to do.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use pfurl_shared::protocol::DEFAULT_CONTENT_TYPE;
use pfurl_shared::{Error, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, Url};
use tracing::{debug, info, warn};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest slice of an error body quoted back in the failure cause
const MAX_ERROR_BODY: usize = 512;

/// `user:password` credentials
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub user: String,
    pub password: Option<String>,
}

impl BasicAuth {
    /// Split on the first `:`. Without one the whole string is the user name.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((user, password)) => Self {
                user: user.to_string(),
                password: Some(password.to_string()),
            },
            None => Self {
                user: raw.to_string(),
                password: None,
            },
        }
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Bearer token, never printed
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Everything needed to reach the remote service
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub verb: Method,
    pub url: Url,
    pub proxy: Option<Url>,
    pub auth: Option<BasicAuth>,
    pub auth_token: Option<BearerToken>,
    pub content_type: String,
    pub verify_certs: bool,
    pub timeout: Duration,
}

impl ExchangeConfig {
    pub fn new(verb: Method, url: Url) -> Self {
        Self {
            verb,
            url,
            proxy: None,
            auth: None,
            auth_token: None,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            verify_certs: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Request payload
#[derive(Debug)]
pub enum RequestBody {
    Empty,
    /// Message bytes, sent with the configured content type
    Message(Vec<u8>),
    /// Archive push: multipart form with the archive file and the message
    Archive {
        message: Vec<u8>,
        path: PathBuf,
        file_name: String,
    },
}

/// Parse the target address, defaulting the scheme to `http`.
pub fn parse_target(raw: &str) -> Result<Url> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    Url::parse(&candidate).map_err(|e| Error::InvalidUrl(format!("{}: {}", raw, e)))
}

/// Parse a proxy address. Only plain `http` proxies are supported.
pub fn parse_proxy(raw: &str) -> Result<Url> {
    if let Some((scheme, _)) = raw.split_once("://") {
        if !scheme.eq_ignore_ascii_case("http") {
            return Err(Error::UnsupportedProxyScheme(scheme.to_string()));
        }
    }
    parse_target(raw)
}

/// HTTP client bound to one target
pub struct HttpExchange {
    client: reqwest::Client,
    config: ExchangeConfig,
}

impl HttpExchange {
    pub fn new(config: ExchangeConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);

        builder = match &config.proxy {
            Some(proxy) => {
                if proxy.scheme() != "http" {
                    return Err(Error::UnsupportedProxyScheme(proxy.scheme().to_string()));
                }
                debug!("Routing through proxy {}", proxy);
                let proxy = reqwest::Proxy::all(proxy.as_str())
                    .map_err(|e| Error::InvalidUrl(format!("proxy {}: {}", proxy, e)))?;
                builder.proxy(proxy)
            }
            // Environment proxies only apply when asked for explicitly
            None => builder.no_proxy(),
        };

        if !config.verify_certs {
            warn!("TLS certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|e| Error::RemoteExchangeFailed {
            status: None,
            cause: format!("failed to build HTTP client: {}", e),
        })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Perform one request and return the full response body.
    pub async fn send(&self, body: RequestBody) -> Result<Vec<u8>> {
        let config = &self.config;
        info!("{} {}", config.verb, config.url);

        let mut request = self.client.request(config.verb.clone(), config.url.clone());

        if let Some(auth) = &config.auth {
            request = request.basic_auth(&auth.user, auth.password.as_ref());
        }
        // Both may be present; the remote service decides which one wins
        if let Some(token) = &config.auth_token {
            request = request.bearer_auth(&token.0);
        }

        request = match body {
            RequestBody::Empty => request,
            RequestBody::Message(bytes) => {
                debug!("Sending {} byte message", bytes.len());
                request
                    .header(CONTENT_TYPE, config.content_type.as_str())
                    .body(bytes)
            }
            RequestBody::Archive {
                message,
                path,
                file_name,
            } => {
                let archive = tokio::fs::read(&path).await?;
                debug!("Sending archive {} ({} bytes)", path.display(), archive.len());
                let file = Part::bytes(archive)
                    .file_name(file_name)
                    .mime_str("application/zip")
                    .map_err(|e| transport_error(&e))?;
                let form = Form::new()
                    .text("d_msg", String::from_utf8_lossy(&message).into_owned())
                    .part("local", file);
                request.multipart(form)
            }
        };

        let response = request.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| transport_error(&e))?;
        debug!("Received {} ({} bytes)", status, bytes.len());

        if !status.is_success() {
            return Err(Error::RemoteExchangeFailed {
                status: Some(status.as_u16()),
                cause: describe_failure(status, &bytes),
            });
        }

        Ok(bytes.to_vec())
    }
}

fn transport_error(e: &reqwest::Error) -> Error {
    let cause = if e.is_timeout() {
        format!("request timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    };
    Error::RemoteExchangeFailed {
        status: e.status().map(|s| s.as_u16()),
        cause,
    }
}

fn describe_failure(status: reqwest::StatusCode, body: &[u8]) -> String {
    let reason = status.canonical_reason().unwrap_or("unexpected status");
    let body = String::from_utf8_lossy(&body[..body.len().min(MAX_ERROR_BODY)]);
    let body = body.trim();
    if body.is_empty() {
        reason.to_string()
    } else {
        format!("{}: {}", reason, body)
    }
}
