//! Authenticated remote transport plumbing shared by concrete service
//! clients.
//!
//! The request/response envelopes keep adapters independent of the underlying
//! HTTP implementation: production clients run over [`ReqwestTransport`],
//! tests substitute scripted transports behind [`HttpTransport`].

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::connector::Connector;
use crate::error::{ClientError, ConfigError};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Minimal HTTP method set needed by service clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// HTTP request envelope used by client transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport-level HTTP error (connection, timeout, protocol).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Transport contract that supports async execution of envelope requests.
pub trait HttpTransport: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>>;
}

/// Default no-op transport for deterministic offline tests.
#[derive(Debug, Default)]
pub struct NoopTransport;

impl HttpTransport for NoopTransport {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        let _ = request;
        Box::pin(async move { Ok(HttpResponse::ok_json("{}")) })
    }
}

/// Production transport using reqwest, configured from a [`Connector`]:
/// connect/read timeouts and the optional HTTP proxy.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn for_connector(connector: &Connector) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("pyplyn/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(connector.connect_timeout))
            .timeout(Duration::from_secs(connector.read_timeout));

        if let Some((host, port)) = connector.proxy() {
            let proxy = reqwest::Proxy::all(format!("http://{host}:{port}")).map_err(|error| {
                ConfigError::Transport {
                    id: connector.id.clone(),
                    message: error.to_string(),
                }
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|error| ConfigError::Transport {
            id: connector.id.clone(),
            message: error.to_string(),
        })?;

        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        Box::pin(async move {
            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
                HttpMethod::Post => self.client.post(&request.url),
            };

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }

            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(|error| {
                if error.is_timeout() {
                    HttpError::new(format!("request timeout: {error}"))
                } else if error.is_connect() {
                    HttpError::new(format!("connection failed: {error}"))
                } else {
                    HttpError::new(format!("request failed: {error}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|error| HttpError::new(format!("failed to read response body: {error}")))?;

            Ok(HttpResponse { status, body })
        })
    }
}

/// Single-flight authentication latch.
///
/// Serializes the `is_authenticated || auth()` sequence behind one lock so
/// that N concurrent callers finding the client unauthenticated coalesce to
/// exactly one underlying exchange, all observing the same outcome. The
/// authenticated check is re-evaluated inside the lock; an external
/// check-then-auth pattern would race.
#[derive(Debug, Default)]
pub struct AuthLatch {
    lock: Mutex<()>,
    authenticated: AtomicBool,
}

impl AuthLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    /// Clears the authenticated flag, forcing the next [`authenticate`]
    /// caller to run a fresh exchange.
    ///
    /// [`authenticate`]: AuthLatch::authenticate
    pub fn reset(&self) {
        self.authenticated.store(false, Ordering::Release);
    }

    /// Runs `auth` at most once across concurrent callers while the latch is
    /// unauthenticated. The flag is only set after `auth` succeeds.
    pub async fn authenticate<F, Fut>(&self, auth: F) -> Result<(), ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), ClientError>>,
    {
        let _guard = self.lock.lock().await;
        if self.authenticated.load(Ordering::Acquire) {
            return Ok(());
        }

        auth().await?;
        self.authenticated.store(true, Ordering::Release);
        Ok(())
    }
}

/// Remote client contract implemented by concrete service bindings.
pub trait RemoteClient: Send + Sync {
    /// Connector id of the endpoint this client talks to.
    fn endpoint_id(&self) -> &str;

    fn is_authenticated(&self) -> bool;

    /// Clears authentication artifacts so the next authenticate call runs a
    /// fresh exchange.
    fn reset_auth(&self);

    /// Authenticates against the endpoint; single-flight across concurrent
    /// callers.
    fn authenticate<'a>(&'a self) -> BoxFuture<'a, Result<(), ClientError>>;
}
