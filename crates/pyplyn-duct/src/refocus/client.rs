//! Authenticated Refocus API client.

use std::sync::{Arc, RwLock};

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use pyplyn_core::client::{
    AuthLatch, BoxFuture, HttpRequest, HttpResponse, HttpTransport, RemoteClient, ReqwestTransport,
};
use pyplyn_core::connector::Connector;
use pyplyn_core::error::{ClientError, ConfigError};

use super::model::Sample;

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

/// Token-authenticated client for one Refocus endpoint.
///
/// Authentication is single-flight: concurrent callers that find the client
/// unauthenticated coalesce into one `POST /v1/authenticate` exchange. A 401
/// on any call resets the token, re-authenticates, and retries the request
/// exactly once with a fresh clone; a second 401 propagates.
pub struct RefocusClient {
    connector: Connector,
    transport: Arc<dyn HttpTransport>,
    auth: AuthLatch,
    token: RwLock<Option<String>>,
}

impl std::fmt::Debug for RefocusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefocusClient")
            .field("connector", &self.connector)
            .field("auth", &self.auth)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl RefocusClient {
    pub fn new(connector: Connector) -> Result<Self, ConfigError> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::for_connector(&connector)?);
        Ok(Self::with_transport(connector, transport))
    }

    pub fn with_transport(connector: Connector, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            connector,
            transport,
            auth: AuthLatch::new(),
            token: RwLock::new(None),
        }
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.connector.endpoint.trim_end_matches('/'), path)
    }

    /// Authenticates against the endpoint; no-op when already authenticated.
    pub async fn authenticate(&self) -> Result<(), ClientError> {
        self.auth.authenticate(|| self.auth_exchange()).await
    }

    /// The underlying auth exchange. Password bytes are read fresh from the
    /// connector source and zeroed as soon as the request body is built.
    async fn auth_exchange(&self) -> Result<(), ClientError> {
        let id = &self.connector.id;

        let mut password = self
            .connector
            .read_password()
            .map_err(|error| {
                ClientError::Unauthorized(format!("cannot read credentials for '{id}': {error}"))
            })?
            .ok_or_else(|| {
                ClientError::Unauthorized(format!("no password configured for '{id}'"))
            })?;

        let body = json!({
            "username": self.connector.username,
            "password": String::from_utf8_lossy(&password),
        })
        .to_string();
        password.fill(0);

        let request = HttpRequest::post(self.url("v1/authenticate"))
            .with_header("content-type", "application/json")
            .with_body(body);

        let response = self.transport.execute(request).await.map_err(|error| {
            ClientError::Unauthorized(format!("auth exchange failed for '{id}': {error}"))
        })?;

        if !response.is_success() {
            return Err(ClientError::Unauthorized(format!(
                "auth exchange rejected for '{id}' [{}]: {}",
                response.status, response.body
            )));
        }

        let parsed: AuthResponse = serde_json::from_str(&response.body).map_err(|error| {
            ClientError::Unauthorized(format!("malformed auth response for '{id}': {error}"))
        })?;

        let mut token = self.token.write().expect("auth token lock poisoned");
        *token = Some(parsed.token);
        Ok(())
    }

    fn apply_auth(&self, request: HttpRequest) -> HttpRequest {
        let token = self.token.read().expect("auth token lock poisoned");
        match token.as_deref() {
            Some(token) => request.with_header("authorization", token),
            None => request,
        }
    }

    /// Single attempt, no retry: classifies 401 as `Unauthorized`, other
    /// HTTP >= 400 and I/O failures as `Transport`. The current auth token
    /// is applied at send time.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let method = request.method.as_str();
        let url = request.url.clone();

        match self.transport.execute(self.apply_auth(request)).await {
            Ok(response) if response.status < 400 => {
                debug!(method, %url, status = response.status, "remote call succeeded");
                Ok(response)
            }
            Ok(response) if response.status == 401 => Err(ClientError::Unauthorized(format!(
                "remote call failed {method} {url} [401]: {}",
                response.body
            ))),
            Ok(response) => Err(ClientError::Transport(format!(
                "remote call failed {method} {url} [{}]: {}",
                response.status, response.body
            ))),
            Err(error) => Err(ClientError::Transport(format!(
                "error during remote call {method} {url}: {error}"
            ))),
        }
    }

    /// Executes the request, retrying exactly once after a 401: the token is
    /// reset, authentication re-runs, and a fresh clone of the request (with
    /// the new token) is sent. A second 401 propagates.
    pub async fn execute_with_auth_retry(
        &self,
        request: HttpRequest,
    ) -> Result<HttpResponse, ClientError> {
        match self.execute(request.clone()).await {
            Err(ClientError::Unauthorized(details)) => {
                debug!(endpoint = %self.connector.id, %details, "retrying after 401");
                self.reset_auth();
                self.authenticate().await?;
                self.execute(request).await
            }
            other => other,
        }
    }

    /// All samples matching `name`. Transport failures and unparseable
    /// payloads are logged and yield the empty list; auth failures propagate.
    pub async fn get_samples(&self, name: &str) -> Result<Vec<Sample>, ClientError> {
        let request = HttpRequest::get(self.url(&format!("v1/samples?name={name}")));

        match self.execute_with_auth_retry(request).await {
            Ok(response) => Ok(serde_json::from_str(&response.body).unwrap_or_else(|error| {
                error!(endpoint = %self.connector.id, %error, "unparseable samples payload");
                Vec::new()
            })),
            Err(ClientError::Transport(details)) => {
                error!(endpoint = %self.connector.id, %details, "sample request failed");
                Ok(Vec::new())
            }
            Err(unauthorized) => Err(unauthorized),
        }
    }

    /// Bulk-upserts `samples`; `false` on transport failure, auth failures
    /// propagate.
    pub async fn upsert_samples(&self, samples: &[Sample]) -> Result<bool, ClientError> {
        let body = serde_json::to_string(samples)
            .map_err(|error| ClientError::Transport(format!("unserializable samples: {error}")))?;

        let request = HttpRequest::post(self.url("v1/samples/upsert/bulk"))
            .with_header("content-type", "application/json")
            .with_body(body);

        match self.execute_with_auth_retry(request).await {
            Ok(_) => Ok(true),
            Err(ClientError::Transport(details)) => {
                error!(endpoint = %self.connector.id, %details, "sample upsert failed");
                Ok(false)
            }
            Err(unauthorized) => Err(unauthorized),
        }
    }
}

impl crate::connectors::ClientFactory for RefocusClient {
    fn build(connector: Connector, transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_transport(connector, transport)
    }
}

impl RemoteClient for RefocusClient {
    fn endpoint_id(&self) -> &str {
        &self.connector.id
    }

    fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    fn reset_auth(&self) {
        let mut token = self.token.write().expect("auth token lock poisoned");
        *token = None;
        self.auth.reset();
    }

    fn authenticate<'a>(&'a self) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(RefocusClient::authenticate(self))
    }
}
