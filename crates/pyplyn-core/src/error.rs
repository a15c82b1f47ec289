use thiserror::Error;

/// Configuration and wiring failures.
///
/// Fatal at startup; logged and skipped during runtime reloads.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate connector id '{0}'")]
    DuplicateConnector(String),

    #[error("no connector defined for endpoint '{0}'")]
    MissingConnector(String),

    #[error("password for connector '{id}' is not valid base64: {source}")]
    InvalidPassword {
        id: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("failed to build transport for connector '{id}': {message}")]
    Transport { id: String, message: String },

    /// Invariant violation; aborts the pipeline for the current configuration.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Remote call failures surfaced by service clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The remote returned 401 or the auth exchange itself failed. Triggers
    /// the single-shot reset/re-auth/retry policy; a second occurrence
    /// propagates.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// I/O failures and non-401 HTTP errors (>= 400). Logged and converted to
    /// the caller's fallback value; never retried.
    #[error("transport failure: {0}")]
    Transport(String),
}
