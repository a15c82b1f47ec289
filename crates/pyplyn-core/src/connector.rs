//! Connector records and secure password access.
//!
//! Connector definitions live in a JSON array on disk. The in-memory records
//! never retain the password: [`read_password_bytes`] reads a fresh copy from
//! the source file on every use and zeroes intermediate buffers before
//! returning, keeping credential lifetime in memory as short as possible.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use crate::error::ConfigError;

fn default_timeout_secs() -> u64 {
    60
}

/// Named endpoint + credentials + timeout profile for one remote service.
///
/// Timeouts are in seconds. The password is deliberately absent; call
/// [`Connector::read_password`] when it is needed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub id: String,
    pub endpoint: String,
    pub username: String,
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout: u64,
    #[serde(default = "default_timeout_secs")]
    pub read_timeout: u64,
    #[serde(default = "default_timeout_secs")]
    pub write_timeout: u64,
    #[serde(default)]
    pub proxy_host: Option<String>,
    #[serde(default)]
    pub proxy_port: Option<u16>,
    #[serde(skip)]
    source: PathBuf,
}

impl Connector {
    pub fn is_proxy_enabled(&self) -> bool {
        self.proxy_host.is_some() && self.proxy_port.is_some()
    }

    pub fn proxy(&self) -> Option<(&str, u16)> {
        match (&self.proxy_host, self.proxy_port) {
            (Some(host), Some(port)) => Some((host.as_str(), port)),
            _ => None,
        }
    }

    /// File this record was loaded from; password reads go back here.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Reads a fresh copy of this connector's password bytes from its source
    /// file. Callers must zero the returned buffer after use.
    pub fn read_password(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        read_password_bytes(&self.source, &self.id)
    }
}

/// All connector records from one source file, keyed by unique id.
#[derive(Debug, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Connector>,
}

impl ConnectorRegistry {
    /// Loads the JSON array of connector records. Passwords in the file are
    /// not deserialized into the records; the raw file buffer is zeroed once
    /// parsing finishes.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut raw = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let parsed: Result<Vec<Connector>, _> = serde_json::from_slice(&raw);
        raw.fill(0);
        let parsed = parsed.map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        let mut connectors = HashMap::with_capacity(parsed.len());
        for mut connector in parsed {
            connector.source = path.to_path_buf();
            if connectors.contains_key(&connector.id) {
                return Err(ConfigError::DuplicateConnector(connector.id));
            }
            connectors.insert(connector.id.clone(), connector);
        }

        Ok(Self { connectors })
    }

    pub fn find(&self, id: &str) -> Option<&Connector> {
        self.connectors.get(id)
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

#[derive(Deserialize)]
struct PasswordRecord {
    id: String,
    #[serde(default)]
    password: Option<String>,
}

/// Reads a fresh copy of the password bytes for connector `id` from `path`.
///
/// Returns `None` when the connector is missing or declares no password.
/// The file buffer and the intermediate base64 text are zeroed before this
/// function returns; only the decoded copy handed to the caller survives,
/// and the caller must zero it after use.
pub fn read_password_bytes(path: &Path, id: &str) -> Result<Option<Vec<u8>>, ConfigError> {
    let mut raw = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let parsed: Result<Vec<PasswordRecord>, _> = serde_json::from_slice(&raw);
    raw.fill(0);
    let records = parsed.map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    for record in records {
        if record.id != id {
            continue;
        }

        let Some(encoded) = record.password else {
            return Ok(None);
        };

        let mut encoded = encoded.into_bytes();
        let decoded = BASE64.decode(&encoded);
        encoded.fill(0);

        return match decoded {
            Ok(bytes) => Ok(Some(bytes)),
            Err(source) => Err(ConfigError::InvalidPassword {
                id: id.to_string(),
                source,
            }),
        };
    }

    Ok(None)
}
