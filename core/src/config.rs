//! Key/value configuration consumed by the request pipeline and endpoints.
//!
//! # Design
//! The core never loads configuration itself. It receives an explicit
//! `Configuration` object and only performs lookups. `StaticConfiguration`
//! is the in-memory implementation: a default layer plus a mode layer whose
//! entries take precedence, the way an environment-specific file overrides a
//! base file.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

/// Configuration keys read by the library.
pub mod keys {
    pub const BASE_URL: &str = "baseURL";
    pub const AUTH_USERNAME: &str = "auth.username";
    pub const AUTH_PASSWORD: &str = "auth.password";
    pub const LOG_LEVEL: &str = "logLevel";
    /// Name of the trust-anchor bundle used to validate the server.
    pub const CA_SERVER: &str = "caServer";
    /// Name of the client keystore presented for client-certificate challenges.
    pub const CLIENT_KEY_STORE: &str = "clientKeyStore";
    pub const CLIENT_KEY_STORE_PASSWORD: &str = "clientKeyStorePassword";
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration key `{0}`")]
    Missing(String),

    #[error("invalid configuration document: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("configuration document must be a JSON object")]
    NotAnObject,
}

/// Read-only key/value lookup.
pub trait Configuration: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticConfiguration {
    defaults: HashMap<String, String>,
    mode: HashMap<String, String>,
}

impl StaticConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            defaults: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            mode: HashMap::new(),
        }
    }

    /// Parse the default layer from a JSON object. Non-string scalars are
    /// stored in their JSON text form; nulls are skipped.
    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            defaults: parse_layer(document)?,
            mode: HashMap::new(),
        })
    }

    /// Replace the mode layer with the entries of a JSON object.
    pub fn with_mode_json(mut self, document: &str) -> Result<Self, ConfigError> {
        self.mode = parse_layer(document)?;
        Ok(self)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    pub fn with_mode(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.mode.insert(key.into(), value.into());
        self
    }
}

impl Configuration for StaticConfiguration {
    fn get(&self, key: &str) -> Option<String> {
        self.mode
            .get(key)
            .or_else(|| self.defaults.get(key))
            .cloned()
    }
}

fn parse_layer(document: &str) -> Result<HashMap<String, String>, ConfigError> {
    let Value::Object(entries) = serde_json::from_str::<Value>(document)? else {
        return Err(ConfigError::NotAnObject);
    };
    Ok(entries
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key, text)),
            other => Some((key, other.to_string())),
        })
        .collect())
}
