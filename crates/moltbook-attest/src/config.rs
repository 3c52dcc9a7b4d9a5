//! Collector configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AttestError;

fn default_enclave_attestation_url() -> String {
    "https://localhost:29343".to_string()
}

const fn default_service_attestation_port() -> u16 {
    29343
}

fn default_quote_path() -> String {
    "/cpu.html".to_string()
}

const fn default_timeout_secs() -> u64 {
    10
}

/// Configuration for the two measurement collectors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Base URL of the confidential VM's local attestation server.
    #[serde(default = "default_enclave_attestation_url")]
    pub enclave_attestation_url: String,
    /// Endpoint of the remote inference service whose channel is attested.
    pub service_endpoint: String,
    /// Port on which the inference service exposes its attestation quote.
    #[serde(default = "default_service_attestation_port")]
    pub service_attestation_port: u16,
    /// Path of the quote page on either attestation server.
    #[serde(default = "default_quote_path")]
    pub quote_path: String,
    /// API key forwarded to the service attestation endpoint, if required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_api_key: Option<String>,
    /// Model identifier recorded alongside the service attestation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_model: Option<String>,
    /// Bound on every collector network call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl CollectorConfig {
    /// Create a configuration for the given inference endpoint with defaults
    /// for everything else.
    #[must_use]
    pub fn new(service_endpoint: impl Into<String>) -> Self {
        Self {
            enclave_attestation_url: default_enclave_attestation_url(),
            service_endpoint: service_endpoint.into(),
            service_attestation_port: default_service_attestation_port(),
            quote_path: default_quote_path(),
            service_api_key: None,
            service_model: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AttestError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AttestError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, AttestError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AttestError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is unusable.
    pub fn validate(&self) -> Result<(), AttestError> {
        if self.enclave_attestation_url.is_empty() {
            return Err(AttestError::Config(
                "enclave attestation URL cannot be empty".to_string(),
            ));
        }
        if self.service_endpoint.is_empty() {
            return Err(AttestError::Config(
                "service endpoint cannot be empty".to_string(),
            ));
        }
        if !self.quote_path.starts_with('/') {
            return Err(AttestError::Config(
                "quote path must start with '/'".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(AttestError::Config(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The per-call timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
