//! Adapter configuration, loaded from environment variables.

use rootcause::Report;
use serde::Deserialize;
use std::time::Duration;

use crate::client::HttpDecisionClient;
use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Base URL of the portcullis authority.
    pub server_url: String,

    /// If set, the authenticated username is sent upstream in this header.
    #[serde(default)]
    pub plaintext_username_header: Option<String>,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Prefix Envoy adds to the original path (`path_prefix` in the
    /// `http_service` block). Stripped before the path is evaluated.
    #[serde(default)]
    pub path_prefix: String,

    /// Budget for one check, across all attempts.
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,

    /// Budget for a single call to the authority.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:4001".to_string()
}

fn default_check_timeout_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    250
}

impl ProxyConfig {
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    #[must_use]
    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    /// # Errors
    ///
    /// Returns an error if the server URL is unusable.
    pub fn decision_client(&self) -> Result<HttpDecisionClient, Report<ConfigError>> {
        HttpDecisionClient::new(
            &self.server_url,
            Duration::from_millis(self.request_timeout_ms),
        )
    }
}
