//! Server configuration.
//!
//! Loaded via the `config` crate from environment variables. Nested fields
//! use a double underscore, e.g. `COOKIE__NAME`.

use portcullis_authz::{AuthorizerConfig, ConfigError, Linker};
use portcullis_store::RetryPolicy;
use portcullis_token::{TokenError, TokenKey};
use rootcause::Report;
use secrecy::SecretString;
use serde::Deserialize;

/// Top-level configuration for the authority.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Apply the bundled migrations on startup.
    #[serde(default)]
    pub run_migrations: bool,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Bootstrap password accepted as `Authorization: root <password>`.
    /// Unset or empty disables root access.
    #[serde(default)]
    pub root_password: Option<SecretString>,

    /// Standard base64 encoding of the 32-byte token key.
    pub token_key: SecretString,

    /// Public URL of the authority's web UI.
    pub base_url: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub cookie: CookieConfig,
}

/// How the session cookie is issued.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    #[serde(default = "default_cookie_name")]
    pub name: String,

    /// Domain attribute. Set it to the parent domain to share the session
    /// with every protected site.
    #[serde(default)]
    pub domain: Option<String>,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    #[serde(default = "default_secure_cookies")]
    pub secure: bool,
}

fn default_max_connections() -> u32 {
    5
}

fn default_listen_addr() -> String {
    "0.0.0.0:4000".to_string()
}

fn default_cookie_name() -> String {
    "portcullis-session".to_string()
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: default_cookie_name(),
            domain: None,
            secure: default_secure_cookies(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
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

    /// # Errors
    ///
    /// Returns an error unless the key decodes to 32 non-zero bytes.
    pub fn token_key(&self) -> Result<TokenKey, Report<TokenError>> {
        use secrecy::ExposeSecret;
        TokenKey::from_base64(self.token_key.expose_secret())
    }

    /// # Errors
    ///
    /// Returns an error if the base URL cannot be used to build links.
    pub fn linker(&self) -> Result<Linker, Report<ConfigError>> {
        Linker::new(&self.base_url)
    }

    #[must_use]
    pub fn authorizer_config(&self) -> AuthorizerConfig {
        AuthorizerConfig {
            root_password: self.root_password.clone(),
            cookie_name: self.cookie.name.clone(),
            retry: RetryPolicy::default(),
        }
    }
}
