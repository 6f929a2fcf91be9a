//! Links into the authority's web UI.

use rootcause::Report;
use url::Url;

use crate::error::ConfigError;

/// Builds absolute links against the authority's public base URL.
///
/// The UI routes on the URL fragment, so page links look like
/// `https://sso.example.com/#/login`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linker {
    base: Url,
}

impl Linker {
    /// # Errors
    ///
    /// Rejects URLs that are not absolute `http`/`https` URLs with a host.
    pub fn new(base_url: &str) -> Result<Self, Report<ConfigError>> {
        let mut base = Url::parse(base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            reason: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                reason: format!("unsupported scheme {:?}", base.scheme()),
            }
            .into());
        }
        if base.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::InvalidBaseUrl {
                reason: "missing host".to_string(),
            }
            .into());
        }
        base.set_query(None);
        base.set_fragment(None);
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `scheme://host[:port]`, the WebAuthn origin.
    #[must_use]
    pub fn origin(&self) -> String {
        self.base.origin().ascii_serialization()
    }

    /// Host name, used as the cookie domain and WebAuthn relying party id.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.base.host_str().unwrap_or_default()
    }

    #[must_use]
    pub fn rp_id(&self) -> &str {
        self.domain()
    }

    #[must_use]
    pub fn login_page(&self) -> String {
        format!("{}#/login", self.base)
    }

    /// Login page that sends the browser on to a sealed redirect token.
    #[must_use]
    pub fn login_page_with_redirect(&self, token: &str) -> String {
        format!("{}#/login?redirect={token}", self.base)
    }

    #[must_use]
    pub fn enrollment_page(&self, token: &str) -> String {
        format!("{}#/enroll/{token}", self.base)
    }

    /// Endpoint that installs the session cookie on this domain.
    #[must_use]
    pub fn set_cookie(&self, token: &str) -> String {
        format!("{}set-cookie?set={token}", self.base)
    }

    #[must_use]
    pub fn logout(&self) -> String {
        format!("{}logout", self.base)
    }
}
