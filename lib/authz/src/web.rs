//! Decisions for browser visits arriving through the reverse proxy.

use portcullis_core::{AuthorizeHttpReply, AuthorizeHttpRequest, DenyDestination, Header};
use portcullis_session::{Extracted, Session, TaintSet, UntoleratedTaints};
use portcullis_store::Database;
use portcullis_token::{RedirectToken, TokenKey};
use std::fmt;
use tracing::{info, instrument, warn};
use url::Url;

use crate::engine::{Authorizer, CallCredentials};
use crate::error::WebError;
use crate::links::Linker;

/// Body of the canned response for denied non-navigational requests.
pub const NOT_LOGGED_IN_BODY: &str = "You are not logged in.";

/// Why a resolved session may not visit a protected site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebVisitDenied {
    /// The session is a prototype or anonymous.
    Taints(UntoleratedTaints),
    /// The session does not belong to a stored user.
    NotLoggedIn,
}

impl fmt::Display for WebVisitDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Taints(taints) => write!(f, "{taints}"),
            Self::NotLoggedIn => f.write_str("you must be logged in to visit this site"),
        }
    }
}

impl std::error::Error for WebVisitDenied {}

/// Only fully logged-in sessions may visit: no taints at all, and either a
/// stored user or root.
///
/// # Errors
///
/// Returns the reason the session is turned away.
pub fn allow_web_visit(session: &Session) -> Result<(), WebVisitDenied> {
    session
        .taints()
        .check(&TaintSet::new())
        .map_err(WebVisitDenied::Taints)?;
    if session.user().id().is_assigned() || session.user().is_root() {
        Ok(())
    } else {
        Err(WebVisitDenied::NotLoggedIn)
    }
}

fn is_navigation(method: &str) -> bool {
    method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("HEAD")
}

/// Headers to pass to the upstream application on allow.
fn forwarded_headers(extracted: &Extracted) -> Vec<Header> {
    let authorization = extracted
        .unused_headers
        .iter()
        .filter(|h| h.is_forwardable())
        .map(|h| Header::new("authorization", h.value.clone()));
    let cookies = extracted
        .passthrough_cookies()
        .map(|c| Header::new("cookie", c.pair()));
    authorization.chain(cookies).collect()
}

impl<D: Database> Authorizer<D> {
    /// Judges one proxied request.
    ///
    /// Denied navigations are redirected to the login page with a sealed
    /// token naming the original URL. Other denied requests get a plain 403
    /// body, since a redirect would be useless to them.
    ///
    /// # Errors
    ///
    /// Fails only when `request_uri` is not an absolute URL. Authentication
    /// and policy failures produce a deny reply instead.
    #[instrument(skip_all, fields(request_id = %req.request_id, method = %req.method))]
    pub async fn authorize_http(
        &self,
        req: &AuthorizeHttpRequest,
        links: &Linker,
        key: &TokenKey,
    ) -> Result<AuthorizeHttpReply, WebError> {
        let uri = Url::parse(&req.request_uri).map_err(|e| WebError::InvalidRequestUri {
            reason: e.to_string(),
        })?;

        let login_url = match RedirectToken::new(uri.as_str()).seal(key) {
            Ok(token) => links.login_page_with_redirect(&token),
            Err(err) => {
                warn!(error = %err, "sealing redirect token failed, using bare login page");
                links.login_page()
            }
        };
        let destination = if is_navigation(&req.method) {
            DenyDestination::Redirect {
                redirect_url: login_url,
            }
        } else {
            DenyDestination::Response {
                content_type: "text/plain".to_string(),
                body: NOT_LOGGED_IN_BODY.to_string(),
            }
        };

        let root = self.is_root(&req.authorization_headers);
        let credentials = CallCredentials {
            authorization: req
                .authorization_headers
                .iter()
                .filter(|value| !(root && self.is_root(std::slice::from_ref(*value))))
                .cloned()
                .collect(),
            cookies: req.cookies.clone(),
        };
        let extracted = self.extract(&credentials);

        let session = if root {
            Session::root()
        } else {
            match self.authenticate(&extracted).await {
                Ok(session) => session,
                Err(err) => {
                    info!(uri = %uri, "denying unauthenticated visit");
                    return Ok(AuthorizeHttpReply::deny(err.to_string(), destination));
                }
            }
        };

        if let Err(err) = allow_web_visit(&session) {
            info!(uri = %uri, user = %session.user().username(), reason = %err, "denying visit");
            return Ok(AuthorizeHttpReply::deny(err.to_string(), destination));
        }

        info!(uri = %uri, user = %session.user().username(), "allowing visit");
        Ok(AuthorizeHttpReply::allow(
            session.user().username(),
            forwarded_headers(&extracted),
        ))
    }
}
