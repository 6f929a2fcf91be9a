//! Credential extraction from raw header material.
//!
//! Every source is scanned. Nothing short-circuits on the first match: a
//! request may carry a proxied session next to credentials that belong to
//! the upstream application, and the reverse proxy needs to see all of it
//! to decide what to forward.

use cookie::Cookie;
use std::fmt;

use crate::error::SessionError;
use crate::session::SessionId;

/// The `Authorization` scheme carrying a session id.
pub const SESSION_SCHEME: &str = "SessionID";

/// Why an `Authorization` value did not yield a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderProblem {
    /// The value was not of the form `<type> <token>`.
    Malformed,
    /// The value used a scheme other than `SessionID`.
    UnknownScheme { scheme: String },
    /// A `SessionID` value whose token did not decode.
    InvalidSessionId { reason: SessionError },
}

impl fmt::Display for HeaderProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => {
                write!(f, "authorization value did not contain a type and a token")
            }
            Self::UnknownScheme { scheme } => {
                write!(f, "unknown authorization type {scheme:?}")
            }
            Self::InvalidSessionId { reason } => {
                write!(f, "{SESSION_SCHEME} credential: {reason}")
            }
        }
    }
}

impl std::error::Error for HeaderProblem {}

/// An `Authorization` value that did not produce a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusedHeader {
    pub value: String,
    pub reason: Option<HeaderProblem>,
}

impl UnusedHeader {
    /// Whether this value belongs to someone other than us and may be passed
    /// to the upstream application.
    #[must_use]
    pub fn is_forwardable(&self) -> bool {
        !matches!(self.reason, Some(HeaderProblem::InvalidSessionId { .. }))
    }
}

/// A cookie that did not produce a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusedCookie {
    pub name: String,
    pub value: String,
    /// Set only for a cookie with the session name but an undecodable value.
    pub reason: Option<SessionError>,
}

impl UnusedCookie {
    /// `name=value` form, as it appears in a `Cookie` header.
    #[must_use]
    pub fn pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// Everything found in a request's credential material.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    /// Candidate ids, header-derived first, then cookie-derived. These are
    /// parsed but not yet checked against storage.
    pub sessions: Vec<SessionId>,
    pub unused_headers: Vec<UnusedHeader>,
    pub unused_cookies: Vec<UnusedCookie>,
}

impl Extracted {
    /// False iff there was nothing for authentication to look at: no
    /// candidates and no problem with any header or session cookie.
    #[must_use]
    pub fn offers_credentials(&self) -> bool {
        !self.sessions.is_empty()
            || self.unused_headers.iter().any(|h| h.reason.is_some())
            || self.unused_cookies.iter().any(|c| c.reason.is_some())
    }

    /// Unused cookies that carry no error.
    pub fn passthrough_cookies(&self) -> impl Iterator<Item = &UnusedCookie> {
        self.unused_cookies.iter().filter(|c| c.reason.is_none())
    }
}

/// Parses a single `Authorization` value as a session credential.
///
/// # Errors
///
/// Returns the reason the value is not a usable session credential.
pub fn parse_authorization(value: &str) -> Result<SessionId, HeaderProblem> {
    let (scheme, token) = value.split_once(' ').ok_or(HeaderProblem::Malformed)?;
    if scheme != SESSION_SCHEME {
        return Err(HeaderProblem::UnknownScheme {
            scheme: scheme.to_string(),
        });
    }
    SessionId::from_base64(token)
        .map_err(|reason| HeaderProblem::InvalidSessionId { reason })
}

/// Partitions raw `Authorization` values and `Cookie` header values.
///
/// Each `Cookie` value may hold several `name=value` pairs. Fragments that do
/// not parse as cookies are dropped.
pub fn extract<'a>(
    cookie_name: &str,
    authorization: impl IntoIterator<Item = &'a str>,
    cookie_headers: impl IntoIterator<Item = &'a str>,
) -> Extracted {
    let mut extracted = Extracted::default();

    for value in authorization {
        match parse_authorization(value) {
            Ok(id) => extracted.sessions.push(id),
            Err(reason) => extracted.unused_headers.push(UnusedHeader {
                value: value.to_string(),
                reason: Some(reason),
            }),
        }
    }

    for header in cookie_headers {
        for cookie in Cookie::split_parse(header).filter_map(Result::ok) {
            let (name, value) = cookie.name_value();
            if name != cookie_name {
                extracted.unused_cookies.push(UnusedCookie {
                    name: name.to_string(),
                    value: value.to_string(),
                    reason: None,
                });
                continue;
            }
            match SessionId::from_base64(value) {
                Ok(id) => extracted.sessions.push(id),
                Err(reason) => extracted.unused_cookies.push(UnusedCookie {
                    name: name.to_string(),
                    value: value.to_string(),
                    reason: Some(reason),
                }),
            }
        }
    }

    extracted
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOKIE: &str = "portcullis-session";

    fn id(fill: u8) -> SessionId {
        SessionId::from_bytes(vec![fill; 64])
    }

    #[test]
    fn nothing_presented_offers_nothing() {
        let extracted = extract(COOKIE, [], []);
        assert!(!extracted.offers_credentials());
        assert_eq!(extracted, Extracted::default());
    }

    #[test]
    fn session_header_yields_candidate() {
        let header = id(1).to_header();
        let extracted = extract(COOKIE, [header.as_str()], []);
        assert_eq!(extracted.sessions, vec![id(1)]);
        assert!(extracted.unused_headers.is_empty());
    }

    #[test]
    fn garbled_header_is_malformed() {
        let extracted = extract(COOKIE, ["foobar"], []);
        assert!(extracted.sessions.is_empty());
        assert!(extracted.offers_credentials());
        assert_eq!(
            extracted.unused_headers,
            vec![UnusedHeader {
                value: "foobar".into(),
                reason: Some(HeaderProblem::Malformed),
            }]
        );
    }

    #[test]
    fn other_schemes_are_unknown_and_forwardable() {
        let extracted = extract(COOKIE, ["Token foobar", "Bearer barbaz"], []);
        assert_eq!(extracted.unused_headers.len(), 2);
        assert_eq!(
            extracted.unused_headers[1].reason,
            Some(HeaderProblem::UnknownScheme {
                scheme: "Bearer".into()
            })
        );
        assert!(extracted.unused_headers.iter().all(UnusedHeader::is_forwardable));
    }

    #[test]
    fn undecodable_session_header_is_not_forwardable() {
        let extracted = extract(COOKIE, ["SessionID !!!"], []);
        let header = &extracted.unused_headers[0];
        assert!(matches!(
            header.reason,
            Some(HeaderProblem::InvalidSessionId { .. })
        ));
        assert!(!header.is_forwardable());
    }

    #[test]
    fn values_split_on_the_first_space_untrimmed() {
        let header = format!(" {}", id(5).to_header());
        assert_eq!(
            parse_authorization(&header),
            Err(HeaderProblem::UnknownScheme { scheme: String::new() })
        );
        let header = format!("{} ", id(5).to_header());
        assert!(matches!(
            parse_authorization(&header),
            Err(HeaderProblem::InvalidSessionId { .. })
        ));
    }

    #[test]
    fn problems_never_echo_the_credential() {
        let extracted = extract(COOKIE, ["root hunter2"], []);
        let reason = extracted.unused_headers[0]
            .reason
            .as_ref()
            .expect("reason")
            .to_string();
        assert!(reason.contains("root"));
        assert!(!reason.contains("hunter2"));
    }

    #[test]
    fn cookies_are_split_and_matched_by_name() {
        let header = format!("foo=bar; {COOKIE}={}; baz=qux", id(2).to_base64());
        let extracted = extract(COOKIE, [], [header.as_str()]);
        assert_eq!(extracted.sessions, vec![id(2)]);
        let passthrough: Vec<String> = extracted.passthrough_cookies().map(UnusedCookie::pair).collect();
        assert_eq!(passthrough, vec!["foo=bar".to_string(), "baz=qux".to_string()]);
        assert!(extracted.offers_credentials());
    }

    #[test]
    fn unrelated_cookies_alone_offer_nothing() {
        let extracted = extract(COOKIE, [], ["foo=bar"]);
        assert!(!extracted.offers_credentials());
        assert_eq!(extracted.unused_cookies.len(), 1);
    }

    #[test]
    fn bad_session_cookie_carries_reason() {
        let header = format!("{COOKIE}=not-a-session");
        let extracted = extract(COOKIE, [], [header.as_str()]);
        assert!(extracted.sessions.is_empty());
        assert!(extracted.unused_cookies[0].reason.is_some());
        assert!(extracted.offers_credentials());
        assert_eq!(extracted.passthrough_cookies().count(), 0);
    }

    #[test]
    fn header_candidates_come_before_cookie_candidates() {
        let cookie = format!("{COOKIE}={}", id(3).to_base64());
        let header = id(4).to_header();
        let extracted = extract(COOKIE, [header.as_str()], [cookie.as_str()]);
        assert_eq!(extracted.sessions, vec![id(4), id(3)]);
    }
}
