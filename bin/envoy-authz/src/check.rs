//! The proxy-facing request and response shapes.

use cookie::Cookie;
use portcullis_core::{AuthorizeHttpRequest, Header};
use std::collections::BTreeMap;

/// What the proxy tells us about one inbound HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckRequest {
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    /// Lower-cased names, repeated values already folded.
    pub headers: BTreeMap<String, String>,
    pub source_ip: String,
}

impl CheckRequest {
    #[must_use]
    pub fn header(&self, name: &str) -> &str {
        self.headers.get(name).map_or("", String::as_str)
    }

    /// The original request's URL. Envoy always sets `x-forwarded-proto`,
    /// but an absent scheme falls back to `http`.
    #[must_use]
    pub fn request_uri(&self) -> String {
        let scheme = if self.scheme.is_empty() {
            "http"
        } else {
            &self.scheme
        };
        format!("{scheme}://{}{}", self.host, self.path)
    }

    /// Builds the query for `Session.AuthorizeHTTP`.
    #[must_use]
    pub fn to_authorize_request(&self) -> AuthorizeHttpRequest {
        AuthorizeHttpRequest {
            method: self.method.clone(),
            request_uri: self.request_uri(),
            authorization_headers: self
                .header("authorization")
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect(),
            cookies: Cookie::split_parse(self.header("cookie"))
                .filter_map(Result::ok)
                .map(|c| {
                    let (name, value) = c.name_value();
                    format!("{name}={value}")
                })
                .collect(),
            request_id: self.header("x-request-id").to_string(),
            source_ip: self.source_ip.clone(),
        }
    }
}

/// Joins repeated header values the way they go on the wire: `cookie`
/// pairs with `"; "`, everything else with `","`. Names are lower-cased.
pub fn fold_headers<'a>(
    headers: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> BTreeMap<String, String> {
    let mut grouped: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for (name, value) in headers {
        grouped.entry(name.to_ascii_lowercase()).or_default().push(value);
    }
    grouped
        .into_iter()
        .map(|(name, values)| {
            let separator = if name == "cookie" { "; " } else { "," };
            let joined = values.join(separator);
            (name, joined)
        })
        .collect()
}

/// What the proxy should do with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResponse {
    /// Forward upstream after applying the header mutations.
    Ok {
        headers: Vec<Header>,
        headers_to_remove: Vec<String>,
    },
    /// Answer the client directly.
    Denied {
        status: u16,
        headers: Vec<Header>,
        body: String,
    },
}

impl CheckResponse {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Ok { .. } => 200,
            Self::Denied { status, .. } => *status,
        }
    }

    pub(crate) fn plain(status: u16, body: impl Into<String>) -> Self {
        Self::Denied {
            status,
            headers: vec![Header::new("content-type", "text/plain")],
            body: body.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)]) -> CheckRequest {
        CheckRequest {
            method: "GET".to_string(),
            scheme: "https".to_string(),
            host: "grafana.example.com".to_string(),
            path: "/d/abc?orgId=1".to_string(),
            headers: fold_headers(headers.iter().copied()),
            source_ip: "203.0.113.9".to_string(),
        }
    }

    #[test]
    fn folding_joins_cookies_with_semicolons() {
        let folded = fold_headers([
            ("Cookie", "a=1"),
            ("cookie", "b=2"),
            ("X-Thing", "one"),
            ("x-thing", "two"),
        ]);
        assert_eq!(folded["cookie"], "a=1; b=2");
        assert_eq!(folded["x-thing"], "one,two");
    }

    #[test]
    fn authorization_is_split_on_commas() {
        let req = request(&[("authorization", "SessionID abc, Bearer xyz,")]).to_authorize_request();
        assert_eq!(req.authorization_headers, vec!["SessionID abc", "Bearer xyz"]);
    }

    #[test]
    fn cookies_become_discrete_pairs() {
        let req = request(&[("cookie", "portcullis-session=abc; theme=dark")]).to_authorize_request();
        assert_eq!(req.cookies, vec!["portcullis-session=abc", "theme=dark"]);
    }

    #[test]
    fn query_carries_request_details() {
        let req = request(&[("x-request-id", "req-1")]).to_authorize_request();
        assert_eq!(req.method, "GET");
        assert_eq!(req.request_uri, "https://grafana.example.com/d/abc?orgId=1");
        assert_eq!(req.request_id, "req-1");
        assert_eq!(req.source_ip, "203.0.113.9");
        assert!(req.authorization_headers.is_empty());
        assert!(req.cookies.is_empty());
    }

    #[test]
    fn missing_scheme_defaults_to_http() {
        let mut req = request(&[]);
        req.scheme.clear();
        assert_eq!(req.request_uri(), "http://grafana.example.com/d/abc?orgId=1");
    }
}
