//! JSON wire types for the RPC surface.
//!
//! The authority serves these over `POST /rpc/<Service>/<Method>` and the
//! reverse-proxy adapter consumes them, so both sides share one definition.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A description of a proxied HTTP request to be authorized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeHttpRequest {
    /// HTTP method of the original request.
    pub method: String,
    /// Absolute URL the client asked for.
    pub request_uri: String,
    /// Individual `Authorization` values, already split on commas.
    #[serde(default)]
    pub authorization_headers: Vec<String>,
    /// Individual cookies in `name=value` form.
    #[serde(default)]
    pub cookies: Vec<String>,
    /// Proxy-assigned request id, for log correlation.
    #[serde(default)]
    pub request_id: String,
    /// Address of the downstream client.
    #[serde(default)]
    pub source_ip: String,
}

/// A single header to add to the upstream request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl Header {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Where a denied request should be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenyDestination {
    /// Send the browser to the login page.
    Redirect { redirect_url: String },
    /// Answer the request directly.
    Response { content_type: String, body: String },
}

/// The authorization outcome for one proxied request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    Allow {
        username: String,
        #[serde(default)]
        add_headers: Vec<Header>,
    },
    Deny {
        reason: String,
        destination: DenyDestination,
    },
}

/// Reply to `Session.AuthorizeHTTP`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeHttpReply {
    pub decision: Decision,
}

impl AuthorizeHttpReply {
    #[must_use]
    pub fn allow(username: impl Into<String>, add_headers: Vec<Header>) -> Self {
        Self {
            decision: Decision::Allow {
                username: username.into(),
                add_headers,
            },
        }
    }

    #[must_use]
    pub fn deny(reason: impl Into<String>, destination: DenyDestination) -> Self {
        Self {
            decision: Decision::Deny {
                reason: reason.into(),
                destination,
            },
        }
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self.decision, Decision::Allow { .. })
    }
}

/// Status codes carried by RPC errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    FailedPrecondition,
    Unavailable,
    Internal,
}

impl Code {
    /// HTTP status used when this code is returned over the JSON transport.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidArgument => 400,
            Self::Unauthenticated => 401,
            Self::PermissionDenied => 403,
            Self::NotFound => 404,
            Self::FailedPrecondition => 412,
            Self::Unavailable => 503,
            Self::Internal => 500,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::FailedPrecondition => "failed_precondition",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body returned by every RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStatus {
    pub code: Code,
    pub message: String,
}

impl RpcStatus {
    #[must_use]
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcStatus {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_is_tagged_on_the_wire() {
        let reply = AuthorizeHttpReply::deny(
            "not logged in",
            DenyDestination::Redirect {
                redirect_url: "https://sso.example.com/#/login".into(),
            },
        );
        let json = serde_json::to_value(&reply).expect("serialize");
        assert_eq!(json["decision"]["outcome"], "deny");
        assert_eq!(json["decision"]["destination"]["kind"], "redirect");
    }

    #[test]
    fn allow_defaults_missing_headers() {
        let reply: AuthorizeHttpReply =
            serde_json::from_str(r#"{"decision":{"outcome":"allow","username":"alice"}}"#)
                .expect("deserialize");
        assert_eq!(reply, AuthorizeHttpReply::allow("alice", vec![]));
        assert!(reply.is_allowed());
    }

    #[test]
    fn codes_map_to_http_statuses() {
        assert_eq!(Code::Unauthenticated.http_status(), 401);
        assert_eq!(Code::PermissionDenied.http_status(), 403);
        assert_eq!(Code::Unavailable.http_status(), 503);
    }

    #[test]
    fn status_display_includes_code() {
        let status = RpcStatus::new(Code::NotFound, "no such user");
        assert_eq!(status.to_string(), "not_found: no such user");
    }
}
