//! Envoy's HTTP-mode `ext_authz` contract.
//!
//! Envoy replays each inbound request's method, path and allowed headers to
//! this service. A `200` lets the request through: headers on our response
//! are added upstream, and `x-envoy-auth-headers-to-remove` names the ones to
//! strip. Any other status is sent to the client as-is.

use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::adapter::{DecisionClient, ProxyAuthorizer};
use crate::check::{CheckRequest, CheckResponse, fold_headers};

pub const HEADERS_TO_REMOVE: &str = "x-envoy-auth-headers-to-remove";
pub const EXTERNAL_ADDRESS: &str = "x-envoy-external-address";

pub struct ProxyState<C> {
    pub authorizer: ProxyAuthorizer<C>,
    pub path_prefix: String,
    pub check_timeout: Duration,
    /// Cancelled on shutdown; every check runs under a child token.
    pub shutdown: CancellationToken,
}

pub fn router<C: DecisionClient + 'static>(state: Arc<ProxyState<C>>) -> Router {
    Router::new()
        .fallback(check::<C>)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn check<C: DecisionClient + 'static>(
    State(state): State<Arc<ProxyState<C>>>,
    request: Request,
) -> Response {
    let check = check_request(&request, &state.path_prefix);
    let cancel = state.shutdown.child_token();
    let deadline = Instant::now() + state.check_timeout;
    match state.authorizer.check(&check, &cancel, Some(deadline)).await {
        Ok(response) => render(response),
        Err(failure) => {
            warn!(error = %failure, host = %check.host, path = %check.path, "authorization check failed");
            render(failure.response)
        }
    }
}

/// Describes the replayed request. The client address comes from Envoy's
/// `x-envoy-external-address` when present, otherwise from the peer.
pub fn check_request(request: &Request, path_prefix: &str) -> CheckRequest {
    let headers = fold_headers(
        request
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
    );

    let full_path = request
        .uri()
        .path_and_query()
        .map_or("/", |p| p.as_str());
    let path = match full_path.strip_prefix(path_prefix) {
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        Some(rest) if rest.is_empty() || rest.starts_with('?') => format!("/{rest}"),
        _ => full_path.to_string(),
    };

    let host = headers
        .get("host")
        .cloned()
        .or_else(|| request.uri().authority().map(ToString::to_string))
        .unwrap_or_default();
    let source_ip = headers
        .get(EXTERNAL_ADDRESS)
        .cloned()
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_default();

    CheckRequest {
        method: request.method().as_str().to_string(),
        scheme: headers.get("x-forwarded-proto").cloned().unwrap_or_default(),
        host,
        path,
        headers,
        source_ip,
    }
}

fn render(response: CheckResponse) -> Response {
    let (status, headers, remove, body) = match response {
        CheckResponse::Ok {
            headers,
            headers_to_remove,
        } => (StatusCode::OK, headers, headers_to_remove, String::new()),
        CheckResponse::Denied {
            status,
            headers,
            body,
        } => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers,
            Vec::new(),
            body,
        ),
    };

    let mut out = (status, Body::from(body)).into_response();
    let map = out.headers_mut();
    for h in headers {
        match (
            HeaderName::from_bytes(h.key.as_bytes()),
            HeaderValue::from_str(&h.value),
        ) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => warn!(header = %h.key, "dropping header that cannot be sent"),
        }
    }
    if !remove.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&remove.join(",")) {
            map.insert(HeaderName::from_static(HEADERS_TO_REMOVE), value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use crate::adapter::tests::{FakeClient, unavailable};
    use portcullis_core::{AuthorizeHttpReply, DenyDestination, Header};
    use tower::ServiceExt;

    fn app(client: FakeClient) -> (Router, Arc<ProxyState<FakeClient>>) {
        let state = Arc::new(ProxyState {
            authorizer: ProxyAuthorizer::new(client, Some("x-portcullis-user".to_string())),
            path_prefix: "/authz".to_string(),
            check_timeout: Duration::from_secs(5),
            shutdown: CancellationToken::new(),
        });
        (router(Arc::clone(&state)), state)
    }

    fn replay() -> Request {
        Request::builder()
            .method("GET")
            .uri("/authz/d/abc?orgId=1")
            .header("host", "grafana.example.com")
            .header("x-forwarded-proto", "https")
            .header("x-request-id", "req-1")
            .header(EXTERNAL_ADDRESS, "203.0.113.9")
            .header("cookie", "portcullis-session=abc")
            .header("cookie", "theme=dark")
            .body(Body::empty())
            .expect("request")
    }

    #[test]
    fn describes_the_replayed_request() {
        let check = check_request(&replay(), "/authz");
        assert_eq!(check.method, "GET");
        assert_eq!(check.path, "/d/abc?orgId=1");
        assert_eq!(check.request_uri(), "https://grafana.example.com/d/abc?orgId=1");
        assert_eq!(check.source_ip, "203.0.113.9");
        assert_eq!(check.header("cookie"), "portcullis-session=abc; theme=dark");
    }

    #[test]
    fn bare_prefix_is_the_root_path() {
        let request = Request::builder()
            .uri("/authz")
            .body(Body::empty())
            .expect("request");
        assert_eq!(check_request(&request, "/authz").path, "/");
    }

    #[test]
    fn peer_address_is_the_fallback_source() {
        let mut request = Request::builder()
            .uri("/")
            .body(Body::empty())
            .expect("request");
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 55555))));
        assert_eq!(check_request(&request, "").source_ip, "192.0.2.1");
    }

    #[tokio::test]
    async fn allowed_requests_carry_header_mutations() {
        let (app, state) = app(FakeClient::replying(vec![Ok(AuthorizeHttpReply::allow(
            "alice",
            vec![Header::new("cookie", "theme=dark")],
        ))]));

        let response = app.oneshot(replay()).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["cookie"], "theme=dark");
        assert_eq!(headers["x-portcullis-user"], "alice");
        assert_eq!(headers[HEADERS_TO_REMOVE], "authorization");
        assert!(headers.get(header::CONTENT_TYPE).is_none());

        let seen = state.authorizer_seen();
        assert_eq!(seen.request_uri, "https://grafana.example.com/d/abc?orgId=1");
        assert_eq!(seen.cookies, vec!["portcullis-session=abc", "theme=dark"]);
        assert_eq!(seen.source_ip, "203.0.113.9");
        assert_eq!(seen.request_id, "req-1");
    }

    #[tokio::test]
    async fn denials_are_sent_to_the_client() {
        let (app, _) = app(FakeClient::replying(vec![Ok(AuthorizeHttpReply::deny(
            "no session",
            DenyDestination::Redirect {
                redirect_url: "https://sso.example.com/#/login".to_string(),
            },
        ))]));

        let response = app.oneshot(replay()).await.expect("response");
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://sso.example.com/#/login"
        );
        assert!(response.headers().get(HEADERS_TO_REMOVE).is_none());
    }

    #[tokio::test]
    async fn unreachable_authority_is_service_unavailable() {
        let (app, _) = app(FakeClient::replying(vec![
            Err(unavailable()),
            Err(unavailable()),
            Err(unavailable()),
        ]));

        let response = app.oneshot(replay()).await.expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = String::from_utf8(body.to_vec()).expect("utf-8");
        assert!(body.starts_with("authorization check failed after 3 tries"));
    }

    #[tokio::test]
    async fn shutdown_abandons_checks() {
        let (app, state) = app(FakeClient::hanging());
        state.shutdown.cancel();

        let response = app.oneshot(replay()).await.expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(&body[..], b"Failed to evaluate authorization decision.");
    }

    impl ProxyState<FakeClient> {
        fn authorizer_seen(&self) -> portcullis_core::AuthorizeHttpRequest {
            self.authorizer.client().seen.lock().unwrap()[0].clone()
        }
    }
}
