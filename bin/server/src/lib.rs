//! portcullis single sign-on authority.
//!
//! Serves the JSON RPC surface (users, sessions, login and enrollment
//! ceremonies) behind a per-operation authorization hook, plus the browser
//! endpoints that install and clear the session cookie.

pub mod auth;
pub mod config;
pub mod error;
pub mod rpc;
pub mod state;
pub mod web;
pub mod webauthn;

use axum::{Router, routing::get};
use portcullis_store::Database;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Builds the authority's router.
pub fn app<D: Database>(state: Arc<AppState<D>>) -> Router {
    Router::new()
        .merge(rpc::routes(&state))
        .route("/set-cookie", get(web::set_cookie::<D>))
        .route("/logout", get(web::logout::<D>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CookieConfig;
    use crate::webauthn::{AttestedCredential, CeremonyError, CeremonyVerifier, b64};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use portcullis_authz::{Authorizer, AuthorizerConfig, Linker, ToleranceTable};
    use axum_extra::extract::cookie::Cookie;
    use portcullis_session::{Credential, SessionId};
    use portcullis_store::{MemoryDatabase, RetryPolicy};
    use portcullis_token::{RedirectToken, TokenKey};
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const BASE: &str = "https://sso.example.com";
    const ROOT: &str = "root hunter2";

    struct FakeVerifier;

    #[async_trait]
    impl CeremonyVerifier for FakeVerifier {
        async fn verify_attestation(
            &self,
            rp_id: &str,
            _client_data_json: &[u8],
            attestation_object: &[u8],
        ) -> Result<AttestedCredential, CeremonyError> {
            assert_eq!(rp_id, "sso.example.com");
            if attestation_object == b"bad" {
                return Err(CeremonyError::Verification {
                    reason: "bad attestation".into(),
                });
            }
            Ok(AttestedCredential {
                credential_id: vec![1, 2, 3],
                public_key: vec![4, 5, 6],
                aaguid: vec![0; 16],
                sign_count: 0,
            })
        }

        async fn verify_assertion(
            &self,
            _rp_id: &str,
            credential: &Credential,
            _client_data_json: &[u8],
            _authenticator_data: &[u8],
            signature: &[u8],
        ) -> Result<u32, CeremonyError> {
            if signature == b"forged" {
                return Err(CeremonyError::Verification {
                    reason: "bad signature".into(),
                });
            }
            Ok(credential.sign_count + 1)
        }
    }

    fn key() -> TokenKey {
        TokenKey::new(&[9u8; 32]).expect("key")
    }

    fn state(verifier: bool) -> Arc<AppState<MemoryDatabase>> {
        let authorizer = Authorizer::new(
            Arc::new(MemoryDatabase::new()),
            ToleranceTable::standard().expect("tolerances"),
            AuthorizerConfig {
                root_password: Some(SecretString::from("hunter2")),
                cookie_name: "portcullis-session".to_string(),
                retry: RetryPolicy::default(),
            },
        );
        let state = AppState::new(
            authorizer,
            key(),
            Linker::new(BASE).expect("linker"),
            CookieConfig::default(),
        );
        let state = if verifier {
            state.with_verifier(Arc::new(FakeVerifier))
        } else {
            state
        };
        Arc::new(state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, header::HeaderMap, Vec<u8>) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, headers, body.to_vec())
    }

    async fn call(app: &Router, path: &str, auth: &[(header::HeaderName, String)], body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in auth {
            builder = builder.header(name, value);
        }
        let request = builder.body(Body::from(body.to_string())).expect("request");
        let (status, _, body) = send(app, request).await;
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).expect("json body")
        };
        (status, json)
    }

    fn authorization(value: &str) -> Vec<(header::HeaderName, String)> {
        vec![(header::AUTHORIZATION, value.to_string())]
    }

    fn session_header(token: &str) -> Vec<(header::HeaderName, String)> {
        authorization(&format!("SessionID {token}"))
    }

    fn cookie(token: &str) -> Vec<(header::HeaderName, String)> {
        vec![(header::COOKIE, format!("portcullis-session={token}"))]
    }

    fn client_data(kind: &str, challenge: &str) -> String {
        b64::encode(
            json!({"type": kind, "challenge": challenge, "origin": BASE, "crossOrigin": false})
                .to_string()
                .as_bytes(),
        )
    }

    async fn create_user(app: &Router, username: &str) -> Value {
        let (status, reply) = call(
            app,
            "/rpc/User/Edit",
            &authorization(ROOT),
            json!({"user": {"username": username}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{reply}");
        reply
    }

    async fn enrollment_token(app: &Router, username: &str) -> String {
        let (status, reply) = call(
            app,
            "/rpc/User/GenerateEnrollmentLink",
            &authorization(ROOT),
            json!({"target": {"username": username}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{reply}");
        let token = reply["token"].as_str().expect("token").to_string();
        assert_eq!(reply["url"], format!("{BASE}/#/enroll/{token}"));
        token
    }

    async fn enroll(app: &Router, token: &str) -> String {
        let (status, reply) = call(
            app,
            "/rpc/Enrollment/Finish",
            &session_header(token),
            json!({
                "name": "yubikey",
                "credential": {
                    "client_data_json": client_data("webauthn.create", token),
                    "attestation_object": b64::encode(b"ok"),
                },
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{reply}");
        reply["redirect_url"].as_str().expect("redirect").to_string()
    }

    fn get(uri: &str, headers: &[(header::HeaderName, String)]) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        builder.body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn anonymous_callers_reach_only_tolerant_operations() {
        let app = app(state(false));

        let (status, reply) = call(&app, "/rpc/Health/Check", &[], json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["status"], "ok");

        let (status, reply) = call(&app, "/rpc/User/WhoAmI", &[], json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["user"]["username"], "anonymous");
        assert_eq!(reply["taints"], json!(["anonymous"]));

        let (status, reply) = call(
            &app,
            "/rpc/User/Edit",
            &[],
            json!({"user": {"username": "mallory"}}),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(reply["code"], "permission_denied");
        assert!(reply["message"].as_str().expect("message").contains("anonymous"));
    }

    #[tokio::test]
    async fn bad_credentials_are_unauthenticated() {
        let app = app(state(false));
        let (status, reply) = call(
            &app,
            "/rpc/Health/Check",
            &authorization("SessionID !!!"),
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply["code"], "unauthenticated");
    }

    #[tokio::test]
    async fn reflection_lists_every_operation() {
        let app = app(state(false));
        let (status, reply) = call(&app, "/rpc/Reflection/ListOperations", &[], json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let operations = reply["operations"].as_array().expect("operations");
        assert_eq!(operations.len(), 10);
        let finish = operations
            .iter()
            .find(|op| op["path"] == "/rpc/Login/Finish")
            .expect("login finish");
        assert_eq!(finish["tolerated_taints"], json!(["start_login"]));
        assert_eq!(finish["served"], false);
    }

    #[tokio::test]
    async fn ceremonies_are_not_served_without_a_verifier() {
        let app = app(state(false));
        let (status, _) = call(&app, "/rpc/Login/Start", &[], json!({"username": "alice"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn duplicate_users_are_refused() {
        let app = app(state(false));
        create_user(&app, "alice").await;
        let (status, reply) = call(
            &app,
            "/rpc/User/Edit",
            &authorization(ROOT),
            json!({"user": {"username": "alice"}}),
        )
        .await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(reply["code"], "failed_precondition");
    }

    #[tokio::test]
    async fn enrollment_then_login_then_logout() {
        let app = app(state(true));
        let created = create_user(&app, "alice").await;
        assert_eq!(created["user"]["username"], "alice");

        // Enrollment links only work for enrollment.
        let token = enrollment_token(&app, "alice").await;
        let (status, _) = call(&app, "/rpc/User/WhoAmI", &session_header(&token), json!({})).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, reply) = call(
            &app,
            "/rpc/Enrollment/Start",
            &session_header(&token),
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{reply}");
        assert_eq!(reply["options"]["challenge"], token.as_str());
        assert_eq!(reply["options"]["rp"]["id"], "sso.example.com");

        let set_cookie_link = enroll(&app, &token).await;
        let path = set_cookie_link.strip_prefix(BASE).expect("same site");
        let (status, headers, body) = send(&app, get(path, &[])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
        assert_eq!(headers.get_all(header::SET_COOKIE).iter().count(), 1);
        let cookie_header = headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("set-cookie");
        let installed = Cookie::parse(cookie_header).expect("cookie");
        assert_eq!(installed.name(), "portcullis-session");
        assert_eq!(installed.http_only(), Some(true));
        assert_eq!(
            SessionId::from_base64(installed.value()).expect("session id"),
            SessionId::from_base64(&token).expect("session id")
        );

        // The enrollment session is now a full login.
        let (status, reply) = call(&app, "/rpc/User/WhoAmI", &cookie(&token), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["user"]["username"], "alice");
        assert_eq!(reply["taints"], json!([]));

        // Log in again, carrying a post-login destination.
        let (status, reply) = call(&app, "/rpc/Login/Start", &[], json!({"username": "alice"})).await;
        assert_eq!(status, StatusCode::OK, "{reply}");
        let login = reply["token"].as_str().expect("token").to_string();
        assert_eq!(reply["options"]["allowCredentials"][0]["id"], b64::encode(&[1, 2, 3]));

        let redirect = RedirectToken::new("https://grafana.example.com/d/abc")
            .seal(&key())
            .expect("seal");
        let (status, reply) = call(
            &app,
            "/rpc/Login/Finish",
            &session_header(&login),
            json!({
                "credential": {
                    "credential_id": b64::encode(&[1, 2, 3]),
                    "client_data_json": client_data("webauthn.get", &login),
                    "authenticator_data": b64::encode(b"auth"),
                    "signature": b64::encode(b"sig"),
                },
                "redirect_token": redirect,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{reply}");
        let link = reply["redirect_url"].as_str().expect("redirect");
        let (status, headers, _) = send(&app, get(link.strip_prefix(BASE).expect("same site"), &[])).await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(headers[header::LOCATION], "https://grafana.example.com/d/abc");

        // Logging out revokes the session and clears the cookie.
        let (status, headers, _) = send(&app, get("/logout", &cookie(&login))).await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(headers[header::LOCATION], format!("{BASE}/#/login"));
        let (status, reply) = call(&app, "/rpc/User/WhoAmI", &cookie(&login), json!({})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{reply}");

        // The first session is untouched.
        let (status, _) = call(&app, "/rpc/User/WhoAmI", &cookie(&token), json!({})).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn failed_login_revokes_the_prototype() {
        let app = app(state(true));
        create_user(&app, "alice").await;
        let token = enrollment_token(&app, "alice").await;
        enroll(&app, &token).await;

        let (_, reply) = call(&app, "/rpc/Login/Start", &[], json!({"username": "alice"})).await;
        let login = reply["token"].as_str().expect("token").to_string();
        let body = json!({
            "credential": {
                "credential_id": b64::encode(&[1, 2, 3]),
                "client_data_json": client_data("webauthn.get", &login),
                "authenticator_data": b64::encode(b"auth"),
                "signature": b64::encode(b"forged"),
            },
        });
        let (status, reply) = call(&app, "/rpc/Login/Finish", &session_header(&login), body.clone()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(reply["code"], "permission_denied");

        let (status, _) = call(&app, "/rpc/Login/Finish", &session_header(&login), body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_requires_enrolled_credentials() {
        let app = app(state(true));
        create_user(&app, "bob").await;
        let (status, reply) = call(&app, "/rpc/Login/Start", &[], json!({"username": "bob"})).await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED, "{reply}");

        let (status, reply) = call(&app, "/rpc/Login/Start", &[], json!({"username": "nobody"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{reply}");
    }

    #[tokio::test]
    async fn proxy_decisions_use_end_user_credentials() {
        let app = app(state(true));
        create_user(&app, "alice").await;
        let token = enrollment_token(&app, "alice").await;
        enroll(&app, &token).await;

        let (status, reply) = call(
            &app,
            "/rpc/Session/AuthorizeHTTP",
            &authorization(ROOT),
            json!({
                "method": "GET",
                "request_uri": "https://grafana.example.com/",
                "cookies": [format!("portcullis-session={token}"), "theme=dark"],
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{reply}");
        assert_eq!(reply["decision"]["outcome"], "allow");
        assert_eq!(reply["decision"]["username"], "alice");
        assert_eq!(
            reply["decision"]["add_headers"],
            json!([{"key": "cookie", "value": "theme=dark"}])
        );

        let (status, reply) = call(
            &app,
            "/rpc/Session/AuthorizeHTTP",
            &authorization(ROOT),
            json!({"method": "GET", "request_uri": "not a url"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(reply["code"], "invalid_argument");
    }

    #[tokio::test]
    async fn tampered_set_cookie_tokens_are_rejected() {
        let app = app(state(false));
        let (status, headers, _) = send(&app, get("/set-cookie?set=v1.AAAA", &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(headers.get(header::SET_COOKIE).is_none());
    }
}
