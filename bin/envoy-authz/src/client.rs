//! JSON-over-HTTP client for the authority's `Session.AuthorizeHTTP`.

use async_trait::async_trait;
use portcullis_core::{AuthorizeHttpReply, AuthorizeHttpRequest, Code, RpcStatus};
use reqwest::Url;
use rootcause::Report;
use std::time::Duration;

use crate::adapter::DecisionClient;
use crate::error::{ClientError, ConfigError};

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const AUTHORIZE_HTTP_PATH: &str = "rpc/Session/AuthorizeHTTP";

pub struct HttpDecisionClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl HttpDecisionClient {
    /// # Errors
    ///
    /// Returns an error if `server_url` is not an absolute http(s) URL or
    /// the HTTP client cannot be built.
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, Report<ConfigError>> {
        let mut base = Url::parse(server_url).map_err(|e| ConfigError::InvalidServerUrl {
            reason: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidServerUrl {
                reason: format!("unsupported scheme {:?}", base.scheme()),
            }
            .into());
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join(AUTHORIZE_HTTP_PATH)
            .map_err(|e| ConfigError::InvalidServerUrl {
                reason: e.to_string(),
            })?;

        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Client {
                reason: e.to_string(),
            })?;

        Ok(Self { http, endpoint })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn transport(err: reqwest::Error) -> ClientError {
    ClientError::Transport {
        reason: err.to_string(),
    }
}

#[async_trait]
impl DecisionClient for HttpDecisionClient {
    async fn authorize_http(
        &self,
        request: &AuthorizeHttpRequest,
    ) -> Result<AuthorizeHttpReply, Report<ClientError>> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        let http_status = response.status();
        let body = response.bytes().await.map_err(transport)?;

        if !http_status.is_success() {
            let status = serde_json::from_slice::<RpcStatus>(&body).unwrap_or_else(|_| {
                RpcStatus::new(Code::Internal, String::from_utf8_lossy(&body))
            });
            return Err(ClientError::Status {
                http_status: http_status.as_u16(),
                status,
            }
            .into());
        }

        serde_json::from_slice(&body).map_err(|e| {
            ClientError::Decode {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        format!("http://{addr}")
    }

    #[test]
    fn endpoint_keeps_a_path_prefix() {
        let client = HttpDecisionClient::new("https://sso.example.com/auth", Duration::from_secs(1))
            .expect("client");
        assert_eq!(
            client.endpoint().as_str(),
            "https://sso.example.com/auth/rpc/Session/AuthorizeHTTP"
        );
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(HttpDecisionClient::new("ftp://sso.example.com", Duration::from_secs(1)).is_err());
        assert!(HttpDecisionClient::new("sso.example.com", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn posts_the_query_as_json() {
        let router = Router::new().route(
            "/rpc/Session/AuthorizeHTTP",
            post(|Json(req): Json<AuthorizeHttpRequest>| async move {
                Json(AuthorizeHttpReply::allow(req.request_id, vec![]))
            }),
        );
        let client = HttpDecisionClient::new(&serve(router).await, Duration::from_secs(5))
            .expect("client");

        let reply = client
            .authorize_http(&AuthorizeHttpRequest {
                method: "GET".to_string(),
                request_uri: "https://grafana.example.com/".to_string(),
                request_id: "req-7".to_string(),
                ..AuthorizeHttpRequest::default()
            })
            .await
            .expect("reply");
        assert_eq!(reply, AuthorizeHttpReply::allow("req-7", vec![]));
    }

    #[tokio::test]
    async fn rpc_errors_carry_their_status() {
        let router = Router::new().route(
            "/rpc/Session/AuthorizeHTTP",
            post(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(RpcStatus::new(Code::Unavailable, "database is down")),
                )
            }),
        );
        let client = HttpDecisionClient::new(&serve(router).await, Duration::from_secs(5))
            .expect("client");

        let err = client
            .authorize_http(&AuthorizeHttpRequest::default())
            .await
            .expect_err("should fail");
        assert_eq!(
            err.current_context(),
            &ClientError::Status {
                http_status: 503,
                status: RpcStatus::new(Code::Unavailable, "database is down"),
            }
        );
    }
}
