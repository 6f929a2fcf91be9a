//! Turns a proxy check into an authority decision and back.

use async_trait::async_trait;
use portcullis_core::{AuthorizeHttpReply, AuthorizeHttpRequest, Decision, DenyDestination, Header};
use rootcause::Report;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::check::{CheckRequest, CheckResponse};
use crate::error::{ClientError, ProxyError};

/// Body sent when the check was abandoned before a decision arrived.
pub const EVALUATION_FAILED_BODY: &str = "Failed to evaluate authorization decision.";

pub const MAX_ATTEMPTS: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_millis(10);

/// The authority's `Session.AuthorizeHTTP` operation.
#[async_trait]
pub trait DecisionClient: Send + Sync {
    async fn authorize_http(
        &self,
        request: &AuthorizeHttpRequest,
    ) -> Result<AuthorizeHttpReply, Report<ClientError>>;
}

/// A check that ended without a decision. The response still has to be
/// sent to the proxy.
#[derive(Debug)]
pub struct CheckFailure {
    pub response: CheckResponse,
    pub error: ProxyError,
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for CheckFailure {}

pub struct ProxyAuthorizer<C> {
    client: C,
    username_header: Option<String>,
    max_attempts: u32,
    retry_delay: Duration,
}

enum Interrupted {
    Deadline,
    Cancelled,
}

async fn deadline_passed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl<C: DecisionClient> ProxyAuthorizer<C> {
    pub fn new(client: C, username_header: Option<String>) -> Self {
        Self {
            client,
            username_header: username_header.filter(|h| !h.is_empty()),
            max_attempts: MAX_ATTEMPTS,
            retry_delay: RETRY_DELAY,
        }
    }

    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Asks the authority about `request`, retrying failed calls.
    ///
    /// Every call and every wait between calls gives up as soon as `cancel`
    /// fires or `deadline` passes.
    ///
    /// # Errors
    ///
    /// Returns the failure, with the response to send, when no decision
    /// could be obtained.
    #[instrument(skip_all, fields(method = %request.method, host = %request.host, path = %request.path))]
    pub async fn check(
        &self,
        request: &CheckRequest,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<CheckResponse, CheckFailure> {
        let query = request.to_authorize_request();
        let mut failures = Vec::new();

        for attempt in 1..=self.max_attempts {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(abandoned(Interrupted::Cancelled, attempt, failures)),
                () = deadline_passed(deadline) => return Err(abandoned(Interrupted::Deadline, attempt, failures)),
                result = self.client.authorize_http(&query) => result,
            };
            match result {
                Ok(reply) => return Ok(self.respond(reply)),
                Err(err) => {
                    debug!(attempt, error = %err, "AuthorizeHTTP attempt failed");
                    failures.push(format!("[call remote AuthorizeHTTP: {err}]"));
                }
            }
            if attempt == self.max_attempts {
                break;
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(abandoned(Interrupted::Cancelled, attempt, failures)),
                () = deadline_passed(deadline) => return Err(abandoned(Interrupted::Deadline, attempt, failures)),
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        let message = format!(
            "authorization check failed after {} tries: {}",
            self.max_attempts,
            failures.join(" ")
        );
        Err(CheckFailure {
            response: CheckResponse::plain(503, message.clone()),
            error: ProxyError::Unavailable { message },
        })
    }

    fn respond(&self, reply: AuthorizeHttpReply) -> CheckResponse {
        match reply.decision {
            Decision::Allow {
                username,
                add_headers,
            } => {
                let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
                for header in add_headers {
                    grouped
                        .entry(header.key.to_ascii_lowercase())
                        .or_default()
                        .push(header.value);
                }
                let headers_to_remove = ["cookie", "authorization"]
                    .into_iter()
                    .filter(|name| !grouped.contains_key(*name))
                    .map(str::to_string)
                    .collect();
                let mut headers: Vec<Header> = grouped
                    .into_iter()
                    .map(|(key, values)| {
                        let separator = if key == "cookie" { "; " } else { "," };
                        let value = values.join(separator);
                        Header { key, value }
                    })
                    .collect();
                if let Some(name) = &self.username_header {
                    headers.push(Header::new(name.clone(), username));
                }
                CheckResponse::Ok {
                    headers,
                    headers_to_remove,
                }
            }
            Decision::Deny {
                reason,
                destination,
            } => {
                debug!(%reason, "request denied");
                match destination {
                    DenyDestination::Redirect { redirect_url } => CheckResponse::Denied {
                        status: 307,
                        headers: vec![
                            Header::new("content-type", "text/plain"),
                            Header::new("location", redirect_url.clone()),
                        ],
                        body: format!("Not authorized. Redirecting you to {redirect_url:?}"),
                    },
                    DenyDestination::Response { content_type, body } => CheckResponse::Denied {
                        status: 403,
                        headers: vec![Header::new("content-type", content_type)],
                        body,
                    },
                }
            }
        }
    }
}

fn abandoned(why: Interrupted, attempts: u32, failures: Vec<String>) -> CheckFailure {
    let error = match why {
        Interrupted::Deadline => ProxyError::DeadlineExceeded { attempts, failures },
        Interrupted::Cancelled => ProxyError::Cancelled { attempts, failures },
    };
    CheckFailure {
        response: CheckResponse::plain(500, EVALUATION_FAILED_BODY),
        error,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::check::fold_headers;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays scripted results. Once the script runs out, it fails if
    /// `hang` is false and never answers otherwise.
    #[derive(Default)]
    pub(crate) struct FakeClient {
        pub script: Mutex<VecDeque<Result<AuthorizeHttpReply, ClientError>>>,
        pub seen: Mutex<Vec<AuthorizeHttpRequest>>,
        pub calls: AtomicU32,
        pub hang: bool,
    }

    impl FakeClient {
        pub(crate) fn replying(results: Vec<Result<AuthorizeHttpReply, ClientError>>) -> Self {
            Self {
                script: Mutex::new(results.into()),
                ..Self::default()
            }
        }

        pub(crate) fn hanging() -> Self {
            Self {
                hang: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl DecisionClient for FakeClient {
        async fn authorize_http(
            &self,
            request: &AuthorizeHttpRequest,
        ) -> Result<AuthorizeHttpReply, Report<ClientError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(result) => result.map_err(Report::from),
                None if self.hang => std::future::pending().await,
                None => Err(Report::from(ClientError::Transport {
                    reason: "connection refused".to_string(),
                })),
            }
        }
    }

    pub(crate) fn unavailable() -> ClientError {
        ClientError::Transport {
            reason: "connection refused".to_string(),
        }
    }

    fn request() -> CheckRequest {
        CheckRequest {
            method: "GET".to_string(),
            scheme: "https".to_string(),
            host: "grafana.example.com".to_string(),
            path: "/".to_string(),
            headers: fold_headers([
                ("authorization", "SessionID abc,Bearer upstream"),
                ("cookie", "portcullis-session=abc; theme=dark"),
            ]),
            source_ip: "203.0.113.9".to_string(),
        }
    }

    async fn run<C: DecisionClient>(authorizer: &ProxyAuthorizer<C>) -> Result<CheckResponse, CheckFailure> {
        authorizer
            .check(&request(), &CancellationToken::new(), None)
            .await
    }

    #[tokio::test]
    async fn allow_strips_consumed_credentials() {
        let client = FakeClient::replying(vec![Ok(AuthorizeHttpReply::allow("alice", vec![]))]);
        let authorizer = ProxyAuthorizer::new(client, Some("x-portcullis-user".to_string()));

        let response = run(&authorizer).await.expect("decision");
        assert_eq!(
            response,
            CheckResponse::Ok {
                headers: vec![Header::new("x-portcullis-user", "alice")],
                headers_to_remove: vec!["cookie".to_string(), "authorization".to_string()],
            }
        );

        let seen = authorizer.client.seen.lock().unwrap();
        assert_eq!(seen[0].authorization_headers, vec!["SessionID abc", "Bearer upstream"]);
        assert_eq!(seen[0].cookies, vec!["portcullis-session=abc", "theme=dark"]);
    }

    #[tokio::test]
    async fn allow_re_adds_folded_headers() {
        let client = FakeClient::replying(vec![Ok(AuthorizeHttpReply::allow(
            "alice",
            vec![
                Header::new("Cookie", "theme=dark"),
                Header::new("cookie", "lang=en"),
                Header::new("Authorization", "Bearer one"),
                Header::new("authorization", "Bearer two"),
            ],
        ))]);
        let authorizer = ProxyAuthorizer::new(client, None);

        let response = run(&authorizer).await.expect("decision");
        assert_eq!(
            response,
            CheckResponse::Ok {
                headers: vec![
                    Header::new("authorization", "Bearer one,Bearer two"),
                    Header::new("cookie", "theme=dark; lang=en"),
                ],
                headers_to_remove: vec![],
            }
        );
    }

    #[tokio::test]
    async fn redirect_denials_send_the_browser_to_login() {
        let client = FakeClient::replying(vec![Ok(AuthorizeHttpReply::deny(
            "no session",
            DenyDestination::Redirect {
                redirect_url: "https://sso.example.com/#/login?redirect=tok".to_string(),
            },
        ))]);
        let authorizer = ProxyAuthorizer::new(client, None);

        let CheckResponse::Denied {
            status,
            headers,
            body,
        } = run(&authorizer).await.expect("decision")
        else {
            panic!("expected a denial");
        };
        assert_eq!(status, 307);
        assert!(headers.contains(&Header::new(
            "location",
            "https://sso.example.com/#/login?redirect=tok"
        )));
        assert!(headers.contains(&Header::new("content-type", "text/plain")));
        assert!(body.contains("https://sso.example.com/#/login?redirect=tok"));
    }

    #[tokio::test]
    async fn response_denials_are_forbidden() {
        let client = FakeClient::replying(vec![Ok(AuthorizeHttpReply::deny(
            "no session",
            DenyDestination::Response {
                content_type: "text/plain".to_string(),
                body: "You are not logged in.".to_string(),
            },
        ))]);
        let authorizer = ProxyAuthorizer::new(client, None);

        let response = run(&authorizer).await.expect("decision");
        assert_eq!(
            response,
            CheckResponse::Denied {
                status: 403,
                headers: vec![Header::new("content-type", "text/plain")],
                body: "You are not logged in.".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let client = FakeClient::replying(vec![
            Err(unavailable()),
            Ok(AuthorizeHttpReply::allow("alice", vec![])),
        ]);
        let authorizer = ProxyAuthorizer::new(client, None);

        let response = run(&authorizer).await.expect("decision");
        assert!(response.is_ok());
        assert_eq!(authorizer.client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_are_unavailable() {
        let authorizer = ProxyAuthorizer::new(FakeClient::default(), None);

        let failure = run(&authorizer).await.expect_err("should fail");
        assert_eq!(authorizer.client.calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
        assert_eq!(failure.response.status(), 503);
        let ProxyError::Unavailable { message } = &failure.error else {
            panic!("expected unavailable, got {:?}", failure.error);
        };
        assert!(message.starts_with("authorization check failed after 3 tries"));
        assert_eq!(message.matches("connection refused").count(), 3);
    }

    #[tokio::test]
    async fn cancellation_is_its_own_failure() {
        let authorizer = ProxyAuthorizer::new(FakeClient::hanging(), None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = authorizer
            .check(&request(), &cancel, None)
            .await
            .expect_err("should fail");
        assert!(matches!(failure.error, ProxyError::Cancelled { attempts: 1, .. }));
        assert_eq!(
            failure.response,
            CheckResponse::plain(500, EVALUATION_FAILED_BODY)
        );
    }

    #[tokio::test]
    async fn deadline_interrupts_a_hung_call() {
        let authorizer = ProxyAuthorizer::new(FakeClient::hanging(), None);
        let deadline = Instant::now() + Duration::from_millis(20);

        let failure = authorizer
            .check(&request(), &CancellationToken::new(), Some(deadline))
            .await
            .expect_err("should fail");
        assert!(matches!(
            failure.error,
            ProxyError::DeadlineExceeded { attempts: 1, .. }
        ));
        assert_eq!(failure.response.status(), 500);
    }

    #[tokio::test]
    async fn deadline_interrupts_the_retry_wait() {
        let mut authorizer = ProxyAuthorizer::new(FakeClient::default(), None);
        authorizer.retry_delay = Duration::from_secs(60);
        let deadline = Instant::now() + Duration::from_millis(20);

        let failure = authorizer
            .check(&request(), &CancellationToken::new(), Some(deadline))
            .await
            .expect_err("should fail");
        let ProxyError::DeadlineExceeded { attempts, failures } = failure.error else {
            panic!("expected deadline exceeded");
        };
        assert_eq!(attempts, 1);
        assert_eq!(failures.len(), 1);
    }
}
