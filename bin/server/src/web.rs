//! Browser endpoints that manage the session cookie.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use portcullis_store::Database;
use portcullis_token::SetCookieRequest;
use serde::Deserialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::info;

use crate::auth::call_credentials;
use crate::config::CookieConfig;
use crate::state::{AppState, cookie_expiry};

#[derive(Debug, Deserialize)]
pub struct SetCookieQuery {
    #[serde(default)]
    set: String,
}

fn session_cookie(config: &CookieConfig, value: String, expires: OffsetDateTime) -> Cookie<'static> {
    let mut cookie = Cookie::build((config.name.clone(), value))
        .path("/")
        .http_only(true)
        .secure(config.secure)
        .same_site(SameSite::Lax)
        .expires(expires);
    if let Some(domain) = &config.domain {
        cookie = cookie.domain(domain.clone());
    }
    cookie.build()
}

/// `GET /set-cookie?set=<token>`: installs the session from a set-cookie
/// token and continues to its destination.
pub async fn set_cookie<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Query(query): Query<SetCookieQuery>,
    jar: CookieJar,
) -> Response {
    let request = match SetCookieRequest::open(&query.set, &state.token_key) {
        Ok(request) if request.session_id.is_zero() => {
            return (StatusCode::BAD_REQUEST, "token does not carry a session").into_response();
        }
        Ok(request) => request,
        Err(err) => {
            info!(error = %err, "rejected set-cookie token");
            return (StatusCode::BAD_REQUEST, format!("open set-cookie token: {err}"))
                .into_response();
        }
    };

    let cookie = session_cookie(
        &state.cookie,
        request.session_id.to_base64(),
        cookie_expiry(request.session_expires_at),
    );
    let jar = jar.add(cookie);
    if request.redirect_url.is_empty() {
        (jar, [(header::CONTENT_TYPE, "text/plain")], "ok").into_response()
    } else {
        (jar, Redirect::temporary(&request.redirect_url)).into_response()
    }
}

/// `GET /logout`: revokes every presented session and clears the cookie.
pub async fn logout<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let extracted = state.authorizer.extract(&call_credentials(&headers));
    for id in &extracted.sessions {
        if let Err(err) = state.authorizer.revoke(id, "logout").await {
            info!(session = ?id, error = %err, "problem revoking session");
        }
    }

    let cleared = session_cookie(&state.cookie, String::new(), OffsetDateTime::UNIX_EPOCH);
    (jar.add(cleared), Redirect::temporary(&state.linker.login_page())).into_response()
}
