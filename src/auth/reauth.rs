//! The re-auth page: silently refresh an expired session, then move on.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::{info, warn};

use super::guard::with_referer;
use super::state::EdgeState;
use crate::cookie::{
    ACCESS_COOKIE_NAME, CookieAttributes, REFRESH_COOKIE_NAME, format_clear_cookie,
    format_set_cookie, get_cookie,
};
use crate::session::{ClientError, request_refresh};

/// Message shown when the backend gives no reason.
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please login again.";

/// Seconds the failure message stays up before the login redirect.
pub const LOGIN_REDIRECT_DELAY_SECS: u64 = 2;

#[derive(Debug, Deserialize)]
pub struct ReAuthQuery {
    pub referer: Option<String>,
}

/// Refresh using the browser's cookies and redirect to the referer,
/// or show the failure page that forwards to login.
pub async fn reauth_handler(
    State(state): State<EdgeState>,
    Query(query): Query<ReAuthQuery>,
    headers: HeaderMap,
) -> Response {
    let cookies = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok());
    let legacy_token = get_cookie(&headers, REFRESH_COOKIE_NAME).filter(|t| !t.is_empty());

    match request_refresh(&state.http, &state.api, cookies, legacy_token).await {
        Ok(refreshed) => {
            let target = state.routes.safe_referer(query.referer.as_deref());
            info!(target = %target, "Session restored");

            let mut response = Redirect::temporary(&target).into_response();
            let response_headers = response.headers_mut();
            for cookie in refreshed.set_cookies {
                response_headers.append(header::SET_COOKIE, cookie);
            }
            if let Some(token) = refreshed.access_token {
                let cookie = format_set_cookie(
                    ACCESS_COOKIE_NAME,
                    &token,
                    &CookieAttributes::session(state.secure_cookies()),
                );
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    response_headers.append(header::SET_COOKIE, value);
                }
            }
            response
        }
        Err(e) => {
            warn!(error = %e, "Re-auth refresh failed");

            let message = match &e {
                ClientError::Api { message: Some(m), .. } if !m.is_empty() => m.clone(),
                _ => SESSION_EXPIRED_MESSAGE.to_string(),
            };
            let login_url = match query.referer.as_deref().filter(|r| !r.is_empty()) {
                Some(referer) => with_referer(&state.routes.login_path, referer),
                None => state.routes.login_path.clone(),
            };

            ReAuthFailed {
                message,
                login_url,
                secure_cookies: state.secure_cookies(),
            }
            .into_response()
        }
    }
}

/// Failure page: shows the reason, clears the session cookies and forwards
/// to login after a short delay.
pub struct ReAuthFailed {
    pub message: String,
    pub login_url: String,
    pub secure_cookies: bool,
}

impl IntoResponse for ReAuthFailed {
    fn into_response(self) -> Response {
        let login_url = escape_html(&self.login_url);
        let page = format!(
            concat!(
                "<!DOCTYPE html>\n",
                "<html><head><meta charset=\"utf-8\">",
                "<meta http-equiv=\"refresh\" content=\"{delay};url={url}\">",
                "<title>Session expired</title></head>\n",
                "<body><p class=\"error\">{message}</p>",
                "<p>Redirecting to login...</p></body></html>\n"
            ),
            delay = LOGIN_REDIRECT_DELAY_SECS,
            url = login_url,
            message = escape_html(&self.message),
        );

        let mut response = (StatusCode::OK, Html(page)).into_response();
        let headers = response.headers_mut();

        let refresh = format!("{};url={}", LOGIN_REDIRECT_DELAY_SECS, self.login_url);
        if let Ok(value) = HeaderValue::from_str(&refresh) {
            headers.insert("refresh", value);
        }
        for name in [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME] {
            if let Ok(value) = HeaderValue::from_str(&format_clear_cookie(name, self.secure_cookies))
            {
                headers.append(header::SET_COOKIE, value);
            }
        }
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        response
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
