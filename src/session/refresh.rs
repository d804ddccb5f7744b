//! Raw refresh and logout calls.
//!
//! These bypass the client pipeline: they must never trigger another refresh.
//! The edge re-auth route uses them directly with the browser's cookies; the
//! API client layers token storage and session updates on top.

use reqwest::Client;
use reqwest::header::{COOKIE, HeaderValue, SET_COOKIE};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::config::{ClientConfig, LOGOUT_ENDPOINT, REFRESH_ENDPOINT};
use super::error::{ClientError, Result};

/// Successful answer from the refresh endpoint.
#[derive(Debug, Clone, Default)]
pub struct RefreshedSession {
    /// New access token, absent when the backend only rotated its cookie
    pub access_token: Option<String>,
    /// `Set-Cookie` headers returned alongside
    pub set_cookies: Vec<HeaderValue>,
}

/// Read the `message` field of an error body, if there is one.
pub fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Pull `accessToken` out of a success body. An empty body carries no token.
pub fn access_token_from_body(config: &ClientConfig, body: &[u8]) -> Result<Option<String>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ClientError::InvalidResponse(format!("Refresh body is not JSON: {}", e)))?;

    let token = config
        .body_shape
        .payload(&value)?
        .get("accessToken")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    Ok(token)
}

/// Call the refresh endpoint once.
///
/// `cookie_header` carries the ambient credentials (HTTP-only refresh
/// cookie). `refresh_token` is sent in the body for legacy backends.
pub async fn request_refresh(
    http: &Client,
    config: &ClientConfig,
    cookie_header: Option<&str>,
    refresh_token: Option<&str>,
) -> Result<RefreshedSession> {
    let body = match refresh_token {
        Some(token) => json!({ "refreshToken": token }),
        None => json!({}),
    };

    let mut request = http.post(config.endpoint(REFRESH_ENDPOINT)).json(&body);
    if let Some(cookies) = cookie_header {
        request = request.header(COOKIE, cookies);
    }

    let response = request.send().await?;
    let status = response.status();
    let set_cookies: Vec<HeaderValue> = response.headers().get_all(SET_COOKIE).iter().cloned().collect();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let message = error_message(&bytes);
        warn!(status = %status, message = ?message, "Refresh endpoint rejected the session");
        return Err(ClientError::Api { status, message });
    }

    let access_token = access_token_from_body(config, &bytes)?;
    if access_token.is_none() {
        debug!("Refresh succeeded without a token in the body, cookie was rotated");
    }
    info!(rotated_cookies = set_cookies.len(), "Session refreshed");

    Ok(RefreshedSession {
        access_token,
        set_cookies,
    })
}

/// Tell the backend to drop the session. Callers treat failure as best-effort.
pub async fn request_logout(
    http: &Client,
    config: &ClientConfig,
    cookie_header: Option<&str>,
    access_token: Option<&str>,
) -> Result<()> {
    let mut request = http.post(config.endpoint(LOGOUT_ENDPOINT)).json(&json!({}));
    if let Some(cookies) = cookie_header {
        request = request.header(COOKIE, cookies);
    }
    if let Some(token) = access_token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let message = error_message(&response.bytes().await.unwrap_or_default());
        return Err(ClientError::Api { status, message });
    }
    Ok(())
}
