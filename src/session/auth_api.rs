//! Storefront auth endpoints: OTP login, CSRF handshake and logout.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::client::{ApiClient, ApiRequest};
use super::config::{CSRF_ENDPOINT, SEND_OTP_ENDPOINT, VERIFY_OTP_ENDPOINT};
use super::error::Result;
use super::refresh::request_logout;
use super::state::SessionUpdate;

/// Payload of a successful OTP verification.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "accessToken", default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub user: Option<Value>,
}

impl ApiClient {
    /// Ask the backend to text a one-time password to `phone`.
    pub async fn send_otp(&self, phone: &str) -> Result<Value> {
        let request =
            ApiRequest::post(SEND_OTP_ENDPOINT, json!({ "phone": phone })).without_refresh();
        let body = self.send(request).await?.json_value()?;
        info!("OTP requested");
        Ok(body)
    }

    /// Exchange a one-time password for a session.
    pub async fn verify_otp(&self, phone: &str, otp: &str) -> Result<LoginResponse> {
        let request = ApiRequest::post(VERIFY_OTP_ENDPOINT, json!({ "phone": phone, "otp": otp }))
            .without_refresh();
        let body = self.send(request).await?.json_value()?;

        let login = if body.is_null() {
            LoginResponse::default()
        } else {
            LoginResponse::deserialize(self.config().body_shape.payload(&body)?)?
        };

        match &login.access_token {
            Some(token) if !token.is_empty() => self.tokens().set(token),
            _ => debug!("Login response carried no access token, relying on cookies"),
        }

        self.notify(SessionUpdate::Authenticated {
            access_token: login.access_token.clone(),
            user: login.user.clone(),
        });
        info!("Logged in");

        Ok(login)
    }

    /// Fetch the anti-forgery cookie. Later requests mirror it into the
    /// `X-XSRF-TOKEN` header.
    pub async fn csrf_handshake(&self) -> Result<()> {
        self.send(ApiRequest::get(CSRF_ENDPOINT).without_refresh())
            .await?;

        if self.tokens().xsrf_token().is_none() {
            warn!("CSRF handshake did not set an XSRF-TOKEN cookie");
        }
        Ok(())
    }

    /// End the session. Local state is always cleared; the backend call is
    /// best-effort.
    pub async fn logout(&self) {
        let cookies = self.tokens().cookie_header();
        let token = self.tokens().get();

        self.tokens().clear();
        self.notify(SessionUpdate::LoggedOut);

        match request_logout(self.http(), self.config(), cookies.as_deref(), token.as_deref()).await
        {
            Ok(()) => info!("Logged out"),
            Err(e) => debug!(error = %e, "Backend logout failed, local session already cleared"),
        }
    }
}
