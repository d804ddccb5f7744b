//! The storefront API client.
//!
//! Every call goes through [`ApiClient::send`], which attaches credentials and
//! recovers from a 401 by refreshing the session at most once per request.
//! Concurrent refreshes are coalesced: whichever request fails first starts
//! the refresh and every other failing request awaits the same operation.

use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderValue, SET_COOKIE};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::config::ClientConfig;
use super::error::{ClientError, Result};
use super::refresh::{error_message, request_logout, request_refresh};
use super::state::{SessionObserver, SessionUpdate};
use super::token_store::TokenStore;
use crate::cookie::XSRF_HEADER_NAME;

/// A logical API request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL
    pub path: String,
    pub body: Option<Value>,
    /// Set once the request has been through a refresh cycle. A request that
    /// is already marked surfaces its next 401 instead of refreshing again.
    pub retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Surface a 401 directly instead of refreshing. Used for calls that
    /// establish a session (login), where 401 means bad input.
    pub fn without_refresh(mut self) -> Self {
        self.retried = true;
        self
    }
}

/// A successful API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Deserialize the body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as a JSON value, `Null` when empty.
    pub fn json_value(&self) -> Result<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        self.json()
    }
}

/// Result of one refresh attempt, shared by every request waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The session is usable again. `access_token` is `None` when only the
    /// HTTP-only cookie was rotated.
    Refreshed { access_token: Option<String> },
    /// Credentials were wiped; the caller should navigate to `redirect`.
    Failed { redirect: String, reason: String },
}

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct ClientInner {
    config: ClientConfig,
    http: Client,
    tokens: TokenStore,
    observer: Arc<dyn SessionObserver>,
    in_flight: Mutex<Option<SharedRefresh>>,
}

/// Storefront API client with automatic session recovery.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// Create a client with an empty token store.
    pub fn new(config: ClientConfig, observer: Arc<dyn SessionObserver>) -> Result<Self> {
        let tokens = TokenStore::new(config.secure_cookies);
        Self::with_token_store(config, tokens, observer)
    }

    /// Create a client around an existing token store.
    pub fn with_token_store(
        config: ClientConfig,
        tokens: TokenStore,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(default_headers)
            .build()?;

        info!(base_url = %config.base_url, "API client ready");

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                http,
                tokens,
                observer,
                in_flight: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    pub(crate) fn http(&self) -> &Client {
        &self.inner.http
    }

    pub(crate) fn notify(&self, update: SessionUpdate) {
        self.inner.observer.on_session_update(update);
    }

    /// Issue a request through the pipeline.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        loop {
            let response = self.dispatch(&request).await?;
            let status = response.status();

            if status != StatusCode::UNAUTHORIZED {
                let headers = response.headers().clone();
                let body = response.bytes().await?.to_vec();

                if !status.is_success() {
                    let message = error_message(&body);
                    error!(
                        method = %request.method,
                        path = %request.path,
                        status = %status,
                        message = message.as_deref().unwrap_or("Unknown error"),
                        "API error"
                    );
                    return Err(ClientError::Api { status, message });
                }

                return Ok(ApiResponse {
                    status,
                    headers,
                    body,
                });
            }

            let message = error_message(&response.bytes().await.unwrap_or_default());

            if request.retried {
                warn!(
                    method = %request.method,
                    path = %request.path,
                    "Request rejected after session recovery"
                );
                return Err(ClientError::Unauthorized { message });
            }

            request.retried = true;
            debug!(method = %request.method, path = %request.path, "Got 401, refreshing session");

            match self.refresh().await {
                RefreshOutcome::Refreshed { .. } => {
                    debug!(path = %request.path, "Replaying request with refreshed credentials");
                }
                RefreshOutcome::Failed { redirect, reason } => {
                    return Err(ClientError::SessionInvalid { redirect, reason });
                }
            }
        }
    }

    /// Attach credentials and send one attempt.
    async fn dispatch(&self, request: &ApiRequest) -> Result<reqwest::Response> {
        let tokens = &self.inner.tokens;
        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), self.inner.config.endpoint(&request.path));

        if let Some(token) = tokens.get() {
            builder = builder.bearer_auth(token);
        }
        if let Some(xsrf) = tokens.xsrf_token() {
            builder = builder.header(XSRF_HEADER_NAME, xsrf);
        }
        if let Some(cookies) = tokens.cookie_header() {
            builder = builder.header(COOKIE, cookies);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.inspect_err(|e| {
            error!(method = %request.method, path = %request.path, error = %e, "Network error");
        })?;

        tokens.absorb(response.headers().get_all(SET_COOKIE));
        Ok(response)
    }

    /// Refresh the session, joining a refresh that is already running.
    pub async fn refresh(&self) -> RefreshOutcome {
        let shared = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            match slot.as_ref() {
                Some(running) => {
                    debug!("Joining in-flight session refresh");
                    running.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let refresh = async move {
                        let outcome = inner.run_refresh().await;
                        inner
                            .in_flight
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .take();
                        outcome
                    }
                    .boxed()
                    .shared();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };

        shared.await
    }

    /// Serialize `body`, POST it and deserialize the answer.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.send(ApiRequest::post(path, body)).await?.json()
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.send(ApiRequest::put(path, body)).await?.json()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.send(ApiRequest::delete(path)).await?.json_value()
    }
}

impl ClientInner {
    async fn run_refresh(&self) -> RefreshOutcome {
        let cookies = self.tokens.cookie_header();
        let legacy_token = self.tokens.refresh_token();

        let result = request_refresh(
            &self.http,
            &self.config,
            cookies.as_deref(),
            legacy_token.as_deref(),
        )
        .await;

        match result {
            Ok(refreshed) => {
                self.tokens.absorb(&refreshed.set_cookies);
                if let Some(token) = &refreshed.access_token {
                    self.tokens.set(token);
                }
                self.observer.on_session_update(SessionUpdate::Authenticated {
                    access_token: refreshed.access_token.clone(),
                    user: None,
                });
                RefreshOutcome::Refreshed {
                    access_token: refreshed.access_token,
                }
            }
            Err(e) => {
                warn!(error = %e, "Session refresh failed, logging out");
                self.invalidate_session(cookies.as_deref()).await;
                RefreshOutcome::Failed {
                    redirect: self.config.login_path.clone(),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Wipe local credentials, report the logout, then tell the backend.
    /// The backend call is best-effort: local state is already gone.
    async fn invalidate_session(&self, cookies: Option<&str>) {
        self.tokens.clear();
        self.observer.on_session_update(SessionUpdate::LoggedOut);

        if let Err(e) = request_logout(&self.http, &self.config, cookies, None).await {
            debug!(error = %e, "Ignoring failed logout call");
        }
    }
}
