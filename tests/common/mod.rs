#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use serde_json::{Value, json};
use storefront::auth::RouteTable;
use storefront::cookie::get_cookie;
use storefront::session::{ClientConfig, SessionObserver, SessionUpdate};
use storefront::{ServerConfig, create_app, run_server};
use tokio::net::TcpListener;
use url::Url;

pub const VALID_OTP: &str = "123456";
pub const REFRESH_COOKIE_VALUE: &str = "refresh-1";
pub const XSRF_VALUE: &str = "xsrf-1";

#[derive(Serialize)]
struct Claims {
    sub: String,
    exp: u64,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Sign a token for `sub` expiring `exp_offset` seconds from now.
pub fn mint_token_for(sub: &str, exp_offset: i64) -> String {
    let exp = (now() as i64 + exp_offset).max(0) as u64;
    encode(
        &Header::default(),
        &Claims {
            sub: sub.to_string(),
            exp,
        },
        &EncodingKey::from_secret(b"mock-backend-secret"),
    )
    .expect("Failed to sign token")
}

pub fn mint_token(exp_offset: i64) -> String {
    mint_token_for("user-1", exp_offset)
}

/// How the mock answers `POST /auth/refresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// `{ "accessToken": ... }`
    FlatToken,
    /// `{ "data": { "accessToken": ... } }`
    EnvelopedToken,
    /// 200 with an empty body; the token arrives as a cookie
    CookieOnly,
    /// 200 `{ "success": true }` without rotating anything
    TokenlessJson,
    /// 401 `{ "message": "Refresh token expired" }`
    Reject,
    /// 200 with an HTML body
    Garbage,
    /// Never answers within the client timeout
    Stall,
    /// Flat token after a short delay, to let concurrent requests pile up
    Slow,
}

pub struct BackendState {
    pub refresh_mode: Mutex<RefreshMode>,
    /// Token `/cart` currently accepts
    pub valid_token: Mutex<String>,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub cart_calls: AtomicUsize,
    pub last_refresh_cookies: Mutex<Option<String>>,
    pub last_refresh_body: Mutex<Option<Value>>,
    pub last_xsrf_header: Mutex<Option<String>>,
}

impl BackendState {
    pub fn set_mode(&self, mode: RefreshMode) {
        *self.refresh_mode.lock().unwrap() = mode;
    }

    pub fn mode(&self) -> RefreshMode {
        *self.refresh_mode.lock().unwrap()
    }

    pub fn valid_token(&self) -> String {
        self.valid_token.lock().unwrap().clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn cart_calls(&self) -> usize {
        self.cart_calls.load(Ordering::SeqCst)
    }

    fn rotate(&self) -> String {
        let n = self.refresh_calls.load(Ordering::SeqCst);
        let token = mint_token_for(&format!("user-1-r{}", n), 600);
        *self.valid_token.lock().unwrap() = token.clone();
        token
    }
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<BackendState>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client config pointing at this backend with a short timeout.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.url())
            .expect("Invalid mock URL")
            .with_timeout(Duration::from_millis(500))
    }
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    addr
}

pub async fn start_mock_backend(mode: RefreshMode) -> MockBackend {
    let state = Arc::new(BackendState {
        refresh_mode: Mutex::new(mode),
        valid_token: Mutex::new(mint_token(600)),
        refresh_calls: AtomicUsize::new(0),
        logout_calls: AtomicUsize::new(0),
        cart_calls: AtomicUsize::new(0),
        last_refresh_cookies: Mutex::new(None),
        last_refresh_body: Mutex::new(None),
        last_xsrf_header: Mutex::new(None),
    });

    let router = Router::new()
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/csrf", get(csrf))
        .route("/auth/sent-otp", post(send_otp))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/cart", get(cart))
        .route("/broken", get(broken))
        .with_state(state.clone());

    let addr = serve(router).await;
    MockBackend { addr, state }
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": message }))).into_response()
}

fn refresh_cookie() -> String {
    format!(
        "refreshToken={}; HttpOnly; Path=/; Max-Age=604800",
        REFRESH_COOKIE_VALUE
    )
}

async fn refresh(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_refresh_cookies.lock().unwrap() = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *state.last_refresh_body.lock().unwrap() = Some(body.clone());

    let mode = state.mode();
    if mode == RefreshMode::Stall {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    if mode == RefreshMode::Slow {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let has_refresh = get_cookie(&headers, "refreshToken") == Some(REFRESH_COOKIE_VALUE)
        || body.get("refreshToken").and_then(Value::as_str) == Some(REFRESH_COOKIE_VALUE);

    match mode {
        RefreshMode::Reject => unauthorized("Refresh token expired"),
        _ if !has_refresh => unauthorized("No refresh token"),
        RefreshMode::FlatToken | RefreshMode::Slow | RefreshMode::Stall => {
            let token = state.rotate();
            (
                [(header::SET_COOKIE, refresh_cookie())],
                Json(json!({ "accessToken": token })),
            )
                .into_response()
        }
        RefreshMode::EnvelopedToken => {
            let token = state.rotate();
            Json(json!({ "data": { "accessToken": token } })).into_response()
        }
        RefreshMode::CookieOnly => {
            let token = state.rotate();
            (
                StatusCode::OK,
                [(
                    header::SET_COOKIE,
                    format!("accessToken={}; Path=/; Max-Age=3600", token),
                )],
            )
                .into_response()
        }
        RefreshMode::TokenlessJson => Json(json!({ "success": true })).into_response(),
        RefreshMode::Garbage => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html")],
            "<html>maintenance</html>",
        )
            .into_response(),
    }
}

async fn logout(State(state): State<Arc<BackendState>>) -> Response {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    (
        [(header::SET_COOKIE, "refreshToken=; Path=/; Max-Age=0")],
        Json(json!({ "success": true })),
    )
        .into_response()
}

async fn csrf() -> Response {
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, format!("XSRF-TOKEN={}; Path=/", XSRF_VALUE))],
    )
        .into_response()
}

async fn send_otp(Json(body): Json<Value>) -> Response {
    match body.get("phone").and_then(Value::as_str) {
        Some(_) => Json(json!({ "message": "OTP sent" })).into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Phone is required" })),
        )
            .into_response(),
    }
}

async fn verify_otp(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    if body.get("otp").and_then(Value::as_str) != Some(VALID_OTP) {
        return unauthorized("Invalid OTP");
    }

    let token = state.rotate();
    let phone = body.get("phone").cloned().unwrap_or(Value::Null);
    (
        [(header::SET_COOKIE, refresh_cookie())],
        Json(json!({
            "data": {
                "accessToken": token,
                "user": { "phone": phone }
            }
        })),
    )
        .into_response()
}

async fn cart(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.cart_calls.fetch_add(1, Ordering::SeqCst);

    let xsrf = headers
        .get("x-xsrf-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *state.last_xsrf_header.lock().unwrap() = xsrf;

    let valid = state.valid_token();
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let cookie = get_cookie(&headers, "accessToken");

    if bearer == Some(valid.as_str()) || cookie == Some(valid.as_str()) {
        Json(json!({ "items": [{ "sku": "phone-1", "quantity": 1 }] })).into_response()
    } else {
        unauthorized("Unauthorized")
    }
}

async fn broken() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Database down" })),
    )
        .into_response()
}

/// Page renderer stand-in: echoes what it was asked for.
pub async fn start_mock_upstream() -> SocketAddr {
    let router = Router::new().fallback(|uri: Uri, headers: HeaderMap| async move {
        let cookie = headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        (
            [("x-upstream-cookie", cookie)],
            format!("page:{}", uri),
        )
    });
    serve(router).await
}

/// A server the edge must never reach. Counts the requests it receives.
pub async fn start_foreign_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let router = Router::new().fallback(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            "foreign-host"
        }
    });
    (serve(router).await, hits)
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    listener.local_addr().expect("Failed to get local address")
}

fn edge_config(backend: &MockBackend, upstream: SocketAddr) -> ServerConfig {
    ServerConfig {
        api: backend.client_config(),
        upstream: Url::parse(&format!("http://{}", upstream)).expect("Invalid URL"),
        routes: RouteTable::default(),
    }
}

/// Edge router wired to a mock backend and upstream.
pub fn create_edge_app(backend: &MockBackend, upstream: SocketAddr) -> axum::Router {
    create_app(&edge_config(backend, upstream)).expect("Failed to build app")
}

/// Full edge server on a real socket, started through `run_server`.
pub async fn start_edge_server(backend: &MockBackend, upstream: SocketAddr) -> SocketAddr {
    let config = edge_config(backend, upstream);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local address");
    tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });
    addr
}

/// Observer that records every update.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    pub updates: Arc<Mutex<Vec<SessionUpdate>>>,
}

impl RecordingObserver {
    pub fn updates(&self) -> Vec<SessionUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_session_update(&self, update: SessionUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}
