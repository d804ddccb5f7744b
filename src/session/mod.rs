//! Client side of the storefront session.
//!
//! The [`ApiClient`] pipeline attaches credentials from the [`TokenStore`],
//! recovers from 401s through a single-flight refresh and reports session
//! transitions to a [`SessionObserver`] supplied by the application.

mod auth_api;
mod client;
mod config;
mod error;
mod refresh;
mod state;
mod token_store;

pub use auth_api::LoginResponse;
pub use client::{ApiClient, ApiRequest, ApiResponse, RefreshOutcome};
pub use config::{
    API_BASE_URL_ENV, BodyShape, CSRF_ENDPOINT, ClientConfig, DEFAULT_LOGIN_PATH, DEFAULT_TIMEOUT,
    LOGOUT_ENDPOINT, REFRESH_ENDPOINT, SEND_OTP_ENDPOINT, VERIFY_OTP_ENDPOINT,
};
pub use error::{ClientError, Result};
pub use refresh::{RefreshedSession, error_message, request_logout, request_refresh};
pub use state::{NoopObserver, SessionObserver, SessionState, SessionUpdate, SharedSession};
pub use token_store::TokenStore;
