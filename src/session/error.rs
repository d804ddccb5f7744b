//! Error types for the storefront API client

use reqwest::StatusCode;
use thiserror::Error;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    /// No response was received (connect failure, timeout, reset)
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend answered with a non-success status other than 401
    #[error("API error {status}: {}", .message.as_deref().unwrap_or("Unknown error"))]
    Api {
        status: StatusCode,
        message: Option<String>,
    },

    /// 401 that was not recovered, either because the request had already
    /// been retried or because it opted out of refreshing
    #[error("Not authenticated: {}", .message.as_deref().unwrap_or("Unauthorized"))]
    Unauthorized { message: Option<String> },

    /// The session could not be refreshed. Local credentials are gone and the
    /// caller should navigate to `redirect`.
    #[error("Session expired ({reason}), redirect to {redirect}")]
    SessionInvalid { redirect: String, reason: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Navigation target the caller must follow, if any.
    pub fn redirect(&self) -> Option<&str> {
        match self {
            ClientError::SessionInvalid { redirect, .. } => Some(redirect),
            _ => None,
        }
    }

    /// Message the backend attached to an error response.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            ClientError::Api { message, .. } | ClientError::Unauthorized { message } => {
                message.as_deref()
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
