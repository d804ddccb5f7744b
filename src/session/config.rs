//! API client configuration.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use url::Url;

use super::error::{ClientError, Result};

/// Environment variable holding the API host.
pub const API_BASE_URL_ENV: &str = "STOREFRONT_API_BASE_URL";

/// Default request timeout: 10 seconds
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the storefront sends users whose session cannot be recovered.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Auth endpoints, relative to the API base URL.
pub const REFRESH_ENDPOINT: &str = "/auth/refresh";
pub const LOGOUT_ENDPOINT: &str = "/auth/logout";
pub const CSRF_ENDPOINT: &str = "/auth/csrf";
pub const SEND_OTP_ENDPOINT: &str = "/auth/sent-otp";
pub const VERIFY_OTP_ENDPOINT: &str = "/auth/verify-otp";

/// How the backend wraps response payloads.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyShape {
    /// Accept `{ data: {...} }` and flat bodies alike
    #[default]
    Lenient,
    /// Require a `data` envelope
    Enveloped,
    /// Payload fields live at the top level
    Flat,
}

impl BodyShape {
    /// Locate the payload object inside a response body.
    pub fn payload<'a>(self, body: &'a Value) -> Result<&'a Value> {
        let envelope = body.get("data").filter(|data| data.is_object());
        match self {
            BodyShape::Enveloped => envelope.ok_or_else(|| {
                ClientError::InvalidResponse("expected a `data` envelope".to_string())
            }),
            BodyShape::Flat => Ok(body),
            BodyShape::Lenient => match envelope {
                Some(data) => Ok(data),
                None => {
                    debug!("Response body has no `data` envelope, reading it flat");
                    Ok(body)
                }
            },
        }
    }
}

/// Configuration for the storefront API client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API host, e.g. `https://api.example.com/v1`
    pub base_url: Url,
    /// Per-request timeout
    pub timeout: Duration,
    /// Whether to set the `Secure` flag on cookies the client writes (production)
    pub secure_cookies: bool,
    /// Redirect target handed back when the session is unrecoverable
    pub login_path: String,
    /// Expected response wrapping
    pub body_shape: BodyShape,
}

impl ClientConfig {
    /// Create a configuration for the given API base URL with defaults.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            ClientError::Configuration(format!("Invalid API base URL {:?}: {}", base_url, e))
        })?;

        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::Configuration(format!(
                "API base URL must be http(s): {}",
                base_url
            )));
        }

        Ok(Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
            secure_cookies: false,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            body_shape: BodyShape::default(),
        })
    }

    /// Read the API base URL from `STOREFRONT_API_BASE_URL`.
    /// Fails when the variable is missing or empty.
    pub fn from_env() -> Result<Self> {
        Self::from_env_value(std::env::var(API_BASE_URL_ENV).ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim) {
            Some(value) if !value.is_empty() => Self::new(value),
            _ => Err(ClientError::Configuration(format!(
                "Missing {}, set it to the API host",
                API_BASE_URL_ENV
            ))),
        }
    }

    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_body_shape(mut self, shape: BodyShape) -> Self {
        self.body_shape = shape;
        self
    }

    /// Full URL for an API path. Paths are appended to the base URL as-is,
    /// so a base of `https://host/v1` and `/cart` yields `https://host/v1/cart`.
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_joins_paths() {
        let config = ClientConfig::new("https://api.example.com/v1/").unwrap();
        assert_eq!(
            config.endpoint("/auth/refresh"),
            "https://api.example.com/v1/auth/refresh"
        );
        assert_eq!(config.endpoint("cart"), "https://api.example.com/v1/cart");

        let bare = ClientConfig::new("http://localhost:8080").unwrap();
        assert_eq!(bare.endpoint("/cart"), "http://localhost:8080/cart");
    }

    #[test]
    fn test_invalid_base_urls() {
        assert!(matches!(
            ClientConfig::new("not a url"),
            Err(ClientError::Configuration(_))
        ));
        assert!(matches!(
            ClientConfig::new("ftp://example.com"),
            Err(ClientError::Configuration(_))
        ));
    }

    #[test]
    fn test_env_base_url_required() {
        assert!(matches!(
            ClientConfig::from_env_value(None),
            Err(ClientError::Configuration(_))
        ));
        assert!(matches!(
            ClientConfig::from_env_value(Some("")),
            Err(ClientError::Configuration(_))
        ));
        assert!(matches!(
            ClientConfig::from_env_value(Some("   ")),
            Err(ClientError::Configuration(_))
        ));

        let config = ClientConfig::from_env_value(Some(" https://api.example.com ")).unwrap();
        assert_eq!(config.endpoint("/cart"), "https://api.example.com/cart");
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("https://api.example.com").unwrap();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.login_path, "/login");
        assert!(!config.secure_cookies);
        assert_eq!(config.body_shape, BodyShape::Lenient);
    }

    #[test]
    fn test_lenient_shape_accepts_both() {
        let nested = json!({ "data": { "accessToken": "a" } });
        let flat = json!({ "accessToken": "b" });

        let payload = BodyShape::Lenient.payload(&nested).unwrap();
        assert_eq!(payload["accessToken"], "a");
        let payload = BodyShape::Lenient.payload(&flat).unwrap();
        assert_eq!(payload["accessToken"], "b");
    }

    #[test]
    fn test_strict_shapes() {
        let nested = json!({ "data": { "accessToken": "a" } });
        let flat = json!({ "accessToken": "b" });

        assert!(BodyShape::Enveloped.payload(&nested).is_ok());
        assert!(BodyShape::Enveloped.payload(&flat).is_err());
        assert_eq!(BodyShape::Flat.payload(&nested).unwrap(), &nested);
    }
}
