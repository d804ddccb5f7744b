//! Client-side cookie jar holding the session credentials.
//!
//! The access token lives in the `accessToken` cookie. Everything else the
//! backend sets (HTTP-only refresh cookie, `XSRF-TOKEN`) is kept alongside it
//! and replayed on every API call, the way a browser sends credentials.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use reqwest::header::HeaderValue;
use tracing::{debug, warn};

use crate::cookie::{
    ACCESS_COOKIE_NAME, CookieAttributes, REFRESH_COOKIE_NAME, XSRF_COOKIE_NAME,
    format_set_cookie, parse_set_cookie,
};
use crate::jwt::{decode_claims, now_secs};

#[derive(Debug, Clone)]
struct StoredCookie {
    value: String,
    attrs: CookieAttributes,
    /// Absolute expiry (Unix seconds); `None` lives as long as the store
    expires_at: Option<u64>,
}

impl StoredCookie {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Thread-safe cookie jar for session credentials.
#[derive(Clone)]
pub struct TokenStore {
    cookies: Arc<RwLock<BTreeMap<String, StoredCookie>>>,
    secure: bool,
}

impl TokenStore {
    /// Create an empty store. `secure` marks the cookies it writes as
    /// `Secure`, which should only happen in production.
    pub fn new(secure: bool) -> Self {
        Self {
            cookies: Arc::new(RwLock::new(BTreeMap::new())),
            secure,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredCookie>> {
        self.cookies.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredCookie>> {
        self.cookies.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_session_cookie(&self, name: &str, value: &str) {
        let attrs = CookieAttributes::session(self.secure);
        let expires_at = attrs.max_age.map(|age| now_secs().saturating_add(age));
        self.write().insert(
            name.to_string(),
            StoredCookie {
                value: unquote(value),
                attrs,
                expires_at,
            },
        );
    }

    fn live_value(&self, name: &str) -> Option<String> {
        let now = now_secs();
        self.read()
            .get(name)
            .filter(|cookie| cookie.is_live(now))
            .map(|cookie| cookie.value.clone())
    }

    /// Persist the access token for 7 days.
    pub fn set(&self, token: &str) {
        self.store_session_cookie(ACCESS_COOKIE_NAME, token);
    }

    /// Current access token.
    ///
    /// A token whose `exp` claim has passed is dropped and `None` returned.
    /// Tokens that are not decodable JWTs are handed out unchanged.
    pub fn get(&self) -> Option<String> {
        let token = self.live_value(ACCESS_COOKIE_NAME)?;
        if token.is_empty() {
            return None;
        }

        match decode_claims(&token) {
            Ok(claims) if claims.is_expired_at(now_secs()) => {
                debug!("Stored access token has expired, dropping it");
                self.remove_access_token_if(&token);
                None
            }
            Ok(_) => Some(token),
            Err(e) => {
                debug!(error = %e, "Access token is not a decodable JWT");
                Some(token)
            }
        }
    }

    pub fn remove_access_token(&self) {
        self.write().remove(ACCESS_COOKIE_NAME);
    }

    /// Remove the access token only if it still holds `expected`, so a token
    /// stored concurrently by a refresh survives.
    fn remove_access_token_if(&self, expected: &str) -> bool {
        let mut cookies = self.write();
        if cookies
            .get(ACCESS_COOKIE_NAME)
            .is_some_and(|cookie| cookie.value == expected)
        {
            cookies.remove(ACCESS_COOKIE_NAME);
            true
        } else {
            false
        }
    }

    /// Persist an explicit refresh token (legacy backends).
    pub fn set_refresh_token(&self, token: &str) {
        self.store_session_cookie(REFRESH_COOKIE_NAME, token);
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.live_value(REFRESH_COOKIE_NAME)
            .filter(|token| !token.is_empty())
    }

    /// Anti-forgery value to mirror into the `X-XSRF-TOKEN` header.
    pub fn xsrf_token(&self) -> Option<String> {
        self.live_value(XSRF_COOKIE_NAME)
            .filter(|token| !token.is_empty())
    }

    /// Whether a live cookie with this name is held.
    pub fn contains(&self, name: &str) -> bool {
        self.live_value(name).is_some()
    }

    /// Drop every credential cookie. The anti-forgery cookie is not a
    /// credential and survives.
    pub fn clear(&self) {
        self.write().retain(|name, _| name == XSRF_COOKIE_NAME);
    }

    /// Ingest `Set-Cookie` headers from a backend response.
    pub fn absorb<'a, I>(&self, set_cookies: I)
    where
        I: IntoIterator<Item = &'a HeaderValue>,
    {
        let now = now_secs();
        let mut cookies = self.write();
        for header in set_cookies {
            let Some(parsed) = header.to_str().ok().and_then(parse_set_cookie) else {
                warn!("Ignoring unparseable Set-Cookie header");
                continue;
            };

            if parsed.is_removal(now) {
                debug!(cookie = %parsed.name, "Backend removed cookie");
                cookies.remove(&parsed.name);
                continue;
            }

            let expires_at = parsed.expires_at(now);
            debug!(cookie = %parsed.name, http_only = parsed.attrs.http_only, "Backend set cookie");
            cookies.insert(
                parsed.name,
                StoredCookie {
                    value: parsed.value,
                    attrs: parsed.attrs,
                    expires_at,
                },
            );
        }
    }

    /// Render the `Cookie` request header carrying every live cookie.
    pub fn cookie_header(&self) -> Option<String> {
        let now = now_secs();
        let header = self
            .read()
            .iter()
            .filter(|(_, cookie)| cookie.is_live(now))
            .map(|(name, cookie)| format!("{}={}", name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ");

        (!header.is_empty()).then_some(header)
    }

    /// Render a `Set-Cookie` header value for a stored cookie.
    pub fn set_cookie_header(&self, name: &str) -> Option<String> {
        self.read()
            .get(name)
            .map(|cookie| format_set_cookie(name, &cookie.value, &cookie.attrs))
    }
}

/// Tokens written by older clients were JSON-stringified (`"abc"`).
fn unquote(value: &str) -> String {
    if value.starts_with('"') {
        serde_json::from_str::<String>(value).unwrap_or_else(|_| value.trim_matches('"').to_string())
    } else {
        value.to_string()
    }
}
