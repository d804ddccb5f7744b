//! Navigation guard decisions.
//!
//! [`evaluate`] is pure: it looks at the session cookie, the requested path
//! and the route table, and decides whether the navigation proceeds or is
//! redirected. The axum middleware in `middleware.rs` feeds it requests.

use tracing::debug;
use url::form_urlencoded;

use crate::jwt::decode_claims;

/// Route classification used by the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    /// Paths that require a session
    pub protected: Vec<String>,
    /// Paths only anonymous users should see (login, signup)
    pub auth_only: Vec<String>,
    pub login_path: String,
    /// Page that silently refreshes an expired session
    pub reauth_path: String,
    pub home_path: String,
    /// Path prefixes the guard never inspects (API routes, static files)
    pub bypass_prefixes: Vec<String>,
}

impl Default for RouteTable {
    fn default() -> Self {
        fn paths(list: &[&str]) -> Vec<String> {
            list.iter().map(|p| p.to_string()).collect()
        }

        Self {
            protected: paths(&[
                "/cart",
                "/checkout",
                "/profile",
                "/profile/orders",
                "/profile/returns",
                "/wishlist",
                "/order-success",
            ]),
            auth_only: paths(&["/login", "/signup"]),
            login_path: "/login".to_string(),
            reauth_path: "/re-auth".to_string(),
            home_path: "/".to_string(),
            bypass_prefixes: paths(&["/api", "/_next/static", "/_next/image", "/favicon.ico"]),
        }
    }
}

impl RouteTable {
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected.iter().any(|p| p == path)
    }

    pub fn is_auth_only(&self, path: &str) -> bool {
        self.auth_only.iter().any(|p| p == path)
    }

    /// Whether the guard skips this path entirely.
    pub fn bypasses(&self, path: &str) -> bool {
        self.bypass_prefixes.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    /// A referer we are willing to redirect to: a same-site absolute path.
    /// Anything else (missing, `//host`, `https://...`) becomes the home path.
    pub fn safe_referer(&self, referer: Option<&str>) -> String {
        match referer {
            Some(r) if r.starts_with('/') && !r.starts_with("//") && !r.contains('\\') => {
                r.to_string()
            }
            _ => self.home_path.clone(),
        }
    }
}

/// What the guard wants done with a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(String),
}

/// Append `?referer=<path>` to `target`. Slashes stay readable.
pub fn with_referer(target: &str, referer: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(referer.as_bytes()).collect();
    format!("{}?referer={}", target, encoded.replace("%2F", "/"))
}

/// Read a single query parameter.
pub fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Decide what happens to a navigation.
///
/// * `token` - value of the access-token cookie, if any
/// * `path` - requested path, without query
/// * `referer` - the `referer` query parameter of the request
/// * `now` - current Unix time in seconds
pub fn evaluate(
    routes: &RouteTable,
    token: Option<&str>,
    path: &str,
    referer: Option<&str>,
    now: u64,
) -> GuardDecision {
    // An undecodable token counts as no token at all
    let claims = token
        .map(|t| t.trim_matches('"'))
        .filter(|t| !t.is_empty())
        .and_then(|t| match decode_claims(t) {
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!(error = %e, "Ignoring undecodable session cookie");
                None
            }
        });

    if let Some(claims) = &claims {
        if claims.is_expired_at(now) && path != routes.reauth_path {
            return GuardDecision::Redirect(with_referer(&routes.reauth_path, path));
        }
    }

    let has_session = claims.is_some();

    if routes.is_protected(path) && !has_session {
        return GuardDecision::Redirect(with_referer(&routes.login_path, path));
    }

    if routes.is_auth_only(path) && has_session {
        return GuardDecision::Redirect(routes.safe_referer(referer));
    }

    GuardDecision::Allow
}
