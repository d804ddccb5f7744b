//! Cookie parsing and formatting shared by the edge and the API client.

use axum::http::{HeaderMap, header};

/// Cookie holding the access token. Readable by page scripts.
pub const ACCESS_COOKIE_NAME: &str = "accessToken";

/// Legacy cookie holding an explicit refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Anti-forgery cookie set by the CSRF handshake.
pub const XSRF_COOKIE_NAME: &str = "XSRF-TOKEN";

/// Header the anti-forgery cookie value is mirrored into.
pub const XSRF_HEADER_NAME: &str = "x-xsrf-token";

/// Session cookie lifetime: 7 days
pub const SESSION_COOKIE_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = cookie_header.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                if key.trim() == name {
                    return Some(value.trim());
                }
            }
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "strict" => Some(SameSite::Strict),
            "lax" => Some(SameSite::Lax),
            "none" => Some(SameSite::None),
            _ => None,
        }
    }
}

/// Attributes carried by a stored or emitted cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieAttributes {
    pub path: String,
    /// Lifetime in seconds; `None` is a browser-session cookie
    pub max_age: Option<u64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl CookieAttributes {
    /// Attributes for the session cookies the storefront itself writes:
    /// 7 days, whole site, `SameSite=Strict`, `Secure` only in production.
    pub fn session(secure: bool) -> Self {
        Self {
            path: "/".to_string(),
            max_age: Some(SESSION_COOKIE_MAX_AGE_SECS),
            secure,
            http_only: false,
            same_site: Some(SameSite::Strict),
        }
    }
}

impl Default for CookieAttributes {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }
}

/// Render a `Set-Cookie` header value.
pub fn format_set_cookie(name: &str, value: &str, attrs: &CookieAttributes) -> String {
    let mut cookie = format!("{}={}", name, value);
    if attrs.http_only {
        cookie.push_str("; HttpOnly");
    }
    if let Some(same_site) = attrs.same_site {
        cookie.push_str("; SameSite=");
        cookie.push_str(same_site.as_str());
    }
    cookie.push_str("; Path=");
    cookie.push_str(&attrs.path);
    if let Some(max_age) = attrs.max_age {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    if attrs.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Render a `Set-Cookie` header value that deletes the cookie.
pub fn format_clear_cookie(name: &str, secure: bool) -> String {
    let attrs = CookieAttributes {
        max_age: Some(0),
        ..CookieAttributes::session(secure)
    };
    format_set_cookie(name, "", &attrs)
}

/// A cookie parsed from a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub attrs: CookieAttributes,
    /// Absolute expiry from the `Expires` attribute (Unix seconds)
    pub expires: Option<u64>,
}

impl SetCookie {
    /// Absolute expiry, `Max-Age` taking precedence over `Expires`.
    pub fn expires_at(&self, now: u64) -> Option<u64> {
        match self.attrs.max_age {
            Some(max_age) => Some(now.saturating_add(max_age)),
            None => self.expires,
        }
    }

    /// Whether this header asks the client to delete the cookie.
    pub fn is_removal(&self, now: u64) -> bool {
        matches!(self.expires_at(now), Some(at) if at <= now)
    }
}

/// Parse a single `Set-Cookie` header value.
/// Unknown attributes are ignored; a negative `Max-Age` counts as zero.
pub fn parse_set_cookie(header_value: &str) -> Option<SetCookie> {
    let mut parts = header_value.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut attrs = CookieAttributes::default();
    let mut expires = None;

    for attr in parts {
        let attr = attr.trim();
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (attr, ""),
        };
        match key.to_ascii_lowercase().as_str() {
            "path" => attrs.path = val.to_string(),
            "max-age" => {
                attrs.max_age = val
                    .parse::<i64>()
                    .ok()
                    .map(|secs| u64::try_from(secs).unwrap_or(0));
            }
            "expires" => expires = parse_http_date(val),
            "secure" => attrs.secure = true,
            "httponly" => attrs.http_only = true,
            "samesite" => attrs.same_site = SameSite::parse(val),
            _ => {}
        }
    }

    Some(SetCookie {
        name: name.to_string(),
        value: value.trim().trim_matches('"').to_string(),
        attrs,
        expires,
    })
}

/// Latest year accepted in an `Expires` attribute.
const MAX_COOKIE_YEAR: u64 = 9999;

/// Parse an IMF-fixdate (`Thu, 01 Jan 1970 00:00:00 GMT`) into Unix seconds.
fn parse_http_date(value: &str) -> Option<u64> {
    let (_weekday, rest) = value.split_once(',')?;
    let mut fields = rest.split_whitespace();
    let day: u64 = fields.next()?.parse().ok()?;
    let month = match fields.next()? {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    };
    let year: u64 = fields.next()?.parse().ok()?;
    let mut clock = fields.next()?.split(':');
    let hour: u64 = clock.next()?.parse().ok()?;
    let minute: u64 = clock.next()?.parse().ok()?;
    let second: u64 = clock.next()?.parse().ok()?;
    if !(1970..=MAX_COOKIE_YEAR).contains(&year)
        || day == 0
        || day > 31
        || hour > 23
        || minute > 59
        || second > 60
    {
        return None;
    }

    days_since_epoch(year, month, day)
        .checked_mul(86_400)?
        .checked_add(hour * 3_600 + minute * 60 + second)
}

/// Days from 1970-01-01 to the given civil date (proleptic Gregorian).
fn days_since_epoch(year: u64, month: u64, day: u64) -> u64 {
    let (y, m) = if month <= 2 {
        (year - 1, month + 9)
    } else {
        (year, month - 3)
    };
    let era = y / 400;
    let yoe = y - era * 400;
    let doy = (153 * m + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}
