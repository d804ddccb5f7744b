//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::RouteTable;
use crate::session::{API_BASE_URL_ENV, BodyShape, ClientConfig};
use clap::Parser;
use tracing::{error, info};
use url::Url;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "storefront",
    about = "Storefront edge server with session guard and silent re-auth"
)]
pub struct Args {
    /// Backend API host, e.g. "https://api.example.com/v1"
    #[arg(long, env = API_BASE_URL_ENV)]
    pub api_base_url: String,

    /// Page renderer that serves allowed navigations
    #[arg(long, env = "STOREFRONT_UPSTREAM")]
    pub upstream: String,

    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    /// Production mode: cookies written by the edge carry the Secure flag
    #[arg(long)]
    pub production: bool,

    /// Paths that require a session (replaces the default set)
    #[arg(long = "protected", value_parser = validate_route_path, value_delimiter = ',')]
    pub protected: Vec<String>,

    /// Paths only anonymous users may see (replaces the default set)
    #[arg(long = "auth-only", value_parser = validate_route_path, value_delimiter = ',')]
    pub auth_only: Vec<String>,

    /// How the backend wraps response payloads
    #[arg(long, default_value = "lenient")]
    pub body_shape: BodyShape,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_route_path(s: &str) -> Result<String, String> {
    if !s.starts_with('/') {
        return Err(format!("Route path must start with '/': {}", s));
    }

    if s.len() > 1 && s.ends_with('/') {
        return Err(format!("Route path must not end with '/': {}", s));
    }

    if s.chars().any(|c| !c.is_ascii() || c.is_whitespace()) {
        return Err(format!("Route path contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Parse and validate the upstream URL.
/// Returns None and logs an error if validation fails.
pub fn validate_upstream(upstream: &str) -> Option<Url> {
    let url = match Url::parse(upstream) {
        Ok(url) => url,
        Err(e) => {
            error!(upstream = %upstream, error = %e, "Invalid upstream URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        error!(upstream = %upstream, "Upstream must be an http(s) URL");
        return None;
    }

    Some(url)
}

/// Build ServerConfig from arguments.
/// Returns None and logs an error if any part is invalid.
pub fn build_config(args: &Args) -> Option<ServerConfig> {
    let api = match ClientConfig::new(args.api_base_url.trim()) {
        Ok(api) => api
            .with_secure_cookies(args.production)
            .with_body_shape(args.body_shape),
        Err(e) => {
            error!(error = %e, "Invalid API configuration");
            return None;
        }
    };

    let upstream = validate_upstream(&args.upstream)?;

    let mut routes = RouteTable::default();
    if !args.protected.is_empty() {
        routes.protected = args.protected.clone();
    }
    if !args.auth_only.is_empty() {
        routes.auth_only = args.auth_only.clone();
    }

    info!(
        api = %api.base_url,
        upstream = %upstream,
        production = args.production,
        protected = routes.protected.len(),
        "Configuration loaded"
    );

    Some(ServerConfig {
        api,
        upstream,
        routes,
    })
}
