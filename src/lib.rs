pub mod auth;
pub mod cli;
pub mod cookie;
pub mod jwt;
pub mod proxy;
pub mod session;

use auth::{EdgeState, RouteTable, reauth_handler, route_guard};
use axum::{Router, middleware, routing::get};
use session::ClientConfig;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use url::Url;

pub struct ServerConfig {
    /// Backend API settings
    pub api: ClientConfig,
    /// Page renderer that serves allowed navigations
    pub upstream: Url,
    /// Protected and auth-only route sets
    pub routes: RouteTable,
}

/// Create the edge router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Result<Router, reqwest::Error> {
    let state = EdgeState::new(
        config.api.clone(),
        config.routes.clone(),
        config.upstream.clone(),
    )?;

    let reauth_path = state.routes.reauth_path.clone();

    // The guard wraps the re-auth page as well as forwarded navigations
    let router = Router::new()
        .route(&reauth_path, get(reauth_handler))
        .fallback(proxy::forward)
        .layer(middleware::from_fn_with_state(state.clone(), route_guard))
        .with_state(state);

    Ok(router)
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config).map_err(std::io::Error::other)?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
