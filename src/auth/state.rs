//! Shared state for the edge routes.

use std::sync::Arc;

use url::Url;

use super::guard::RouteTable;
use crate::session::ClientConfig;

/// State handed to the guard middleware, the re-auth page and the forwarder.
#[derive(Clone)]
pub struct EdgeState {
    /// Backend API settings (base URL, body shape, cookie security)
    pub api: Arc<ClientConfig>,
    /// Outbound client; never follows redirects so they reach the browser
    pub http: reqwest::Client,
    pub routes: Arc<RouteTable>,
    /// Page renderer that serves allowed navigations
    pub upstream: Arc<Url>,
}

impl EdgeState {
    pub fn new(api: ClientConfig, routes: RouteTable, upstream: Url) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(api.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            api: Arc::new(api),
            http,
            routes: Arc::new(routes),
            upstream: Arc::new(upstream),
        })
    }

    pub fn secure_cookies(&self) -> bool {
        self.api.secure_cookies
    }
}
