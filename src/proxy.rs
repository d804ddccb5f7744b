//! Forwarding of allowed navigations to the page renderer.

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::error;
use url::Url;

use crate::auth::EdgeState;

/// Largest request body forwarded upstream: 2 MiB
pub const MAX_FORWARD_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Connection-scoped headers that must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// The upstream URL with the request's path and query. Scheme, host and port
/// always come from the configured upstream, whatever the path looks like.
fn upstream_target(upstream: &Url, path: &str, query: Option<&str>) -> Url {
    let mut target = upstream.clone();
    target.set_path(path);
    target.set_query(query);
    target
}

/// Fallback handler: replay the request against the upstream and relay its
/// answer. Redirects from the upstream are passed through untouched.
pub async fn forward(State(state): State<EdgeState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let target = upstream_target(&state.upstream, parts.uri.path(), parts.uri.query());

    let body = match to_bytes(body, MAX_FORWARD_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);

    let upstream = state
        .http
        .request(parts.method, target.clone())
        .headers(headers)
        .body(body)
        .send()
        .await;

    let upstream = match upstream {
        Ok(response) => response,
        Err(e) => {
            error!(target = %target, error = %e, "Upstream request failed");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::CONTENT_LENGTH);

    let bytes = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(target = %target, error = %e, "Failed to read upstream response");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
