//! Axum middleware running the navigation guard.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use super::guard::{GuardDecision, evaluate, query_param};
use super::state::EdgeState;
use crate::cookie::{ACCESS_COOKIE_NAME, get_cookie};
use crate::jwt::now_secs;

/// Redirect navigations according to the session cookie and route table.
pub async fn route_guard(State(state): State<EdgeState>, request: Request, next: Next) -> Response {
    let decision = {
        let path = request.uri().path();
        if state.routes.bypasses(path) {
            GuardDecision::Allow
        } else {
            let token = get_cookie(request.headers(), ACCESS_COOKIE_NAME);
            let referer = query_param(request.uri().query(), "referer");
            let decision = evaluate(&state.routes, token, path, referer.as_deref(), now_secs());
            if let GuardDecision::Redirect(target) = &decision {
                debug!(path = %path, target = %target, "Redirecting navigation");
            }
            decision
        }
    };

    match decision {
        GuardDecision::Allow => next.run(request).await,
        GuardDecision::Redirect(target) => Redirect::temporary(&target).into_response(),
    }
}
