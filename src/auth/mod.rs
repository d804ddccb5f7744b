//! Edge authentication for page navigations.
//!
//! Every navigation passes the route guard before it reaches the page
//! renderer. Expired sessions are sent through the re-auth page, which
//! refreshes them against the backend using the browser's own cookies.

mod guard;
mod middleware;
mod reauth;
mod state;

pub use guard::{GuardDecision, RouteTable, evaluate, query_param, with_referer};
pub use middleware::route_guard;
pub use reauth::{
    LOGIN_REDIRECT_DELAY_SECS, ReAuthFailed, ReAuthQuery, SESSION_EXPIRED_MESSAGE, reauth_handler,
};
pub use state::EdgeState;
