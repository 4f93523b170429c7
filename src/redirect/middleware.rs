//! Admission middleware: identity resolution, blocklist, rate limiting
//!
//! Runs before every handler. Blocklisted clients get a fixed 403 and
//! rate-limited clients a fixed 429; neither produces an access-log entry.
//! Admitted requests carry their resolved identity in an extension so
//! handlers do not re-derive it.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use super::handlers::{AppState, BLOCKED_BODY, RATE_LIMITED_BODY};
use crate::client_ip::resolve_client_ip;
use crate::limiter::{Admission, RouteClass};

/// Resolved client identity, stashed in request extensions by [`admission`].
#[derive(Clone)]
pub struct ClientIdentity(pub String);

fn route_class(path: &str) -> RouteClass {
    match path {
        "/" => RouteClass::Home,
        "/sitemap.xml" | "/sitemap.txt" | "/robots.txt" | "/robots" | "/ads.txt" => {
            RouteClass::Static
        }
        _ => RouteClass::Redirect,
    }
}

pub async fn admission(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let identity = resolve_client_ip(request.headers(), addr);

    if state.guard.is_blocked(&identity) {
        return (StatusCode::FORBIDDEN, BLOCKED_BODY).into_response();
    }

    let class = route_class(request.uri().path());
    if state.limiter.check(&identity, class) == Admission::Limited {
        tracing::debug!(identity = %identity, ?class, "rate limited");
        return (StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_BODY).into_response();
    }

    request.extensions_mut().insert(ClientIdentity(identity));
    next.run(request).await
}
