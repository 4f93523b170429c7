use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use std::sync::Arc;
use tracing::{error, warn};

use super::middleware::ClientIdentity;
use crate::access_log::AccessLogWriter;
use crate::config::TargetConfig;
use crate::guard::AbuseGuard;
use crate::limiter::RateLimiter;
use crate::models::{sentinel, AccessLogEntry};
use crate::storage::Storage;

/// Fixed body for rate-limited requests, kept verbatim from the original
/// deployment.
pub const RATE_LIMITED_BODY: &str = "ILGLR AMNS";
/// Fixed body for blocklisted and abusive requests.
pub const BLOCKED_BODY: &str = "blocked";
/// Crawlers are welcome.
pub const ROBOTS_BODY: &str = "User-agent: *\nAllow: /";

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub guard: Arc<AbuseGuard>,
    pub limiter: Arc<RateLimiter>,
    pub log_writer: Arc<AccessLogWriter>,
    pub targets: TargetConfig,
}

/// 302 Found with a Location header. axum's `Redirect` only offers 303/307/308
/// constructors; the wire behavior here has always been a plain 302.
fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => {
            error!(location = %location, "stored destination is not a valid header value");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

fn enqueue_log(state: &AppState, key: &str, identity: &str, headers: &HeaderMap) {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let referer = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    state
        .log_writer
        .record(AccessLogEntry::now(key, identity, user_agent, referer));
}

/// Directory lookup and redirect for `/{key}`.
pub async fn redirect_key(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Extension(ClientIdentity(identity)): Extension<ClientIdentity>,
    headers: HeaderMap,
) -> Response {
    // Scanner bait: block the caller for the rest of the process lifetime.
    if state.guard.is_forbidden_code(&key) {
        warn!(key = %key, identity = %identity, "forbidden suffix probe");
        state.guard.block(&identity);
        return (StatusCode::FORBIDDEN, BLOCKED_BODY).into_response();
    }

    match state.storage.get(&key).await {
        Ok(Some(url)) => {
            // Counter update is synchronous: the redirect must not outrun it.
            // A failed increment is tolerable, a failed redirect is not.
            match state.storage.increment_visits(&key).await {
                Ok(true) => {}
                Ok(false) => warn!(key = %key, "visit increment matched no row"),
                Err(e) => warn!(key = %key, error = %e, "failed to increment visit count"),
            }
            enqueue_log(&state, &key, &identity, &headers);
            found(&url.long_url)
        }
        Ok(None) => {
            enqueue_log(&state, &key, &identity, &headers);
            found(&state.targets.not_found_url)
        }
        Err(e) => {
            error!(key = %key, error = %e, "directory lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

pub async fn home(
    State(state): State<Arc<AppState>>,
    Extension(ClientIdentity(identity)): Extension<ClientIdentity>,
    headers: HeaderMap,
) -> Response {
    enqueue_log(&state, sentinel::HOME, &identity, &headers);
    found(&state.targets.home_url)
}

pub async fn sitemap_xml(
    State(state): State<Arc<AppState>>,
    Extension(ClientIdentity(identity)): Extension<ClientIdentity>,
    headers: HeaderMap,
) -> Response {
    enqueue_log(&state, sentinel::SITEMAP, &identity, &headers);
    found(&state.targets.sitemap_xml())
}

pub async fn sitemap_txt(
    State(state): State<Arc<AppState>>,
    Extension(ClientIdentity(identity)): Extension<ClientIdentity>,
    headers: HeaderMap,
) -> Response {
    enqueue_log(&state, sentinel::SITEMAP, &identity, &headers);
    found(&state.targets.sitemap_txt())
}

pub async fn robots_txt(
    State(state): State<Arc<AppState>>,
    Extension(ClientIdentity(identity)): Extension<ClientIdentity>,
    headers: HeaderMap,
) -> Response {
    enqueue_log(&state, sentinel::ROBOTS, &identity, &headers);
    (StatusCode::OK, ROBOTS_BODY).into_response()
}

pub async fn ads_txt(
    State(state): State<Arc<AppState>>,
    Extension(ClientIdentity(identity)): Extension<ClientIdentity>,
    headers: HeaderMap,
) -> Response {
    enqueue_log(&state, sentinel::ADS, &identity, &headers);
    found(&state.targets.ads_txt())
}
