//! Redirect integration tests
//!
//! Exercises the full router: directory lookups, the not-found fallback,
//! static routes with sentinel log keys, and lossless visit counting under
//! concurrent redirects.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use catlink::access_log::AccessLogWriter;
use catlink::config::TargetConfig;
use catlink::guard::AbuseGuard;
use catlink::limiter::{RateLimiter, RateLimits, RateQuota};
use catlink::redirect::{create_router, AppState};
use catlink::storage::{SqliteStorage, Storage};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::{Layer, ServiceExt};

const HOME_URL: &str = "https://short.example.org";
const NOT_FOUND_URL: &str = "https://short.example.org/404.html";

/// Generous limits so rate limiting never interferes with these tests
fn open_limits() -> RateLimits {
    RateLimits {
        redirect: vec![RateQuota::per_minute(10_000)],
        home: vec![RateQuota::per_minute(10_000)],
        r#static: vec![RateQuota::per_minute(10_000)],
    }
}

async fn create_test_app(limits: RateLimits) -> (Router, Arc<dyn Storage>) {
    let storage: Arc<dyn Storage> = {
        let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
        storage.init().await.unwrap();
        Arc::new(storage)
    };

    let state = Arc::new(AppState {
        storage: Arc::clone(&storage),
        guard: Arc::new(AbuseGuard::new()),
        limiter: Arc::new(RateLimiter::new(limits)),
        log_writer: Arc::new(AccessLogWriter::new(Arc::clone(&storage), 1024)),
        targets: TargetConfig {
            home_url: HOME_URL.to_string(),
            not_found_url: NOT_FOUND_URL.to_string(),
        },
    });

    (create_router(state).layer(TestConnectInfoLayer), storage)
}

/// Helper layer to inject ConnectInfo for tests
#[derive(Clone)]
struct TestConnectInfoLayer;

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware { inner }
    }
}

#[derive(Clone)]
struct TestConnectInfoMiddleware<S> {
    inner: S,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let addr = SocketAddr::from(([127, 0, 0, 1], 12345));
        req.extensions_mut()
            .insert(axum::extract::connect_info::ConnectInfo(addr));
        self.inner.call(req)
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::USER_AGENT, "integration-test")
        .body(Body::empty())
        .unwrap()
}

fn location(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("response should carry a Location header")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_redirect_known_key() {
    let (app, storage) = create_test_app(open_limits()).await;

    storage
        .create("abc123", "https://example.com/page")
        .await
        .unwrap();

    let response = app.oneshot(get("/abc123")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "https://example.com/page");

    // Counter update is synchronous with the response
    let url = storage.get("abc123").await.unwrap().unwrap();
    assert_eq!(url.visit_count, 1);

    // Log write is async; give the writer task a moment
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    let logs = storage.logs_for_key("abc123").await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].user_agent, "integration-test");
}

#[tokio::test]
async fn test_redirect_unknown_key_falls_back() {
    let (app, storage) = create_test_app(open_limits()).await;

    let response = app.oneshot(get("/nope404xyz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), NOT_FOUND_URL);

    // Misses are logged with the raw requested key
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    let logs = storage.logs_for_key("nope404xyz").await.unwrap();
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn test_concurrent_redirects_lose_no_increments() {
    let (app, storage) = create_test_app(open_limits()).await;

    storage
        .create("popular", "https://example.com")
        .await
        .unwrap();

    let mut handles = vec![];
    for _ in 0..50 {
        let app_clone = app.clone();
        handles.push(tokio::spawn(async move {
            app_clone.oneshot(get("/popular")).await
        }));
    }

    let mut success_count = 0;
    for handle in handles {
        if let Ok(Ok(response)) = handle.await {
            if response.status() == StatusCode::FOUND {
                success_count += 1;
            }
        }
    }
    assert_eq!(success_count, 50, "All 50 redirects should succeed");

    let url = storage.get("popular").await.unwrap().unwrap();
    assert_eq!(url.visit_count, 50, "No increment may be lost");
}

#[tokio::test]
async fn test_home_redirects_and_logs_sentinel() {
    let (app, storage) = create_test_app(open_limits()).await;

    let response = app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), HOME_URL);

    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    let logs = storage.logs_for_key("home").await.unwrap();
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn test_sitemap_and_ads_targets() {
    let (app, storage) = create_test_app(open_limits()).await;

    let cases = [
        ("/sitemap.xml", "https://short.example.org/sitemap.xml", "sitemap"),
        ("/sitemap.txt", "https://short.example.org/sitemap.txt", "sitemap"),
        ("/ads.txt", "https://short.example.org/ads.txt", "ads"),
    ];

    for (path, target, _) in &cases {
        let response = app.clone().oneshot(get(path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND, "{path}");
        assert_eq!(location(&response), *target, "{path}");
    }

    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    let sitemap_logs = storage.logs_for_key("sitemap").await.unwrap();
    assert_eq!(sitemap_logs.len(), 2);
    let ads_logs = storage.logs_for_key("ads").await.unwrap();
    assert_eq!(ads_logs.len(), 1);
}

#[tokio::test]
async fn test_robots_body_is_stable() {
    let (app, storage) = create_test_app(open_limits()).await;

    let mut bodies = vec![];
    for path in ["/robots.txt", "/robots", "/robots.txt"] {
        let response = app.clone().oneshot(get(path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        bodies.push(bytes);
    }

    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[0], bodies[2]);
    assert_eq!(&bodies[0][..], b"User-agent: *\nAllow: /");

    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    let logs = storage.logs_for_key("robots").await.unwrap();
    assert_eq!(logs.len(), 3);
}

#[tokio::test]
async fn test_referer_recorded_when_present() {
    let (app, storage) = create_test_app(open_limits()).await;

    let request = Request::builder()
        .uri("/with-referer")
        .header(header::USER_AGENT, "integration-test")
        .header(header::REFERER, "https://news.example.com/post")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    let logs = storage.logs_for_key("with-referer").await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(
        logs[0].referer.as_deref(),
        Some("https://news.example.com/post")
    );
}
