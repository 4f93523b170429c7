use axum::{middleware, routing::get, Router};
use std::sync::Arc;

use super::handlers::{
    ads_txt, home, redirect_key, robots_txt, sitemap_txt, sitemap_xml, AppState,
};
use super::middleware::admission;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Static routes are matched before the `/{key}` capture.
    Router::new()
        .route("/", get(home))
        .route("/sitemap.xml", get(sitemap_xml))
        .route("/sitemap.txt", get(sitemap_txt))
        .route("/robots.txt", get(robots_txt))
        .route("/robots", get(robots_txt))
        .route("/ads.txt", get(ads_txt))
        .route("/{key}", get(redirect_key))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            admission,
        ))
        .with_state(state)
}
