use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::require_auth;
use super::handlers;
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // Public routes
    let public = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::render))
        // Orders
        .route(
            "/api/orders",
            get(handlers::orders::list).post(handlers::orders::create),
        )
        .route("/api/orders/:hash", get(handlers::orders::detail))
        .route("/api/orders/:hash/check", post(handlers::orders::check))
        // Pricing
        .route("/api/pricing", get(handlers::pricing::quote));

    // Privileged operator routes — require Bearer token when API_TOKEN is set
    let privileged = Router::new()
        .route(
            "/api/orders/:hash/mark-paid",
            post(handlers::orders::mark_paid),
        )
        .route(
            "/api/orders/:hash/mark-failed",
            post(handlers::orders::mark_failed),
        )
        .layer(middleware::from_fn(require_auth));

    // CORS: the frontend is served from another origin in dev
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    public
        .merge(privileged)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
