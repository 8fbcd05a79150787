// Library exports for binary tools and tests
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;

use services::{auth::TenantAuthorizer, pager::CursorPager};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub authorizer: Arc<TenantAuthorizer>,
    pub pager: CursorPager,
}

/// All API routes. Cross-cutting layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Auth
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh_token))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/change-password", post(routes::auth::change_password))
        .route("/auth/revoke-sessions", post(routes::auth::revoke_sessions))
        // Company catalog
        .route(
            "/companies/{id}/products",
            get(routes::products::list_products).post(routes::products::create_product),
        )
        .route(
            "/companies/{id}/products/{product_id}",
            put(routes::products::update_product).delete(routes::products::delete_product),
        )
        .route(
            "/companies/{id}/discounts",
            get(routes::discounts::list_discounts).post(routes::discounts::create_discount),
        )
        .route(
            "/companies/{id}/discounts/{discount_id}",
            put(routes::discounts::update_discount).delete(routes::discounts::delete_discount),
        )
        // Public
        .route("/feed/discounts", get(routes::discounts::discount_feed))
        .with_state(state)
}
