//! HTTP gateway exposing the demo endpoints behind the rate limiter.

pub mod handlers;
pub mod jsonapi;
pub mod middleware;
mod server;

pub use server::GatewayServer;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::TollgateConfig;
use crate::ratelimit::RateLimiter;

/// State shared by every route.
#[derive(Clone)]
pub struct GatewayState {
    /// The limiter all routes are admitted through
    pub limiter: Arc<RateLimiter>,
    /// Service configuration
    pub config: Arc<TollgateConfig>,
}

impl GatewayState {
    /// Build state with a fresh limiter described by `config`.
    pub fn new(config: TollgateConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limiting.limiter_config()));
        Self::with_limiter(config, limiter)
    }

    /// Build state around an existing limiter.
    pub fn with_limiter(config: TollgateConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            config: Arc::new(config),
        }
    }
}

/// Build the application router.
///
/// The limiter wraps each route individually so that requests with an
/// unsupported method get `405` without consuming budget.
pub fn build_router(state: GatewayState) -> Router {
    let limited = axum_middleware::from_fn_with_state(state.clone(), middleware::rate_limit);

    Router::new()
        .route("/api1", get(handlers::api1).route_layer(limited.clone()))
        .route("/api2", post(handlers::api2).route_layer(limited.clone()))
        .route("/api3", post(handlers::api3).route_layer(limited))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
