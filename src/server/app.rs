//! Axum application setup
//!
//! Creates and configures the webhook receiver with routes and middleware.

use crate::{config::Settings, pool::ConnectionPoolManager, replay::ReplayProtectionManager};
use axum::{
    Router,
    routing::{get, post},
};
use std::{sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Nonce store guarding the webhook endpoint
    pub replay: Arc<ReplayProtectionManager>,
    /// Process-wide connection pool, reported by the health endpoint
    pub pool: Arc<ConnectionPoolManager>,
    /// Application settings
    pub settings: Arc<Settings>,
    /// Server start time for uptime calculation
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Build state from settings. The nonce sweep is not started here.
    pub fn new(settings: Settings) -> Self {
        Self {
            replay: Arc::new(ReplayProtectionManager::new(settings.replay.clone())),
            pool: Arc::new(ConnectionPoolManager::new(settings.pool.clone())),
            settings: Arc::new(settings),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Create the Axum application with routes and middleware
pub fn create_app(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.settings.server.timeout_secs.max(1));

    Router::new()
        .route("/webhook", post(super::handlers::receive_webhook))
        .route("/ping", get(super::handlers::ping))
        .route("/health", get(super::handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}
