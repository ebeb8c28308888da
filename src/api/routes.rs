//! HTTP API route definitions.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Markets
        .route("/markets/:id", get(handlers::get_market))
        .route("/markets/:id/odds", get(handlers::get_odds))
        .route("/markets/:id/history", get(handlers::odds_history))
        .route(
            "/markets/:id/bets",
            get(handlers::market_bets).post(handlers::place_bet),
        )
        .route("/markets/:id/settle", post(handlers::settle))
        .route("/markets/:id/refund", post(handlers::refund))
        // Users
        .route("/users", post(handlers::create_user))
        .route("/users/:id", get(handlers::get_user))
        .route("/users/:id/bets", get(handlers::user_bets))
        .route("/users/:id/deposit", post(handlers::deposit))
        // Sandboxes
        .route(
            "/sandboxes",
            get(handlers::list_sandboxes).post(handlers::create_sandbox),
        )
        .route("/sandboxes/:id", get(handlers::get_sandbox))
        .route("/sandboxes/:id/activate", post(handlers::activate_sandbox))
        .route("/sandboxes/:id/pause", post(handlers::pause_sandbox))
        .route("/sandboxes/:id/resume", post(handlers::resume_sandbox))
        .route("/sandboxes/:id/stop", post(handlers::stop_sandbox))
        .route("/sandboxes/:id/progress", post(handlers::update_progress))
        .route("/sandboxes/:id/complete", post(handlers::complete_sandbox))
        // Challenges
        .route("/challenges", post(handlers::create_challenge))
        .route("/challenges/:id", get(handlers::get_challenge))
        .route_layer(middleware::from_fn(handlers::track_latency));

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::render_metrics))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
