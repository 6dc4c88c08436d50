//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Programs
        .route(
            "/programs",
            get(handlers::list_programs).post(handlers::create_program),
        )
        .route("/programs/:id/checkpoints", get(handlers::list_checkpoints))
        .route(
            "/programs/:id/checkpoints/status",
            get(handlers::checkpoint_status),
        )
        // Checkpoints
        .route(
            "/programs/:id/checkpoints/:number/can-trigger",
            get(handlers::can_trigger),
        )
        .route(
            "/programs/:id/checkpoints/:number/trigger",
            post(handlers::trigger_checkpoint),
        )
        .route(
            "/programs/:id/checkpoints/:number/acknowledge",
            post(handlers::acknowledge_checkpoint),
        )
        .route(
            "/programs/:id/checkpoints/:number/notes",
            put(handlers::update_notes),
        )
        // Directory
        .route("/sponsors", post(handlers::register_sponsor))
        .route(
            "/sponsors/:id/notifications",
            get(handlers::sponsor_notifications),
        )
        .route("/users", post(handlers::register_user))
        .route("/notifications", get(handlers::admin_notifications))
        // Realtime
        .route("/users/:id/events", get(handlers::stream_user_events));

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
