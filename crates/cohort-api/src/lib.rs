//! REST surface of the CohortHub data access layer.
//!
//! Every successful insert or read-flag change is also published on the
//! realtime dispatcher so gateway subscribers see it without polling.

pub mod auth;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod partnerships;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post},
};

use crate::auth::AppState;
use crate::middleware::{require_auth, require_service_key};

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/conversations/{key}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read", post(notifications::bulk_read))
        .route("/notifications/{id}", patch(notifications::update_read))
        .route("/partnership", get(partnerships::get_partnership))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    let service_routes = Router::new()
        .route("/internal/notifications", post(notifications::create_notification))
        .route("/internal/partnerships", post(partnerships::create_partnership))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_service_key));

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
        .merge(service_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
