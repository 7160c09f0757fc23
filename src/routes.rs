// src/routes.rs

use crate::{state::AppState, websocket::websocket_handler};
use axum::{extract::State, http::Method, routing::get, Json, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Build the application router: the WebSocket endpoint plus a read-only presence endpoint.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(state.allowed_origins.iter().cloned()))
        .allow_methods([Method::GET]);

    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/online-users", get(online_users))
        .layer(cors)
        .with_state(state)
}

/// GET /api/online-users — the same list the `getOnlineUsers` broadcast carries.
async fn online_users(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.presence.snapshot().await)
}
