use axum::{
    Json, Router,
    http::{StatusCode, Uri},
    routing::get,
};
use tower_http::services::ServeDir;

use crate::{
    response::{ApiResponse, Meta},
    state::AppState,
    storage::PUBLIC_PREFIX,
};

pub mod admin;
pub mod auth;
pub mod bookings;
pub mod doc;
pub mod health;
pub mod me;
pub mod params;
pub mod rooms;
pub mod settings;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/rooms", rooms::router())
        .nest("/bookings", bookings::router())
        .nest("/me", me::router())
        .nest("/settings", settings::router())
        .nest("/admin", admin::router())
}

/// Every route of the service with state bound. Middleware layers are added by the caller.
pub fn create_app(state: AppState) -> Router {
    let images = ServeDir::new(state.images.root());
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness))
        .nest("/api", create_api_router())
        .nest_service(PUBLIC_PREFIX, images)
        .merge(doc::scalar_docs())
        .fallback(not_found)
        .with_state(state)
}

async fn not_found(uri: Uri) -> (StatusCode, Json<ApiResponse<serde_json::Value>>) {
    let body = ApiResponse::success(
        "Not Found",
        serde_json::json!({ "path": uri.path() }),
        Some(Meta::empty()),
    );
    (StatusCode::NOT_FOUND, Json(body))
}
