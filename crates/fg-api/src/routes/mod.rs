//! API route definitions and router builder.

pub mod commands;
pub mod devices;
pub mod health;
pub mod shadows;

use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Successful response body: `{"message": .., "data": ..}`.
pub fn envelope(message: &str, data: Value) -> Json<Value> {
    Json(json!({
        "message": message,
        "data": data,
    }))
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let device = Router::new()
        .route(
            "/generate/certificate/{device_id}",
            post(devices::generate_certificate),
        )
        .route("/shadow/{device_id}", get(shadows::get_shadow))
        .route("/shadow/update/{device_id}", put(shadows::update_shadow))
        .route("/control/door", post(commands::control_door))
        .route("/control/camera", post(commands::control_camera));

    Router::new()
        .route("/health", get(health::health))
        .nest("/device", device)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}
