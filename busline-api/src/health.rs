use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let redis = match &state.redis {
        Some(redis) => match redis.ping().await {
            Ok(()) => "up",
            Err(e) => {
                tracing::warn!("Redis health check failed: {}", e);
                "down"
            }
        },
        None => "disabled",
    };

    Json(json!({ "status": "ok", "redis": redis }))
}
