mod error;
mod handler;
pub mod handlers;
pub mod session;
pub mod voice;
pub mod wire;

pub use error::GatewayError;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use reson8_core::AppState;
use serde_json::json;

pub fn gateway_router() -> Router<AppState> {
    Router::new()
        .route("/gateway", get(ws_upgrade))
        .route("/health", get(health))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_connection(socket, state))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "uptime": state.uptime_seconds(),
    }))
}
