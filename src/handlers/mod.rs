use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod notify;
pub mod send;
pub mod session;
pub mod subscribe;
pub mod validate;
pub mod webhook;

pub fn router(state: AppState) -> Router {
    // The kiosk frontend runs on another origin.
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/send/", post(send::send_photos))
        .route("/subscribe/", post(subscribe::subscribe_email))
        .route("/broadcast/", post(notify::broadcast_email))
        .route("/notify/", post(notify::general_notification))
        .route("/telegram/webhook/", post(webhook::telegram_webhook))
        .route("/telegram/session/", get(session::session_status))
        .route("/healthz", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message })))
}
