use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use tracing::error;

use crate::handlers::error_response;
use crate::state::AppState;

/// POST /subscribe/ — upsert by mail address; answers with the stored
/// record.
pub async fn subscribe_email(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let email = payload
        .get("email")
        .and_then(Value::as_str)
        .map(|value| value.trim().to_lowercase())
        .filter(|value| value.contains('@'));
    let Some(email) = email else {
        return error_response(StatusCode::BAD_REQUEST, "Valid email is required");
    };

    // Chat ids arrive as strings or raw numbers depending on the caller.
    let telegram_chat_id = match payload.get("telegram_chat_id") {
        Some(Value::String(value)) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Some(Value::Number(value)) => Some(value.to_string()),
        _ => None,
    };
    let telegram_username = payload
        .get("telegram_username")
        .and_then(Value::as_str)
        .map(|value| value.trim_start_matches('@').to_string())
        .filter(|value| !value.is_empty());

    match state
        .db
        .upsert_subscriber(
            &email,
            telegram_chat_id.as_deref(),
            telegram_username.as_deref(),
        )
        .await
    {
        Ok(subscriber) => (
            StatusCode::OK,
            Json(json!({
                "subscribed": true,
                "email": subscriber.email,
                "telegram_chat_id": subscriber.telegram_chat_id,
                "telegram_username": subscriber.telegram_username,
            })),
        ),
        Err(err) => {
            error!(error = %err, "subscriber upsert failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to subscribe")
        }
    }
}
