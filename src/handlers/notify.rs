use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::handlers::error_response;
use crate::jobs::DeliveryJob;
use crate::state::AppState;

const DEFAULT_SUBJECT: &str = "Photo Booth Updates";

fn subject_and_body(payload: &Value) -> Result<(String, String), &'static str> {
    let subject = payload
        .get("subject")
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(DEFAULT_SUBJECT)
        .to_string();
    let body = payload
        .get("body")
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .ok_or("body is required")?
        .to_string();
    Ok((subject, body))
}

/// POST /broadcast/ — mail every subscriber, asynchronously.
pub async fn broadcast_email(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let (subject, body) = match subject_and_body(&payload) {
        Ok(parts) => parts,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let task_id = state
        .jobs
        .submit(DeliveryJob::BroadcastEmail { subject, body })
        .await;
    (
        StatusCode::ACCEPTED,
        Json(json!({ "accepted": true, "task_id": task_id })),
    )
}

/// POST /notify/ — like broadcast, with simulated sms/telegram legs.
pub async fn general_notification(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let (subject, body) = match subject_and_body(&payload) {
        Ok(parts) => parts,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };
    let include_sms = payload
        .get("include_sms")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let include_telegram = payload
        .get("include_telegram")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let task_id = state
        .jobs
        .submit(DeliveryJob::GeneralNotification {
            subject,
            body,
            include_sms,
            include_telegram,
        })
        .await;
    (
        StatusCode::ACCEPTED,
        Json(json!({ "accepted": true, "task_id": task_id })),
    )
}
