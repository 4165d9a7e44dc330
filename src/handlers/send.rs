use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::delivery::Channel;
use crate::handlers::error_response;
use crate::handlers::validate::{is_valid_email, is_valid_telegram_recipient, normalize_phone};
use crate::jobs::{DeliveryJob, DeliveryRequest};
use crate::state::AppState;

/// POST /send/ — validate, then either open a Telegram linking session
/// (handle recipients) or hand the request to the Job Executor.
pub async fn send_photos(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let Some(recipient) = payload
        .get("recipient")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return error_response(StatusCode::BAD_REQUEST, "recipient is required");
    };

    let photos: Vec<String> = match payload.get("photos") {
        None => Vec::new(),
        Some(Value::Array(items)) => {
            let mut photos = Vec::with_capacity(items.len());
            for item in items {
                match item.as_str() {
                    Some(source) => photos.push(source.to_string()),
                    None => {
                        return error_response(
                            StatusCode::BAD_REQUEST,
                            "photos must be a list of strings",
                        )
                    }
                }
            }
            photos
        }
        Some(_) => {
            return error_response(StatusCode::BAD_REQUEST, "photos must be a list of strings")
        }
    };

    let preferred_raw = payload
        .get("preferred_method")
        .and_then(Value::as_str)
        .unwrap_or("email");
    let Some(preferred) = Channel::parse(preferred_raw) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "preferred_method must be email, sms, or telegram",
        );
    };

    match preferred {
        Channel::Email => {
            if !is_valid_email(recipient) {
                return error_response(StatusCode::BAD_REQUEST, "Invalid email address");
            }
        }
        Channel::Telegram => {
            if !is_valid_telegram_recipient(recipient) {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "Invalid Telegram chat. Provide @username after starting the bot or numeric chat ID.",
                );
            }
        }
        Channel::Sms => {
            if normalize_phone(recipient).is_none() {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "Phone number must be in international format, e.g. +1234567890",
                );
            }
        }
    }

    let notification_phone = match payload.get("notification_phone").and_then(Value::as_str) {
        None => None,
        Some(value) if value.trim().is_empty() => None,
        Some(value) => match normalize_phone(value) {
            Some(normalized) => Some(normalized),
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "notification_phone must be in international format, e.g. +1234567890",
                )
            }
        },
    };

    // Handle recipients have no chat id yet; park the photos behind a
    // deep-link session instead of dispatching.
    if preferred == Channel::Telegram && recipient.starts_with('@') {
        let session = match state
            .sessions
            .create(recipient, &photos, preferred, notification_phone.as_deref())
            .await
        {
            Ok(session) => session,
            Err(err) => {
                tracing::error!(error = %err, "failed to create linking session");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to create session",
                );
            }
        };

        let bot_username = state.config.telegram_bot_username.trim_start_matches('@');
        let deep_link = format!("https://t.me/{}?start={}", bot_username, session.session_id);
        return (
            StatusCode::OK,
            Json(json!({
                "requires_telegram_start": true,
                "session_id": session.session_id,
                "deep_link": deep_link,
                "username": recipient,
            })),
        );
    }

    let task_id = state
        .jobs
        .submit(DeliveryJob::SendPhotos(DeliveryRequest {
            recipient: recipient.to_string(),
            photos,
            preferred,
            notification_phone,
        }))
        .await;

    (
        StatusCode::ACCEPTED,
        Json(json!({ "accepted": true, "task_id": task_id })),
    )
}
