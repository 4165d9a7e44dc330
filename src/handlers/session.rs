use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::handlers::error_response;
use crate::state::AppState;

/// GET /telegram/session/?session_id=… — read-only status poll for the
/// kiosk frontend.
pub async fn session_status(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(session_id) = params.get("session_id").filter(|value| !value.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "session_id is required");
    };

    match state.sessions.status(session_id).await {
        Ok(Some(status)) => (
            StatusCode::OK,
            Json(json!({
                "is_linked": status.is_linked,
                "is_sent": status.is_sent,
                "task_id": status.task_id,
                "expired": status.expired,
            })),
        ),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Unknown session"),
        Err(err) => {
            error!(error = %err, "session status lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to read session")
        }
    }
}
