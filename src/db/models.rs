use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::delivery::Channel;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SubscriberRow {
    pub id: i64,
    pub email: String,
    pub telegram_chat_id: Option<String>,
    pub telegram_username: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One deep-link session binding a Telegram handle to a pending photo
/// delivery. Rows are never deleted; expiry is evaluated at read time.
#[derive(Debug, Clone, FromRow)]
pub struct LinkSessionRow {
    pub id: i64,
    pub session_id: String,
    pub telegram_username: String,
    pub telegram_chat_id: Option<String>,
    pub photos: String,
    pub preferred_method: String,
    pub notification_phone: Option<String>,
    pub is_linked: bool,
    pub is_sent: bool,
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LinkSessionRow {
    /// Pending photo sources, stored as a JSON array.
    pub fn photo_sources(&self) -> Vec<String> {
        serde_json::from_str(&self.photos).unwrap_or_default()
    }

    pub fn preferred(&self) -> Channel {
        Channel::parse(&self.preferred_method).unwrap_or(Channel::Telegram)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
