use anyhow::Result;
use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::db::models::LinkSessionRow;
use crate::db::Database;
use crate::delivery::Channel;

const SESSION_TTL_MINUTES: i64 = 15;

/// Why a link attempt was refused. Callers present every variant the
/// same way to the chat user; the distinction exists for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkDenied {
    #[error("unknown session token")]
    Unknown,
    #[error("session expired")]
    Expired,
    #[error("session already linked")]
    AlreadyLinked,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionStatus {
    pub is_linked: bool,
    pub is_sent: bool,
    pub task_id: Option<String>,
    pub expired: bool,
}

/// Lifecycle of deep-link sessions: `created → linked → sent`, token
/// addressed, 15-minute expiry evaluated at read time.
#[derive(Clone)]
pub struct LinkingSessions {
    db: Database,
}

impl LinkingSessions {
    pub fn new(db: Database) -> Self {
        LinkingSessions { db }
    }

    pub async fn create(
        &self,
        handle: &str,
        photos: &[String],
        preferred: Channel,
        notification_phone: Option<&str>,
    ) -> Result<LinkSessionRow> {
        let token = Uuid::new_v4().to_string();
        let now = Utc::now();
        let photos_json = serde_json::to_string(photos)?;

        let row = self
            .db
            .insert_link_session(
                &token,
                handle.trim_start_matches('@'),
                &photos_json,
                preferred.as_str(),
                notification_phone,
                now,
                now + Duration::minutes(SESSION_TTL_MINUTES),
            )
            .await?;
        info!(session_id = %row.session_id, handle = %row.telegram_username, "created linking session");
        Ok(row)
    }

    /// Pure read. `expired` is computed against the clock; stored flags
    /// are reported as-is.
    pub async fn status(&self, token: &str) -> Result<Option<SessionStatus>> {
        let Some(row) = self.db.fetch_link_session(token).await? else {
            return Ok(None);
        };
        Ok(Some(SessionStatus {
            is_linked: row.is_linked,
            is_sent: row.is_sent,
            task_id: row.task_id.clone(),
            expired: row.is_expired_at(Utc::now()),
        }))
    }

    /// Single compare-and-set; concurrent calls for one token produce
    /// exactly one winner.
    pub async fn link(
        &self,
        token: &str,
        chat_id: &str,
    ) -> Result<std::result::Result<LinkSessionRow, LinkDenied>> {
        if self.db.try_link_session(token, chat_id, Utc::now()).await? {
            let row = self
                .db
                .fetch_link_session(token)
                .await?
                .ok_or_else(|| anyhow::anyhow!("linked session vanished"))?;
            info!(session_id = %token, chat_id, "linked session");
            return Ok(Ok(row));
        }

        // Diagnose after the fact; the update itself stays atomic.
        let denied = match self.db.fetch_link_session(token).await? {
            None => LinkDenied::Unknown,
            Some(row) if row.is_linked => LinkDenied::AlreadyLinked,
            Some(_) => LinkDenied::Expired,
        };
        info!(session_id = %token, reason = %denied, "link attempt denied");
        Ok(Err(denied))
    }

    pub async fn mark_sent(&self, token: &str, job_id: &str) -> Result<()> {
        self.db.mark_link_session_sent(token, job_id).await
    }
}
