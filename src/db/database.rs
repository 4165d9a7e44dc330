use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::db::models::{LinkSessionRow, SubscriberRow};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn init(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS subscribers (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                email TEXT NOT NULL UNIQUE,\
                telegram_chat_id TEXT,\
                telegram_username TEXT,\
                created_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_subscribers_telegram_username \
             ON subscribers(telegram_username);",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS link_sessions (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                session_id TEXT NOT NULL UNIQUE,\
                telegram_username TEXT NOT NULL,\
                telegram_chat_id TEXT,\
                photos TEXT NOT NULL,\
                preferred_method TEXT NOT NULL,\
                notification_phone TEXT,\
                is_linked INTEGER NOT NULL DEFAULT 0,\
                is_sent INTEGER NOT NULL DEFAULT 0,\
                task_id TEXT,\
                created_at TEXT NOT NULL,\
                expires_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_link_sessions_session_id \
             ON link_sessions(session_id);",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_link_sessions_telegram_username \
             ON link_sessions(telegram_username);",
        )
        .execute(&pool)
        .await?;

        info!("Database tables created successfully");
        Ok(Database { pool })
    }

    /// Last-writer-wins upsert keyed by mail address. Optional fields
    /// only overwrite stored values when present.
    pub async fn upsert_subscriber(
        &self,
        email: &str,
        telegram_chat_id: Option<&str>,
        telegram_username: Option<&str>,
    ) -> Result<SubscriberRow> {
        sqlx::query(
            "INSERT INTO subscribers (email, telegram_chat_id, telegram_username, created_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(email) DO UPDATE SET \
                 telegram_chat_id = COALESCE(excluded.telegram_chat_id, subscribers.telegram_chat_id),\
                 telegram_username = COALESCE(excluded.telegram_username, subscribers.telegram_username)",
        )
        .bind(email)
        .bind(telegram_chat_id)
        .bind(telegram_username)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, SubscriberRow>(
            "SELECT id, email, telegram_chat_id, telegram_username, created_at \
             FROM subscribers WHERE email = ?1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_subscriber_by_username(
        &self,
        telegram_username: &str,
    ) -> Result<Option<SubscriberRow>> {
        let row = sqlx::query_as::<_, SubscriberRow>(
            "SELECT id, email, telegram_chat_id, telegram_username, created_at \
             FROM subscribers WHERE telegram_username = ?1 \
             ORDER BY id LIMIT 1",
        )
        .bind(telegram_username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Upsert keyed by Telegram handle. A subscriber that only ever
    /// talked to the bot gets a placeholder mail address.
    pub async fn upsert_subscriber_by_username(
        &self,
        telegram_username: &str,
        telegram_chat_id: &str,
    ) -> Result<SubscriberRow> {
        if let Some(existing) = self.find_subscriber_by_username(telegram_username).await? {
            return self
                .upsert_subscriber(
                    &existing.email,
                    Some(telegram_chat_id),
                    Some(telegram_username),
                )
                .await;
        }

        let placeholder_email = format!("{telegram_username}@telegram.invalid");
        self.upsert_subscriber(
            &placeholder_email,
            Some(telegram_chat_id),
            Some(telegram_username),
        )
        .await
    }

    pub async fn list_subscriber_emails(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>("SELECT email FROM subscribers ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_link_session(
        &self,
        session_id: &str,
        telegram_username: &str,
        photos_json: &str,
        preferred_method: &str,
        notification_phone: Option<&str>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<LinkSessionRow> {
        sqlx::query(
            "INSERT INTO link_sessions \
                (session_id, telegram_username, photos, preferred_method, notification_phone, \
                 created_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(session_id)
        .bind(telegram_username)
        .bind(photos_json)
        .bind(preferred_method)
        .bind(notification_phone)
        .bind(created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        let row = self
            .fetch_link_session(session_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("session row missing right after insert"))?;
        Ok(row)
    }

    pub async fn fetch_link_session(&self, session_id: &str) -> Result<Option<LinkSessionRow>> {
        let row = sqlx::query_as::<_, LinkSessionRow>(
            "SELECT id, session_id, telegram_username, telegram_chat_id, photos, \
                    preferred_method, notification_phone, is_linked, is_sent, task_id, \
                    created_at, expires_at \
             FROM link_sessions WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Atomic link gate: flips `is_linked` and records the chat id in a
    /// single conditional update. Concurrent callers race on the WHERE
    /// clause, so at most one ever sees a hit.
    pub async fn try_link_session(
        &self,
        session_id: &str,
        telegram_chat_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE link_sessions \
             SET telegram_chat_id = ?1, is_linked = 1 \
             WHERE session_id = ?2 AND is_linked = 0 AND expires_at > ?3",
        )
        .bind(telegram_chat_id)
        .bind(session_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[cfg(test)]
    pub(crate) fn pool_for_tests(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn mark_link_session_sent(&self, session_id: &str, task_id: &str) -> Result<()> {
        sqlx::query("UPDATE link_sessions SET is_sent = 1, task_id = ?1 WHERE session_id = ?2")
            .bind(task_id)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    async fn test_db() -> Database {
        Database::init("sqlite::memory:").await.expect("in-memory db")
    }

    #[tokio::test]
    async fn subscriber_upsert_is_idempotent_and_keeps_fields() {
        let db = test_db().await;

        let first = db
            .upsert_subscriber("user@example.com", None, Some("alice"))
            .await
            .expect("insert");
        assert_eq!(first.telegram_username.as_deref(), Some("alice"));
        assert!(first.telegram_chat_id.is_none());

        let second = db
            .upsert_subscriber("user@example.com", Some("42"), None)
            .await
            .expect("update");
        assert_eq!(second.id, first.id);
        assert_eq!(second.telegram_chat_id.as_deref(), Some("42"));
        // The username from the first write survives the None update.
        assert_eq!(second.telegram_username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn username_upsert_creates_placeholder_subscriber() {
        let db = test_db().await;

        let created = db
            .upsert_subscriber_by_username("alice", "42")
            .await
            .expect("create");
        assert_eq!(created.email, "alice@telegram.invalid");
        assert_eq!(created.telegram_chat_id.as_deref(), Some("42"));

        let updated = db
            .upsert_subscriber_by_username("alice", "43")
            .await
            .expect("update");
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.telegram_chat_id.as_deref(), Some("43"));
    }

    async fn insert_session(db: &Database, session_id: &str, expires_in: Duration) -> LinkSessionRow {
        let now = Utc::now();
        db.insert_link_session(
            session_id,
            "alice",
            r#"["data:image/jpeg;base64,AAAA"]"#,
            "telegram",
            None,
            now,
            now + expires_in,
        )
        .await
        .expect("insert session")
    }

    #[tokio::test]
    async fn link_gate_fires_exactly_once() {
        let db = test_db().await;
        insert_session(&db, "token-1", Duration::minutes(15)).await;

        let now = Utc::now();
        assert!(db.try_link_session("token-1", "42", now).await.expect("cas"));
        assert!(!db.try_link_session("token-1", "43", now).await.expect("cas"));

        let row = db
            .fetch_link_session("token-1")
            .await
            .expect("fetch")
            .expect("exists");
        assert!(row.is_linked);
        // The losing caller must not have overwritten the chat id.
        assert_eq!(row.telegram_chat_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn expired_sessions_never_link() {
        let db = test_db().await;
        insert_session(&db, "token-2", Duration::minutes(-1)).await;

        assert!(!db
            .try_link_session("token-2", "42", Utc::now())
            .await
            .expect("cas"));
        let row = db
            .fetch_link_session("token-2")
            .await
            .expect("fetch")
            .expect("exists");
        assert!(!row.is_linked);
        assert!(row.telegram_chat_id.is_none());
    }

    #[tokio::test]
    async fn unknown_tokens_do_not_link() {
        let db = test_db().await;
        assert!(!db
            .try_link_session("missing", "42", Utc::now())
            .await
            .expect("cas"));
    }

    #[tokio::test]
    async fn mark_sent_records_the_job_id() {
        let db = test_db().await;
        insert_session(&db, "token-3", Duration::minutes(15)).await;
        db.try_link_session("token-3", "42", Utc::now())
            .await
            .expect("cas");

        db.mark_link_session_sent("token-3", "job-9")
            .await
            .expect("mark sent");
        let row = db
            .fetch_link_session("token-3")
            .await
            .expect("fetch")
            .expect("exists");
        assert!(row.is_sent);
        assert_eq!(row.task_id.as_deref(), Some("job-9"));
    }
}
