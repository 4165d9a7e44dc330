use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use teloxide::types::{ChatId, Recipient};
use tracing::{error, info};

use crate::jobs::{DeliveryJob, DeliveryRequest};
use crate::state::AppState;

const LINKED_MESSAGE: &str = "✅ You're linked! Your photos are on the way.";
const EXPIRED_MESSAGE: &str =
    "⏳ This link has expired or was already used. Please request your photos again from the booth.";
const WELCOME_MESSAGE: &str =
    "👋 Welcome to AI Photo Booth! Request your photos at the booth and they will arrive here.";

#[derive(Debug, Deserialize)]
pub struct UpdatePayload {
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub chat: Option<IncomingChat>,
    pub from: Option<IncomingUser>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct IncomingUser {
    pub username: Option<String>,
    pub first_name: Option<String>,
}

/// POST /telegram/webhook/ — the provider suppresses retries only on
/// 200, so every outcome acknowledges, including parse failures and
/// internal errors.
pub async fn telegram_webhook(State(state): State<AppState>, body: String) -> Json<Value> {
    match serde_json::from_str::<UpdatePayload>(&body) {
        Ok(update) => {
            if let Err(err) = process_update(&state, update).await {
                error!(error = %err, "webhook processing failed");
            }
        }
        Err(err) => {
            error!(error = %err, "unparseable webhook payload");
        }
    }
    Json(json!({ "ok": true }))
}

/// `/start` or `/start@BotName`, with an optional deep-link token.
/// Returns None for anything that is not a start command.
fn parse_start_command(text: &str) -> Option<Option<String>> {
    let mut parts = text.trim().split_whitespace();
    let command = parts.next()?;
    let is_start = command == "/start" || command.starts_with("/start@");
    if !is_start {
        return None;
    }
    Some(parts.next().map(|token| token.to_string()))
}

async fn process_update(state: &AppState, update: UpdatePayload) -> anyhow::Result<()> {
    let Some(message) = update.message else {
        return Ok(());
    };
    let Some(chat) = message.chat else {
        return Ok(());
    };
    let chat_id = chat.id;
    let username = message
        .from
        .as_ref()
        .and_then(|user| user.username.clone());
    let display_name = message
        .from
        .as_ref()
        .and_then(|user| user.first_name.clone())
        .unwrap_or_default();

    let token = message.text.as_deref().and_then(parse_start_command);

    match token {
        Some(Some(token)) => link_and_dispatch(state, chat_id, username, &token).await,
        Some(None) => {
            info!(chat_id, %display_name, "start without token");
            state
                .telegram
                .send_message(&Recipient::Id(ChatId(chat_id)), WELCOME_MESSAGE)
                .await
                .ok();
            upsert_sender(state, chat_id, username.as_deref()).await;
            Ok(())
        }
        None => {
            // Plain chatter; just keep the chat id fresh.
            upsert_sender(state, chat_id, username.as_deref()).await;
            Ok(())
        }
    }
}

async fn link_and_dispatch(
    state: &AppState,
    chat_id: i64,
    username: Option<String>,
    token: &str,
) -> anyhow::Result<()> {
    let recipient = Recipient::Id(ChatId(chat_id));

    let session = match state.sessions.link(token, &chat_id.to_string()).await? {
        Ok(session) => session,
        Err(denied) => {
            info!(chat_id, session_id = %token, reason = %denied, "rejected start token");
            state
                .telegram
                .send_message(&recipient, EXPIRED_MESSAGE)
                .await
                .ok();
            return Ok(());
        }
    };

    // The kiosk user typed a handle; prefer the sender's real one when
    // Telegram provides it.
    let handle = username.unwrap_or_else(|| session.telegram_username.clone());
    upsert_sender(state, chat_id, Some(&handle)).await;

    state
        .telegram
        .send_message(&recipient, LINKED_MESSAGE)
        .await
        .ok();

    let job_id = state
        .jobs
        .submit(DeliveryJob::SendPhotos(DeliveryRequest {
            recipient: chat_id.to_string(),
            photos: session.photo_sources(),
            preferred: session.preferred(),
            notification_phone: session.notification_phone.clone(),
        }))
        .await;
    state.sessions.mark_sent(token, &job_id).await?;
    info!(chat_id, session_id = %token, job_id = %job_id, "released queued photos");
    Ok(())
}

async fn upsert_sender(state: &AppState, chat_id: i64, username: Option<&str>) {
    let Some(username) = username else {
        return;
    };
    let handle = username.trim_start_matches('@');
    if handle.is_empty() {
        return;
    }
    if let Err(err) = state
        .db
        .upsert_subscriber_by_username(handle, &chat_id.to_string())
        .await
    {
        error!(error = %err, "subscriber upsert failed");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::delivery::telegram::tests::{RecordingApi, SentItem};
    use crate::delivery::Channel;
    use crate::jobs::{JobExecutor, JobId, JobState};

    pub(crate) struct FakeJobs {
        pub submitted: Mutex<Vec<DeliveryJob>>,
    }

    #[async_trait]
    impl JobExecutor for FakeJobs {
        async fn submit(&self, job: DeliveryJob) -> JobId {
            let mut submitted = self.submitted.lock();
            submitted.push(job);
            format!("job-{}", submitted.len())
        }

        fn report(&self, _job_id: &str) -> Option<JobState> {
            None
        }
    }

    pub(crate) async fn fake_state() -> (AppState, Arc<FakeJobs>, Arc<RecordingApi>) {
        let mut config = Config::load().expect("config");
        config.telegram_bot_username = "booth_bot".to_string();

        let db = Database::init("sqlite::memory:").await.expect("db");
        let jobs = Arc::new(FakeJobs {
            submitted: Mutex::new(Vec::new()),
        });
        let api = Arc::new(RecordingApi::new(None));
        let state = AppState::new(Arc::new(config), db, jobs.clone(), api.clone());
        (state, jobs, api)
    }

    fn start_update(chat_id: i64, username: Option<&str>, text: &str) -> UpdatePayload {
        UpdatePayload {
            message: Some(IncomingMessage {
                chat: Some(IncomingChat { id: chat_id }),
                from: Some(IncomingUser {
                    username: username.map(str::to_string),
                    first_name: Some("Alice".to_string()),
                }),
                text: Some(text.to_string()),
            }),
        }
    }

    #[test]
    fn start_command_parsing_handles_tokens_and_bot_suffix() {
        assert_eq!(parse_start_command("/start"), Some(None));
        assert_eq!(
            parse_start_command("/start abc123"),
            Some(Some("abc123".to_string()))
        );
        assert_eq!(
            parse_start_command("/start@booth_bot abc123"),
            Some(Some("abc123".to_string()))
        );
        assert_eq!(parse_start_command("hello there"), None);
        assert_eq!(parse_start_command("/starting"), None);
    }

    #[tokio::test]
    async fn valid_token_links_dispatches_and_marks_sent() {
        let (state, jobs, api) = fake_state().await;
        let session = state
            .sessions
            .create(
                "@alice",
                &["data:image/jpeg;base64,AAAA".to_string()],
                Channel::Telegram,
                Some("+15550100"),
            )
            .await
            .expect("create session");

        process_update(
            &state,
            start_update(42, Some("alice"), &format!("/start {}", session.session_id)),
        )
        .await
        .expect("process");

        // Session is linked, marked sent, and carries the job id.
        let status = state
            .sessions
            .status(&session.session_id)
            .await
            .expect("status")
            .expect("session");
        assert!(status.is_linked);
        assert!(status.is_sent);
        assert_eq!(status.task_id.as_deref(), Some("job-1"));

        // The queued photos went to the executor addressed by chat id.
        let submitted = jobs.submitted.lock();
        assert_eq!(submitted.len(), 1);
        let DeliveryJob::SendPhotos(request) = &submitted[0] else {
            panic!("expected SendPhotos");
        };
        assert_eq!(request.recipient, "42");
        assert_eq!(request.preferred, Channel::Telegram);
        assert_eq!(request.notification_phone.as_deref(), Some("+15550100"));

        // Subscriber now knows the chat id.
        let subscriber = state
            .db
            .find_subscriber_by_username("alice")
            .await
            .expect("query")
            .expect("subscriber");
        assert_eq!(subscriber.telegram_chat_id.as_deref(), Some("42"));

        // The chat got the acknowledgement.
        let sent = api.sent.lock();
        assert_eq!(sent.as_slice(), &[SentItem::Text(LINKED_MESSAGE.to_string())]);
    }

    #[tokio::test]
    async fn expired_token_sends_expired_notice_and_dispatches_nothing() {
        let (state, jobs, api) = fake_state().await;
        let session = state
            .sessions
            .create(
                "@alice",
                &["data:image/jpeg;base64,AAAA".to_string()],
                Channel::Telegram,
                None,
            )
            .await
            .expect("create session");
        sqlx::query("UPDATE link_sessions SET expires_at = ?1 WHERE session_id = ?2")
            .bind(chrono::Utc::now() - chrono::Duration::minutes(1))
            .bind(&session.session_id)
            .execute(state.db.pool_for_tests())
            .await
            .expect("age session");

        process_update(
            &state,
            start_update(42, Some("alice"), &format!("/start {}", session.session_id)),
        )
        .await
        .expect("process");

        let status = state
            .sessions
            .status(&session.session_id)
            .await
            .expect("status")
            .expect("session");
        assert!(!status.is_linked);
        assert!(!status.is_sent);
        assert!(status.expired);

        assert!(jobs.submitted.lock().is_empty());
        let sent = api.sent.lock();
        assert_eq!(
            sent.as_slice(),
            &[SentItem::Text(EXPIRED_MESSAGE.to_string())]
        );
    }

    #[tokio::test]
    async fn second_start_for_the_same_token_is_denied() {
        let (state, jobs, api) = fake_state().await;
        let session = state
            .sessions
            .create(
                "@alice",
                &["data:image/jpeg;base64,AAAA".to_string()],
                Channel::Telegram,
                None,
            )
            .await
            .expect("create session");
        let start = format!("/start {}", session.session_id);

        process_update(&state, start_update(42, Some("alice"), &start))
            .await
            .expect("first start");
        process_update(&state, start_update(77, Some("mallory"), &start))
            .await
            .expect("second start");

        // One dispatch only; the loser got the expired notice.
        assert_eq!(jobs.submitted.lock().len(), 1);
        let sent = api.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1], SentItem::Text(EXPIRED_MESSAGE.to_string()));
    }

    #[tokio::test]
    async fn start_without_token_welcomes_and_registers() {
        let (state, jobs, api) = fake_state().await;

        process_update(&state, start_update(42, Some("alice"), "/start"))
            .await
            .expect("process");

        assert!(jobs.submitted.lock().is_empty());
        let sent = api.sent.lock();
        assert_eq!(
            sent.as_slice(),
            &[SentItem::Text(WELCOME_MESSAGE.to_string())]
        );
        let subscriber = state
            .db
            .find_subscriber_by_username("alice")
            .await
            .expect("query")
            .expect("subscriber");
        assert_eq!(subscriber.email, "alice@telegram.invalid");
    }

    #[tokio::test]
    async fn updates_without_a_chat_are_ignored() {
        let (state, jobs, api) = fake_state().await;

        process_update(
            &state,
            UpdatePayload {
                message: Some(IncomingMessage {
                    chat: None,
                    from: None,
                    text: Some("/start abc".to_string()),
                }),
            },
        )
        .await
        .expect("process");
        process_update(&state, UpdatePayload { message: None })
            .await
            .expect("process");

        assert!(jobs.submitted.lock().is_empty());
        assert!(api.sent.lock().is_empty());
    }
}
