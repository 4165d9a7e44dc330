use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::db::Database;
use crate::delivery::{Channel, EmailSender, Orchestrator, SendOutcome, SmsSender};
use crate::storage::MediaStager;

pub type JobId = String;

/// One delivery request, created per send call and never persisted.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub recipient: String,
    pub photos: Vec<String>,
    pub preferred: Channel,
    pub notification_phone: Option<String>,
}

#[derive(Debug, Clone)]
pub enum DeliveryJob {
    SendPhotos(DeliveryRequest),
    BroadcastEmail {
        subject: String,
        body: String,
    },
    GeneralNotification {
        subject: String,
        body: String,
        include_sms: bool,
        include_telegram: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobState {
    Running,
    Completed { report: Value },
    Failed { error: String },
}

/// Fire-and-forget execution substrate. Submitting never blocks on the
/// job; outcomes are only visible through `report`.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn submit(&self, job: DeliveryJob) -> JobId;
    fn report(&self, job_id: &str) -> Option<JobState>;
}

pub struct TokioJobExecutor {
    context: Arc<WorkerContext>,
}

struct WorkerContext {
    db: Database,
    stager: MediaStager,
    orchestrator: Orchestrator,
    email: Arc<EmailSender>,
    sms: Arc<SmsSender>,
    registry: Mutex<HashMap<JobId, JobState>>,
}

impl TokioJobExecutor {
    pub fn new(
        db: Database,
        stager: MediaStager,
        orchestrator: Orchestrator,
        email: Arc<EmailSender>,
        sms: Arc<SmsSender>,
    ) -> Self {
        TokioJobExecutor {
            context: Arc::new(WorkerContext {
                db,
                stager,
                orchestrator,
                email,
                sms,
                registry: Mutex::new(HashMap::new()),
            }),
        }
    }
}

#[async_trait]
impl JobExecutor for TokioJobExecutor {
    async fn submit(&self, job: DeliveryJob) -> JobId {
        let job_id = Uuid::new_v4().to_string();
        self.context
            .registry
            .lock()
            .insert(job_id.clone(), JobState::Running);

        let context = self.context.clone();
        let spawned_id = job_id.clone();
        tokio::spawn(async move {
            let state = match run_job(&context, &job).await {
                Ok(report) => JobState::Completed { report },
                Err(err) => {
                    error!(job_id = %spawned_id, error = %err, "job failed");
                    JobState::Failed {
                        error: err.to_string(),
                    }
                }
            };
            context.registry.lock().insert(spawned_id, state);
        });

        job_id
    }

    fn report(&self, job_id: &str) -> Option<JobState> {
        self.context.registry.lock().get(job_id).cloned()
    }
}

async fn run_job(context: &WorkerContext, job: &DeliveryJob) -> anyhow::Result<Value> {
    match job {
        DeliveryJob::SendPhotos(request) => run_send_photos(context, request).await,
        DeliveryJob::BroadcastEmail { subject, body } => {
            let report = run_email_fanout(context, subject, body).await?;
            Ok(json!({
                "total": report.total,
                "sent": report.sent,
                "failed": report.failed,
            }))
        }
        DeliveryJob::GeneralNotification {
            subject,
            body,
            include_sms,
            include_telegram,
        } => {
            let report = run_email_fanout(context, subject, body).await?;
            // SMS/Telegram legs are simulated counts only.
            let simulated = |enabled: bool| if enabled { report.total } else { 0 };
            Ok(json!({
                "recipients": report.total,
                "email": { "sent": report.sent, "failed": report.failed },
                "sms_simulated": simulated(*include_sms),
                "telegram_simulated": simulated(*include_telegram),
            }))
        }
    }
}

async fn run_send_photos(context: &WorkerContext, request: &DeliveryRequest) -> anyhow::Result<Value> {
    // Staging failure aborts before any channel attempt; no channel can
    // deliver unstaged sources.
    let staged = context.stager.stage(&request.photos).await?;

    let outcome = context
        .orchestrator
        .deliver(&request.recipient, &staged, request.preferred)
        .await;
    info!(
        recipient = %request.recipient,
        success = outcome.success,
        attempts = outcome.attempts.len(),
        "delivery finished"
    );

    let status_notification = send_status_notice(context, request, &outcome).await;

    Ok(json!({
        "success": outcome.success,
        "attempts": outcome.attempts,
        "status_notification": status_notification,
    }))
}

/// Out-of-band SMS telling the recipient their photos went out. Only for
/// successful email/telegram deliveries, and never fatal.
async fn send_status_notice(
    context: &WorkerContext,
    request: &DeliveryRequest,
    outcome: &SendOutcome,
) -> Value {
    let Some(phone) = request.notification_phone.as_deref() else {
        return Value::Null;
    };
    if !outcome.success || !matches!(request.preferred, Channel::Email | Channel::Telegram) {
        return Value::Null;
    }

    let delivered_via = outcome
        .attempts
        .last()
        .map(|attempt| attempt.channel)
        .unwrap_or(request.preferred);
    let message = format!(
        "Your AI Photo Booth photos were delivered via {}.",
        delivered_via.as_str().to_uppercase()
    );

    match context.sms.send_message(phone, &message).await {
        Ok(_) => json!({ "sent": true, "channel": "sms", "message": message }),
        Err(err) => json!({ "sent": false, "channel": "sms", "error": err.to_string() }),
    }
}

struct FanoutReport {
    total: usize,
    sent: usize,
    failed: Vec<Value>,
}

async fn run_email_fanout(
    context: &WorkerContext,
    subject: &str,
    body: &str,
) -> anyhow::Result<FanoutReport> {
    let recipients = context.db.list_subscriber_emails().await?;
    let total = recipients.len();
    let mut sent = 0usize;
    let mut failed: Vec<Value> = Vec::new();

    for email in recipients {
        match context.email.send_plain(&email, subject, body).await {
            Ok(()) => sent += 1,
            Err(err) => failed.push(json!({ "email": email, "error": err.to_string() })),
        }
    }

    info!(total, sent, failed = failed.len(), "broadcast finished");
    Ok(FanoutReport {
        total,
        sent,
        failed,
    })
}
