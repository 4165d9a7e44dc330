use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod config;
mod db;
mod delivery;
mod handlers;
mod jobs;
mod schedule;
mod sessions;
mod state;
mod storage;
mod utils;

use config::Config;
use db::Database;
use delivery::{
    BotApi, ChannelSet, EmailSender, FailurePolicy, NoFailures, Orchestrator, SimulatedFailures,
    SmsSender, TelegramApi, TelegramSender,
};
use jobs::{JobExecutor, TokioJobExecutor};
use state::AppState;
use storage::s3::{build_s3_client, ensure_bucket};
use storage::MediaStager;
use utils::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(Config::load()?);
    let _guards = init_logging(&config.log_level);
    info!("Starting photo-courier");

    let db = Database::init(&config.database_url).await?;

    let s3 = build_s3_client(&config).await?;
    if let Err(err) = ensure_bucket(&s3, &config.minio_bucket).await {
        // Staging will keep erroring until the object store is back;
        // the HTTP surface can still come up.
        warn!(error = %err, bucket = %config.minio_bucket, "object-store bucket not ready");
    }
    let stager = MediaStager::new(s3, &config);

    let email = Arc::new(EmailSender::new(&config));
    let sms = Arc::new(SmsSender::new(&config));
    let telegram_api: Arc<dyn TelegramApi> = Arc::new(BotApi::new(&config));
    let telegram = Arc::new(TelegramSender::new(telegram_api.clone()));

    let channels = ChannelSet::new(email.clone(), sms.clone(), telegram);
    let policy: Box<dyn FailurePolicy> = if config.simulate_delivery_failures {
        warn!("delivery failure simulation is enabled");
        Box::new(SimulatedFailures)
    } else {
        Box::new(NoFailures)
    };
    let orchestrator = Orchestrator::new(channels, policy);

    let jobs: Arc<dyn JobExecutor> = Arc::new(TokioJobExecutor::new(
        db.clone(),
        stager,
        orchestrator,
        email,
        sms,
    ));

    let state = AppState::new(config.clone(), db, jobs, telegram_api);
    schedule::spawn_daily_notification(state.clone());

    let app = handlers::router(state);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to install CTRL+C handler");
    }
    info!("Shutting down");
}
