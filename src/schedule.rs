use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tracing::info;

use crate::jobs::DeliveryJob;
use crate::state::AppState;

/// Daily engagement mail, enabled by ENABLE_DAILY_NOTIFICATION. Sleeps
/// until the configured wall-clock time, submits the job, repeats.
pub fn spawn_daily_notification(state: AppState) {
    if !state.config.enable_daily_notification {
        return;
    }
    let hour = state.config.daily_notification_hour;
    let minute = state.config.daily_notification_minute;
    info!(hour, minute, "daily notification schedule enabled");

    tokio::spawn(async move {
        loop {
            let wait = seconds_until_next(Local::now().naive_local(), hour, minute);
            tokio::time::sleep(Duration::from_secs(wait)).await;

            let task_id = state
                .jobs
                .submit(DeliveryJob::GeneralNotification {
                    subject: state.config.daily_notification_subject.clone(),
                    body: state.config.daily_notification_body.clone(),
                    include_sms: false,
                    include_telegram: false,
                })
                .await;
            info!(%task_id, "submitted daily notification");
        }
    });
}

fn seconds_until_next(now: NaiveDateTime, hour: u32, minute: u32) -> u64 {
    let today_target = now
        .date()
        .and_hms_opt(hour, minute, 0)
        .unwrap_or_else(|| now.date().and_hms_opt(0, 0, 0).expect("midnight exists"));
    let target = if today_target > now {
        today_target
    } else {
        today_target + chrono::Duration::days(1)
    };
    (target - now).num_seconds().max(1) as u64
}
