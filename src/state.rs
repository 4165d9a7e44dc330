use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::delivery::TelegramApi;
use crate::jobs::JobExecutor;
use crate::sessions::LinkingSessions;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub sessions: LinkingSessions,
    pub jobs: Arc<dyn JobExecutor>,
    pub telegram: Arc<dyn TelegramApi>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        db: Database,
        jobs: Arc<dyn JobExecutor>,
        telegram: Arc<dyn TelegramApi>,
    ) -> Self {
        let sessions = LinkingSessions::new(db.clone());
        AppState {
            config,
            db,
            sessions,
            jobs,
            telegram,
        }
    }
}
