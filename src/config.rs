use std::env;

use anyhow::Result;

/// Immutable process configuration. Built once in `main` from the
/// environment and passed explicitly into every component; nothing else
/// reads `std::env` after startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub log_level: String,
    pub database_url: String,

    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_from: String,
    pub email_attachment_max_bytes: usize,

    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_messaging_service_sid: String,
    pub twilio_from_number: String,
    pub twilio_api_base: String,

    pub telegram_bot_token: String,
    pub telegram_bot_username: String,

    pub minio_endpoint: String,
    pub minio_public_endpoint: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub minio_use_ssl: bool,
    pub minio_bucket: String,
    pub minio_region: String,

    pub simulate_delivery_failures: bool,

    pub enable_daily_notification: bool,
    pub daily_notification_hour: u32,
    pub daily_notification_minute: u32,
    pub daily_notification_subject: String,
    pub daily_notification_body: String,
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_string_with_fallback(name: &str, fallback_name: &str, default: &str) -> String {
    env::var(name)
        .or_else(|_| env::var(fallback_name))
        .unwrap_or_else(|_| default.to_string())
}

fn normalize_database_url(value: String) -> String {
    if value.starts_with("sqlite+aiosqlite://") {
        return value.replacen("sqlite+aiosqlite://", "sqlite://", 1);
    }
    value
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Config {
            bind_addr: env_string("BIND_ADDR", "0.0.0.0:8000"),
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            database_url: normalize_database_url(env_string(
                "DATABASE_URL",
                "sqlite://photo_courier.db",
            )),

            smtp_host: env_string("SMTP_HOST", ""),
            smtp_port: env_u16("SMTP_PORT", 587),
            smtp_username: env_string("SMTP_USERNAME", ""),
            smtp_password: env_string("SMTP_PASSWORD", ""),
            smtp_from: env_string("DEFAULT_FROM_EMAIL", ""),
            email_attachment_max_bytes: env_usize("EMAIL_ATTACHMENT_MAX_BYTES", 8 * 1024 * 1024),

            twilio_account_sid: env_string("TWILIO_ACCOUNT_SID", ""),
            twilio_auth_token: env_string("TWILIO_AUTH_TOKEN", ""),
            twilio_messaging_service_sid: env_string("TWILIO_MESSAGING_SERVICE_SID", ""),
            twilio_from_number: env_string("TWILIO_FROM_NUMBER", ""),
            twilio_api_base: env_string("TWILIO_API_BASE", "https://api.twilio.com"),

            telegram_bot_token: env_string("TELEGRAM_BOT_TOKEN", ""),
            telegram_bot_username: env_string("TELEGRAM_BOT_USERNAME", ""),

            minio_endpoint: env_string("MINIO_ENDPOINT", "minio:9000"),
            minio_public_endpoint: env_string("MINIO_PUBLIC_ENDPOINT", "localhost:9000"),
            minio_access_key: env_string_with_fallback(
                "MINIO_ACCESS_KEY",
                "MINIO_ROOT_USER",
                "minioadmin",
            ),
            minio_secret_key: env_string_with_fallback(
                "MINIO_SECRET_KEY",
                "MINIO_ROOT_PASSWORD",
                "minioadmin",
            ),
            minio_use_ssl: env_bool("MINIO_USE_SSL", false),
            minio_bucket: env_string("MINIO_BUCKET", "photobooth"),
            minio_region: env_string("MINIO_REGION", "us-east-1"),

            simulate_delivery_failures: env_bool("SIMULATE_DELIVERY_FAILURES", false),

            enable_daily_notification: env_bool("ENABLE_DAILY_NOTIFICATION", false),
            daily_notification_hour: env_u32("DAILY_NOTIFICATION_HOUR", 9).min(23),
            daily_notification_minute: env_u32("DAILY_NOTIFICATION_MINUTE", 0).min(59),
            daily_notification_subject: env_string(
                "DAILY_NOTIFICATION_SUBJECT",
                "AI Photo Booth Reminder",
            ),
            daily_notification_body: env_string(
                "DAILY_NOTIFICATION_BODY",
                "Come by and take a great photo today!",
            ),
        })
    }

    /// Scheme + authority of the internal object-store endpoint.
    pub fn minio_internal_base(&self) -> String {
        let scheme = if self.minio_use_ssl { "https" } else { "http" };
        format!("{}://{}", scheme, self.minio_endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_legacy_sqlite_scheme() {
        let normalized = normalize_database_url("sqlite+aiosqlite:///app.db".to_string());
        assert_eq!(normalized, "sqlite:///app.db");
    }

    #[test]
    fn internal_base_respects_ssl_flag() {
        let mut config = Config::load().expect("config");
        config.minio_endpoint = "minio:9000".to_string();
        config.minio_use_ssl = false;
        assert_eq!(config.minio_internal_base(), "http://minio:9000");
        config.minio_use_ssl = true;
        assert_eq!(config.minio_internal_base(), "https://minio:9000");
    }
}
