use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod email;
pub mod orchestrator;
pub mod sms;
pub mod telegram;

pub use email::EmailSender;
pub use orchestrator::{FailurePolicy, NoFailures, Orchestrator, SimulatedFailures};
pub use sms::SmsSender;
pub use telegram::{BotApi, TelegramApi, TelegramSender};

/// The three delivery channels, in global fallback priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Telegram,
}

impl Channel {
    pub const PRIORITY: [Channel; 3] = [Channel::Email, Channel::Sms, Channel::Telegram];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Telegram => "telegram",
        }
    }

    pub fn parse(value: &str) -> Option<Channel> {
        match value.trim().to_lowercase().as_str() {
            "email" => Some(Channel::Email),
            "sms" => Some(Channel::Sms),
            "telegram" => Some(Channel::Telegram),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials or endpoints missing; the channel cannot be used at
    /// all. Treated as a regular channel failure so fallback proceeds.
    #[error("configuration error: {0}")]
    Config(String),
    /// The provider rejected or failed the send call.
    #[error("{0}")]
    Provider(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// One recorded channel attempt, immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAttempt {
    pub channel: Channel,
    pub success: bool,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    pub attempts: Vec<ChannelAttempt>,
}

/// A per-channel sending adapter. `send` returns a human-readable detail
/// string on success; every failure mode is an explicit `ProviderError`.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(&self, recipient: &str, photos: &[String]) -> Result<String, ProviderError>;
}

/// Dispatch table mapping each channel to its adapter, built once at
/// startup.
#[derive(Clone)]
pub struct ChannelSet {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
}

impl ChannelSet {
    pub fn new(
        email: Arc<dyn ChannelSender>,
        sms: Arc<dyn ChannelSender>,
        telegram: Arc<dyn ChannelSender>,
    ) -> Self {
        let mut senders: HashMap<Channel, Arc<dyn ChannelSender>> = HashMap::new();
        senders.insert(Channel::Email, email);
        senders.insert(Channel::Sms, sms);
        senders.insert(Channel::Telegram, telegram);
        ChannelSet { senders }
    }

    pub fn sender(&self, channel: Channel) -> &Arc<dyn ChannelSender> {
        self.senders
            .get(&channel)
            .expect("every channel has an adapter registered at startup")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_priority_is_email_sms_telegram() {
        assert_eq!(
            Channel::PRIORITY,
            [Channel::Email, Channel::Sms, Channel::Telegram]
        );
    }

    #[test]
    fn channel_parses_wire_names() {
        assert_eq!(Channel::parse("email"), Some(Channel::Email));
        assert_eq!(Channel::parse("SMS"), Some(Channel::Sms));
        assert_eq!(Channel::parse(" telegram "), Some(Channel::Telegram));
        assert_eq!(Channel::parse("carrier-pigeon"), None);
    }

    #[test]
    fn channel_serializes_to_lowercase_names() {
        let attempt = ChannelAttempt {
            channel: Channel::Telegram,
            success: false,
            detail: "Failed to send via telegram".to_string(),
            error: Some("provider unavailable".to_string()),
        };
        let value = serde_json::to_value(&attempt).expect("serialize");
        assert_eq!(value["channel"], "telegram");
    }
}
