use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InputFile, Recipient};
use tracing::warn;

use crate::config::Config;
use crate::delivery::{ChannelSender, ProviderError};
use crate::utils::http::{get_http_client, get_upload_client};

/// Outbound Telegram calls. The production implementation wraps a
/// teloxide `Bot`; tests substitute a recording fake.
#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn send_message(&self, to: &Recipient, text: &str) -> Result<(), ProviderError>;

    /// Download the staged photo and re-upload it as an image with a
    /// caption.
    async fn upload_photo(
        &self,
        to: &Recipient,
        photo_url: &str,
        caption: &str,
    ) -> Result<(), ProviderError>;
}

pub struct BotApi {
    bot: Option<Bot>,
    public_host: String,
    internal_base: String,
}

impl BotApi {
    pub fn new(config: &Config) -> Self {
        let bot = if config.telegram_bot_token.trim().is_empty() {
            None
        } else {
            Some(Bot::with_client(
                config.telegram_bot_token.clone(),
                get_upload_client().clone(),
            ))
        };
        BotApi {
            bot,
            public_host: config.minio_public_endpoint.clone(),
            internal_base: config.minio_internal_base(),
        }
    }

    fn bot(&self) -> Result<&Bot, ProviderError> {
        self.bot
            .as_ref()
            .ok_or_else(|| ProviderError::Config("TELEGRAM_BOT_TOKEN is not set".to_string()))
    }
}

/// Presigned URLs carry the public endpoint; the worker reaches the
/// object store through the internal network address instead.
pub fn rewrite_public_to_internal(url: &str, public_host: &str, internal_base: &str) -> String {
    url.replace(&format!("http://{public_host}"), internal_base)
        .replace(&format!("https://{public_host}"), internal_base)
}

#[async_trait]
impl TelegramApi for BotApi {
    async fn send_message(&self, to: &Recipient, text: &str) -> Result<(), ProviderError> {
        self.bot()?
            .send_message(to.clone(), text)
            .await
            .map_err(|err| ProviderError::Provider(format!("Telegram API error: {err}")))?;
        Ok(())
    }

    async fn upload_photo(
        &self,
        to: &Recipient,
        photo_url: &str,
        caption: &str,
    ) -> Result<(), ProviderError> {
        let bot = self.bot()?;

        let internal_url =
            rewrite_public_to_internal(photo_url, &self.public_host, &self.internal_base);
        let response = get_http_client().get(&internal_url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Provider(format!(
                "photo download failed with status {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await?;

        bot.send_photo(
            to.clone(),
            InputFile::memory(bytes.to_vec()).file_name("photo.jpg"),
        )
        .caption(caption.to_string())
        .await
        .map_err(|err| ProviderError::Provider(format!("Telegram API error: {err}")))?;
        Ok(())
    }
}

/// Numeric chat id, or a handle normalized to a leading `@`.
pub fn parse_recipient(recipient: &str) -> Recipient {
    let trimmed = recipient.trim();
    if let Ok(id) = trimmed.parse::<i64>() {
        return Recipient::Id(ChatId(id));
    }
    let handle = trimmed.trim_start_matches('@');
    Recipient::ChannelUsername(format!("@{handle}"))
}

pub struct TelegramSender {
    api: Arc<dyn TelegramApi>,
}

impl TelegramSender {
    pub fn new(api: Arc<dyn TelegramApi>) -> Self {
        TelegramSender { api }
    }
}

#[async_trait]
impl ChannelSender for TelegramSender {
    async fn send(&self, recipient: &str, photos: &[String]) -> Result<String, ProviderError> {
        let to = parse_recipient(recipient);

        let intro = format!(
            "📸 Your AI Photo Booth photos ({} photo{}):",
            photos.len(),
            if photos.len() != 1 { "s" } else { "" }
        );
        self.api.send_message(&to, &intro).await?;

        for (idx, photo_url) in photos.iter().enumerate() {
            let caption = format!("Photo {} of {}", idx + 1, photos.len());
            if let Err(err) = self.api.upload_photo(&to, photo_url, &caption).await {
                // Leave a usable link behind, then fail the channel.
                // Photos already uploaded are intentionally not rolled
                // back.
                let substitute = format!("Photo {}: {}", idx + 1, photo_url);
                if let Err(text_err) = self.api.send_message(&to, &substitute).await {
                    warn!(error = %text_err, "substitute link message failed");
                }
                return Err(ProviderError::Provider(format!(
                    "Failed to send photo {}: {}",
                    idx + 1,
                    err
                )));
            }
        }

        let display = match &to {
            Recipient::ChannelUsername(username) => username.clone(),
            Recipient::Id(_) => recipient.trim().to_string(),
        };
        Ok(format!(
            "Delivered {} photo(s) to {} on Telegram",
            photos.len(),
            display
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SentItem {
        Text(String),
        Photo { url: String, caption: String },
    }

    /// Recording fake. `fail_upload_at` makes the n-th upload (1-based)
    /// fail.
    pub struct RecordingApi {
        pub sent: Mutex<Vec<SentItem>>,
        pub fail_upload_at: Option<usize>,
        uploads_seen: Mutex<usize>,
    }

    impl RecordingApi {
        pub fn new(fail_upload_at: Option<usize>) -> Self {
            RecordingApi {
                sent: Mutex::new(Vec::new()),
                fail_upload_at,
                uploads_seen: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl TelegramApi for RecordingApi {
        async fn send_message(&self, _to: &Recipient, text: &str) -> Result<(), ProviderError> {
            self.sent.lock().push(SentItem::Text(text.to_string()));
            Ok(())
        }

        async fn upload_photo(
            &self,
            _to: &Recipient,
            photo_url: &str,
            caption: &str,
        ) -> Result<(), ProviderError> {
            let mut seen = self.uploads_seen.lock();
            *seen += 1;
            if self.fail_upload_at == Some(*seen) {
                return Err(ProviderError::Provider("upload rejected".to_string()));
            }
            self.sent.lock().push(SentItem::Photo {
                url: photo_url.to_string(),
                caption: caption.to_string(),
            });
            Ok(())
        }
    }

    fn photo_urls(count: usize) -> Vec<String> {
        (0..count)
            .map(|idx| format!("http://localhost:9000/photobooth/photos/{idx}.jpg"))
            .collect()
    }

    #[test]
    fn numeric_recipients_become_chat_ids() {
        assert_eq!(parse_recipient("12345"), Recipient::Id(ChatId(12345)));
        assert_eq!(
            parse_recipient("@alice"),
            Recipient::ChannelUsername("@alice".to_string())
        );
        assert_eq!(
            parse_recipient("alice"),
            Recipient::ChannelUsername("@alice".to_string())
        );
    }

    #[test]
    fn presigned_urls_are_rewritten_to_the_internal_endpoint() {
        let rewritten = rewrite_public_to_internal(
            "https://localhost:9000/photobooth/photos/a.jpg?X-Amz-Expires=86400",
            "localhost:9000",
            "http://minio:9000",
        );
        assert_eq!(
            rewritten,
            "http://minio:9000/photobooth/photos/a.jpg?X-Amz-Expires=86400"
        );
    }

    #[tokio::test]
    async fn delivers_intro_then_every_photo_in_order() {
        let api = Arc::new(RecordingApi::new(None));
        let sender = TelegramSender::new(api.clone());

        let detail = sender
            .send("@alice", &photo_urls(2))
            .await
            .expect("delivery succeeds");

        assert_eq!(detail, "Delivered 2 photo(s) to @alice on Telegram");
        let sent = api.sent.lock();
        assert_eq!(sent.len(), 3);
        assert!(matches!(&sent[0], SentItem::Text(text) if text.contains("2 photos")));
        assert!(
            matches!(&sent[1], SentItem::Photo { caption, .. } if caption == "Photo 1 of 2")
        );
        assert!(
            matches!(&sent[2], SentItem::Photo { caption, .. } if caption == "Photo 2 of 2")
        );
    }

    #[tokio::test]
    async fn failed_upload_sends_substitute_link_then_fails_the_channel() {
        let api = Arc::new(RecordingApi::new(Some(2)));
        let sender = TelegramSender::new(api.clone());
        let photos = photo_urls(3);

        let err = sender.send("@alice", &photos).await.expect_err("must fail");
        assert!(err.to_string().contains("Failed to send photo 2"));

        let sent = api.sent.lock();
        // Intro, photo 1, substitute link for photo 2. Photo 3 is never
        // attempted and photo 1 stays delivered.
        assert_eq!(sent.len(), 3);
        assert!(matches!(&sent[1], SentItem::Photo { caption, .. } if caption == "Photo 1 of 3"));
        assert_eq!(
            sent[2],
            SentItem::Text(format!("Photo 2: {}", photos[1]))
        );
    }
}
