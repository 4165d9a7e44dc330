use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Body, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, warn};

use crate::config::Config;
use crate::delivery::{ChannelSender, ProviderError};
use crate::utils::http::get_http_client;

const EMAIL_SUBJECT: &str = "Your AI Photo Booth photos";
const EMAIL_BODY: &str = "Thanks for using AI Photo Booth! Your photos are attached.";

pub struct EmailSender {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: String,
    max_attachment_bytes: usize,
}

impl EmailSender {
    pub fn new(config: &Config) -> Self {
        let transport = build_transport(config);
        EmailSender {
            transport,
            from: config.smtp_from.clone(),
            max_attachment_bytes: config.email_attachment_max_bytes,
        }
    }

    fn transport(&self) -> Result<&AsyncSmtpTransport<Tokio1Executor>, ProviderError> {
        if self.from.trim().is_empty() {
            return Err(ProviderError::Config(
                "DEFAULT_FROM_EMAIL is not set".to_string(),
            ));
        }
        self.transport
            .as_ref()
            .ok_or_else(|| ProviderError::Config("SMTP_HOST is not set".to_string()))
    }

    /// Plain-text message without attachments, used by broadcasts.
    pub async fn send_plain(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), ProviderError> {
        let transport = self.transport()?;
        let message = Message::builder()
            .from(parse_mailbox(&self.from)?)
            .to(parse_mailbox(recipient)?)
            .subject(subject)
            .singlepart(SinglePart::plain(body.to_string()))
            .map_err(|err| ProviderError::Provider(format!("failed to build message: {err}")))?;

        transport
            .send(message)
            .await
            .map_err(|err| ProviderError::Provider(format!("SMTP send failed: {err}")))?;
        Ok(())
    }

    /// Download one photo for attachment. Failures here never fail the
    /// channel; the photo is simply skipped.
    async fn fetch_attachment(&self, url: &str) -> Option<(Vec<u8>, String)> {
        let response = match get_http_client().get(url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "attachment fetch failed, skipping");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "attachment fetch failed, skipping");
            return None;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "attachment body read failed, skipping");
                return None;
            }
        };
        if bytes.len() > self.max_attachment_bytes {
            warn!(size = bytes.len(), "attachment too large, skipping");
            return None;
        }

        Some((bytes.to_vec(), content_type))
    }
}

fn build_transport(config: &Config) -> Option<AsyncSmtpTransport<Tokio1Executor>> {
    if config.smtp_host.trim().is_empty() {
        return None;
    }

    let builder = match AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host) {
        Ok(builder) => builder.port(config.smtp_port),
        Err(err) => {
            warn!(error = %err, "failed to build SMTP transport");
            return None;
        }
    };

    let builder = if config.smtp_username.trim().is_empty() {
        builder
    } else {
        builder.credentials(Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.clone(),
        ))
    };

    Some(builder.build())
}

fn parse_mailbox(value: &str) -> Result<lettre::message::Mailbox, ProviderError> {
    value
        .parse()
        .map_err(|err| ProviderError::Provider(format!("invalid mail address {value}: {err}")))
}

fn attachment_content_type(raw: &str) -> ContentType {
    ContentType::parse(raw)
        .unwrap_or_else(|_| ContentType::parse("application/octet-stream").expect("static mime"))
}

#[async_trait]
impl ChannelSender for EmailSender {
    async fn send(&self, recipient: &str, photos: &[String]) -> Result<String, ProviderError> {
        let transport = self.transport()?;

        let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(EMAIL_BODY.to_string()));
        let mut attachments_added = 0usize;

        for (idx, url) in photos.iter().enumerate() {
            let Some((bytes, content_type)) = self.fetch_attachment(url).await else {
                continue;
            };
            let filename = format!("photo_{}.jpg", idx + 1);
            let part = Attachment::new(filename)
                .body(Body::new(bytes), attachment_content_type(&content_type));
            multipart = multipart.singlepart(part);
            attachments_added += 1;
        }
        debug!(
            total = photos.len(),
            attached = attachments_added,
            "prepared mail attachments"
        );

        let message = Message::builder()
            .from(parse_mailbox(&self.from)?)
            .to(parse_mailbox(recipient)?)
            .subject(EMAIL_SUBJECT)
            .multipart(multipart)
            .map_err(|err| ProviderError::Provider(format!("failed to build message: {err}")))?;

        transport
            .send(message)
            .await
            .map_err(|err| ProviderError::Provider(format!("SMTP send failed: {err}")))?;

        Ok(format!(
            "Sent {} photo(s) to {} via email (attachments: {})",
            photos.len(),
            recipient,
            attachments_added
        ))
    }
}
