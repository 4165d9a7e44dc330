use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Config;
use crate::delivery::{ChannelSender, ProviderError};
use crate::utils::http::get_http_client;

// Twilio rejects bodies over ~1600 characters.
const SMS_BODY_LIMIT: usize = 1500;

pub struct SmsSender {
    account_sid: String,
    auth_token: String,
    messaging_service_sid: String,
    from_number: String,
    api_base: String,
}

impl SmsSender {
    pub fn new(config: &Config) -> Self {
        SmsSender {
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            messaging_service_sid: config.twilio_messaging_service_sid.clone(),
            from_number: config.twilio_from_number.clone(),
            api_base: config.twilio_api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Raw message send, shared by the channel adapter and the
    /// out-of-band status notice.
    pub async fn send_message(&self, recipient: &str, body: &str) -> Result<String, ProviderError> {
        if self.account_sid.trim().is_empty() || self.auth_token.trim().is_empty() {
            return Err(ProviderError::Config(
                "Twilio credentials are not configured".to_string(),
            ));
        }
        if self.messaging_service_sid.trim().is_empty() && self.from_number.trim().is_empty() {
            return Err(ProviderError::Config(
                "Provide TWILIO_MESSAGING_SERVICE_SID or TWILIO_FROM_NUMBER".to_string(),
            ));
        }

        let mut form: HashMap<&str, String> = HashMap::new();
        form.insert("To", recipient.to_string());
        form.insert("Body", truncate_body(body).to_string());
        if !self.messaging_service_sid.trim().is_empty() {
            form.insert("MessagingServiceSid", self.messaging_service_sid.clone());
        } else {
            form.insert("From", self.from_number.clone());
        }

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        );
        let response = get_http_client()
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Provider(format!(
                "Twilio API error {status}: {body}"
            )));
        }

        let payload: Value = response.json().await.unwrap_or(Value::Null);
        Ok(payload
            .get("sid")
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(SMS_BODY_LIMIT) {
        Some((offset, _)) => &body[..offset],
        None => body,
    }
}

/// Summary line plus the first photo's URL; remaining photos are only
/// counted, never linked.
fn compose_body(photos: &[String]) -> String {
    let link = photos.first().map(String::as_str).unwrap_or("");
    let extra = photos.len().saturating_sub(1);
    let mut summary = format!(
        "Your AI Photo Booth photo{}",
        if photos.len() != 1 { "s" } else { "" }
    );
    if extra > 0 {
        summary.push_str(&format!(" (+{extra} more)"));
    }
    let tail = if link.is_empty() {
        "Check your email for attachments."
    } else {
        link
    };
    format!("{summary}. {tail}")
}

#[async_trait]
impl ChannelSender for SmsSender {
    async fn send(&self, recipient: &str, photos: &[String]) -> Result<String, ProviderError> {
        let body = compose_body(photos);
        self.send_message(recipient, &body).await?;
        Ok(format!(
            "Sent download link(s) for {} photo(s) via SMS to {}",
            photos.len(),
            recipient
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender_with(
        account_sid: &str,
        auth_token: &str,
        messaging_sid: &str,
        from_number: &str,
    ) -> SmsSender {
        let mut config = Config::load().expect("config");
        config.twilio_account_sid = account_sid.to_string();
        config.twilio_auth_token = auth_token.to_string();
        config.twilio_messaging_service_sid = messaging_sid.to_string();
        config.twilio_from_number = from_number.to_string();
        SmsSender::new(&config)
    }

    #[tokio::test]
    async fn missing_credentials_fail_immediately() {
        let sender = sender_with("", "", "MG123", "");
        let err = sender
            .send("+15550100", &[])
            .await
            .expect_err("must fail");
        assert!(matches!(err, ProviderError::Config(_)));
    }

    #[tokio::test]
    async fn missing_sender_identity_fails_immediately() {
        let sender = sender_with("AC123", "token", "", "");
        let err = sender
            .send("+15550100", &[])
            .await
            .expect_err("must fail");
        assert!(matches!(err, ProviderError::Config(_)));
    }

    #[test]
    fn single_photo_body_carries_the_link() {
        let body = compose_body(&["https://cdn.example.com/a.jpg".to_string()]);
        assert_eq!(
            body,
            "Your AI Photo Booth photo. https://cdn.example.com/a.jpg"
        );
    }

    #[test]
    fn extra_photos_are_counted_not_linked() {
        let photos = vec![
            "https://cdn.example.com/a.jpg".to_string(),
            "https://cdn.example.com/b.jpg".to_string(),
            "https://cdn.example.com/c.jpg".to_string(),
        ];
        let body = compose_body(&photos);
        assert_eq!(
            body,
            "Your AI Photo Booth photos (+2 more). https://cdn.example.com/a.jpg"
        );
    }

    #[test]
    fn empty_photo_list_omits_the_link() {
        let body = compose_body(&[]);
        assert_eq!(
            body,
            "Your AI Photo Booth photos. Check your email for attachments."
        );
    }

    #[test]
    fn body_is_truncated_to_the_provider_limit() {
        let long = "x".repeat(SMS_BODY_LIMIT + 200);
        assert_eq!(truncate_body(&long).chars().count(), SMS_BODY_LIMIT);
        let short = "hello";
        assert_eq!(truncate_body(short), "hello");
    }
}
