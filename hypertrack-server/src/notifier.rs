//! Telegram Bot API delivery.

use async_trait::async_trait;
use hypertrack_core::processors::{DeliveryResult, Notifier};
use hypertrack_sdk::SubscriberId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Used when a 429 response carries no `retry_after`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid Bot API URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Sends plain-text messages through `sendMessage`.
pub struct TelegramNotifier {
    http_client: reqwest::Client,
    send_message_url: Url,
}

impl TelegramNotifier {
    pub fn new(api_base: &Url, bot_token: &str) -> Result<Self, NotifierError> {
        let send_message_url = api_base.join(&format!("./bot{bot_token}/sendMessage"))?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http_client,
            send_message_url,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, subscriber: SubscriberId, text: &str) -> DeliveryResult {
        let body = SendMessage {
            chat_id: subscriber.0,
            text,
            disable_web_page_preview: true,
        };
        let response = match self
            .http_client
            .post(self.send_message_url.clone())
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            // Strip the URL, it contains the token.
            Err(e) => return DeliveryResult::TransientFailure(e.without_url().to_string()),
        };

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        classify_response(status, &body)
    }
}

/// Map a Bot API response onto a delivery outcome.
pub fn classify_response(status: u16, body: &str) -> DeliveryResult {
    if (200..300).contains(&status) {
        return DeliveryResult::Success;
    }
    let parsed: ApiResponse = serde_json::from_str(body).unwrap_or_default();
    let description = parsed
        .description
        .unwrap_or_else(|| format!("HTTP {status}"));

    match status {
        429 => DeliveryResult::RateLimited {
            retry_after: parsed
                .parameters
                .and_then(|p| p.retry_after)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER),
        },
        // Blocked by the user, kicked from the group, or deactivated account.
        403 => DeliveryResult::PermanentFailure(description),
        400 if description.to_ascii_lowercase().contains("chat not found") => {
            DeliveryResult::PermanentFailure(description)
        }
        _ => DeliveryResult::TransientFailure(description),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success() {
        assert_eq!(
            classify_response(200, r#"{"ok":true,"result":{}}"#),
            DeliveryResult::Success
        );
    }

    #[test]
    fn test_rate_limit_uses_retry_after() {
        let body = r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 30","parameters":{"retry_after":30}}"#;
        assert_eq!(
            classify_response(429, body),
            DeliveryResult::RateLimited {
                retry_after: Duration::from_secs(30)
            }
        );
        assert_eq!(
            classify_response(429, "not json"),
            DeliveryResult::RateLimited {
                retry_after: DEFAULT_RETRY_AFTER
            }
        );
    }

    #[test]
    fn test_blocked_and_missing_chats_are_permanent() {
        let blocked = r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#;
        assert!(matches!(
            classify_response(403, blocked),
            DeliveryResult::PermanentFailure(d) if d.contains("blocked")
        ));
        let missing = r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#;
        assert!(matches!(
            classify_response(400, missing),
            DeliveryResult::PermanentFailure(_)
        ));
    }

    #[test]
    fn test_other_errors_are_transient() {
        let bad = r#"{"ok":false,"error_code":400,"description":"Bad Request: message is too long"}"#;
        assert!(matches!(
            classify_response(400, bad),
            DeliveryResult::TransientFailure(_)
        ));
        assert_eq!(
            classify_response(502, ""),
            DeliveryResult::TransientFailure("HTTP 502".to_string())
        );
    }

    #[test]
    fn test_send_message_url_keeps_base_path() {
        let base = Url::parse("https://api.telegram.org/").unwrap();
        let notifier = TelegramNotifier::new(&base, "123:abc").unwrap();
        assert_eq!(
            notifier.send_message_url.as_str(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }
}
