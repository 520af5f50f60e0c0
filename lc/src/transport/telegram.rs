//! Telegram Bot API transport
//!
//! Sends and deletes chat messages over HTTPS and maps Bot API failures onto
//! [`TransportError`] so the sender can tell throttling, dead chats and bad
//! payloads apart.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{Transport, TransportError};
use crate::config::TransportConfig;
use crate::domain::{Recipient, SendOptions};

/// Descriptions meaning the chat will never accept messages again
const RECIPIENT_GONE_MARKERS: &[&str] = &[
    "bot was blocked by the user",
    "bot was kicked",
    "user is deactivated",
    "chat not found",
    "group chat was deleted",
    "group chat was upgraded",
    "have no rights to send a message",
    "need administrator rights",
    "bot is not a member",
];

/// Descriptions meaning this payload can never be delivered
const PERMANENT_PAYLOAD_MARKERS: &[&str] = &["message is too long", "can't parse entities", "text must be non-empty"];

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SentMessageResult {
    message_id: i64,
}

/// Telegram Bot API client
pub struct TelegramTransport {
    base_url: String,
    token: String,
    http: Client,
}

impl TelegramTransport {
    /// Create a new transport from configuration
    ///
    /// Reads the bot token from the environment variable named in config.
    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        debug!(base_url = %config.base_url, "TelegramTransport::from_config: called");
        let token = config
            .get_bot_token()
            .map_err(|e| TransportError::Config(e.to_string()))?;
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(TransportError::Network)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, TransportError> {
        // reqwest errors carry the request URL, which embeds the token
        let response = self
            .http
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.without_url()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.without_url()))?;

        let parsed: ApiResponse<T> = serde_json::from_str(&text)
            .map_err(|e| TransportError::InvalidResponse(format!("{} ({}): {}", method, status, e)))?;

        if parsed.ok {
            return parsed
                .result
                .ok_or_else(|| TransportError::InvalidResponse(format!("{}: ok without result", method)));
        }

        let code = parsed.error_code.unwrap_or(status);
        let description = parsed.description.unwrap_or_default();
        let retry_after = parsed.parameters.and_then(|p| p.retry_after);
        debug!(%method, code, %description, "TelegramTransport::call: API error");
        Err(classify(code, &description, retry_after))
    }
}

/// Map a Bot API error onto the transport taxonomy
pub fn classify(code: u16, description: &str, retry_after: Option<u64>) -> TransportError {
    let lowered = description.to_lowercase();

    if code == 429 {
        return TransportError::RateLimited {
            retry_after: Duration::from_secs(retry_after.unwrap_or(5)),
        };
    }

    if code == 403 || RECIPIENT_GONE_MARKERS.iter().any(|m| lowered.contains(m)) {
        return TransportError::RecipientGone(description.to_string());
    }

    if code == 400 {
        let permanent = PERMANENT_PAYLOAD_MARKERS.iter().any(|m| lowered.contains(m));
        return TransportError::PayloadRejected {
            message: description.to_string(),
            permanent,
        };
    }

    TransportError::ApiError {
        status: code,
        message: description.to_string(),
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, recipient: &Recipient, text: &str, options: &SendOptions) -> Result<String, TransportError> {
        debug!(recipient = %recipient.id, len = text.len(), "TelegramTransport::send: called");
        let mut body = serde_json::json!({
            "chat_id": recipient.id,
            "text": text,
            "disable_notification": options.silent,
            "link_preview_options": { "is_disabled": options.disable_preview },
        });
        if let Some(mode) = &options.parse_mode {
            body["parse_mode"] = serde_json::json!(mode);
        }

        let sent: SentMessageResult = self.call("sendMessage", body).await?;
        Ok(sent.message_id.to_string())
    }

    async fn delete(&self, recipient: &str, message_id: &str) -> Result<(), TransportError> {
        debug!(%recipient, %message_id, "TelegramTransport::delete: called");
        let message_id: i64 = message_id
            .parse()
            .map_err(|_| TransportError::InvalidResponse(format!("Non-numeric message id: {}", message_id)))?;
        let body = serde_json::json!({
            "chat_id": recipient,
            "message_id": message_id,
        });

        let _: bool = self.call("deleteMessage", body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ErrorClass;

    #[test]
    fn test_classify_rate_limit() {
        let err = classify(429, "Too Many Requests: retry after 7", Some(7));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));

        let err = classify(429, "Too Many Requests", None);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_classify_recipient_gone() {
        assert_eq!(
            classify(403, "Forbidden: bot was blocked by the user", None).class(),
            ErrorClass::RecipientGone
        );
        assert_eq!(
            classify(403, "Forbidden: user is deactivated", None).class(),
            ErrorClass::RecipientGone
        );
        assert_eq!(
            classify(400, "Bad Request: chat not found", None).class(),
            ErrorClass::RecipientGone
        );
    }

    #[test]
    fn test_classify_payload() {
        assert_eq!(
            classify(400, "Bad Request: message is too long", None).class(),
            ErrorClass::PayloadRejectedPermanent
        );
        assert_eq!(
            classify(400, "Bad Request: message to delete not found", None).class(),
            ErrorClass::PayloadRejectedRecoverable
        );
    }

    #[test]
    fn test_classify_server_error() {
        let err = classify(502, "Bad Gateway", None);
        assert_eq!(err.class(), ErrorClass::Unknown);
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_network_error_hides_bot_token() {
        let transport = TelegramTransport {
            base_url: "http://127.0.0.1:1".to_string(),
            token: "123456:SECRET-TOKEN".to_string(),
            http: Client::new(),
        };

        let err = transport
            .send(&Recipient::new("1"), "hello", &SendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
        assert!(!err.to_string().contains("SECRET-TOKEN"));
        assert!(!format!("{:?}", err).contains("SECRET-TOKEN"));
    }

    #[test]
    fn test_envelope_parsing() {
        let json = r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":3}}"#;
        let parsed: ApiResponse<SentMessageResult> = serde_json::from_str(json).unwrap();
        assert!(!parsed.ok);
        assert_eq!(parsed.parameters.unwrap().retry_after, Some(3));

        let json = r#"{"ok":true,"result":{"message_id":77,"chat":{"id":1}}}"#;
        let parsed: ApiResponse<SentMessageResult> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.result.unwrap().message_id, 77);
    }
}
