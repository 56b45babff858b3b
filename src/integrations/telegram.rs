//! Telegram Bot API notifier.
//!
//! Text goes through `sendMessage`, single invoices through `sendDocument` and group
//! deliveries through `sendMediaGroup`, all as multipart or JSON POSTs. Transport
//! failures, 5xx and 429 replies are reported as retryable network errors; any other
//! reply is returned as a response with the API's `description` as detail.

use super::notifier::{AlbumItem, Notification, Notifier, NotifierError, NotifierResponse};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, multipart};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

/// Common shape of every Bot API reply.
#[derive(Debug, Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

/// Notifier backed by the Telegram Bot API.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: String,
}

impl TelegramNotifier {
    /// Creates a notifier for the bot identified by `token`.
    #[must_use]
    pub fn new(api_base: &str, token: String) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    async fn post_json(&self, method: &str, body: &Value) -> Result<TelegramReply, NotifierError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;
        read_reply(response).await
    }

    async fn post_form(
        &self,
        method: &str,
        form: multipart::Form,
    ) -> Result<TelegramReply, NotifierError> {
        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(classify_transport_error)?;
        read_reply(response).await
    }
}

fn classify_transport_error(error: reqwest::Error) -> NotifierError {
    if error.is_builder() {
        NotifierError::Invalid(error.to_string())
    } else {
        NotifierError::Network(error.to_string())
    }
}

/// Whether an HTTP status means the server side may recover.
fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

async fn read_reply(response: reqwest::Response) -> Result<TelegramReply, NotifierError> {
    let status = response.status();
    if is_transient(status) {
        return Err(NotifierError::Network(format!("Telegram returned {status}")));
    }
    response
        .json::<TelegramReply>()
        .await
        .map_err(|e| NotifierError::Invalid(format!("Unreadable Telegram reply ({status}): {e}")))
}

fn file_part(file_name: &str, bytes: &[u8]) -> multipart::Part {
    multipart::Part::bytes(bytes.to_vec()).file_name(file_name.to_string())
}

/// `media` field of a `sendMediaGroup` call, referencing parts `file0..fileN`.
fn media_group_payload(items: &[AlbumItem]) -> Value {
    Value::Array(
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let mut media = json!({
                    "type": "document",
                    "media": format!("attach://file{index}"),
                });
                if let Some(caption) = &item.caption {
                    media["caption"] = Value::String(caption.clone());
                }
                media
            })
            .collect(),
    )
}

fn into_response(reply: TelegramReply) -> NotifierResponse {
    if reply.ok {
        NotifierResponse::success()
    } else {
        NotifierResponse::failure(
            reply
                .description
                .unwrap_or_else(|| "Telegram rejected the request".to_string()),
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(
        &self,
        target: &str,
        notification: &Notification,
    ) -> Result<NotifierResponse, NotifierError> {
        debug!(chat_id = target, kind = notification.kind(), "Calling Telegram");
        let reply = match notification {
            Notification::Text(text) => {
                self.post_json("sendMessage", &json!({ "chat_id": target, "text": text }))
                    .await?
            }
            Notification::Document {
                file_name,
                bytes,
                caption,
            } => {
                let form = multipart::Form::new()
                    .text("chat_id", target.to_string())
                    .text("caption", caption.clone())
                    .part("document", file_part(file_name, bytes));
                self.post_form("sendDocument", form).await?
            }
            Notification::Album(items) => {
                if items.is_empty() {
                    return Err(NotifierError::Invalid("Album is empty".to_string()));
                }
                let mut form = multipart::Form::new()
                    .text("chat_id", target.to_string())
                    .text("media", media_group_payload(items).to_string());
                for (index, item) in items.iter().enumerate() {
                    form = form.part(format!("file{index}"), file_part(&item.file_name, &item.bytes));
                }
                self.post_form("sendMediaGroup", form).await?
            }
        };
        Ok(into_response(reply))
    }

    async fn health_check(&self) -> Result<String, NotifierError> {
        let reply = self.post_json("getMe", &json!({})).await?;
        if !reply.ok {
            return Err(NotifierError::Invalid(
                reply
                    .description
                    .unwrap_or_else(|| "getMe failed".to_string()),
            ));
        }
        Ok(reply
            .result
            .as_ref()
            .and_then(|r| r.get("username"))
            .and_then(Value::as_str)
            .map_or_else(|| "unknown bot".to_string(), |name| format!("@{name}")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_method_url() {
        let notifier = TelegramNotifier::new("https://api.telegram.org/", "123:abc".to_string());
        assert_eq!(
            notifier.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_media_group_payload() {
        let items = vec![
            AlbumItem {
                file_name: "a.txt".to_string(),
                bytes: vec![1],
                caption: Some("Invoices 2025-02".to_string()),
            },
            AlbumItem {
                file_name: "b.txt".to_string(),
                bytes: vec![2],
                caption: None,
            },
        ];
        let payload = media_group_payload(&items);
        assert_eq!(payload[0]["media"], "attach://file0");
        assert_eq!(payload[0]["caption"], "Invoices 2025-02");
        assert_eq!(payload[1]["type"], "document");
        assert!(payload[1].get("caption").is_none());
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient(StatusCode::BAD_REQUEST));
        assert!(!is_transient(StatusCode::OK));
    }

    #[test]
    fn test_reply_mapping() {
        let reply: TelegramReply =
            serde_json::from_str(r#"{"ok":false,"description":"Bad Request: chat not found"}"#)
                .unwrap();
        assert_eq!(
            into_response(reply),
            NotifierResponse::failure("Bad Request: chat not found".to_string())
        );

        let reply: TelegramReply = serde_json::from_str(r#"{"ok":true,"result":{}}"#).unwrap();
        assert!(into_response(reply).ok);
    }
}
