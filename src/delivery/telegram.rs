use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::warn;

use super::ChatTransport;
use crate::texts;
use crate::types::{Button, ChatId, EventKind, InboundEvent, Outgoing, UserId};

/// Telegram rejects messages longer than this many characters.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawUpdate {
    update_id: i64,
    message: Option<RawMessage>,
    callback_query: Option<RawCallback>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    from: Option<RawUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCallback {
    id: String,
    from: RawUser,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: i64,
}

#[derive(Serialize)]
struct InlineButton {
    text: String,
    callback_data: String,
}

/// One polled update, already mapped to a bot event when it carries one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub update_id: i64,
    pub event: Option<InboundEvent>,
    /// Callback queries must be answered to stop the client spinner.
    pub callback_id: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct TelegramBot {
    client: reqwest::Client,
    endpoint: String,
}

impl TelegramBot {
    pub fn new(client: reqwest::Client, base_url: &str, token: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/bot{token}", base_url.trim_end_matches('/')),
        }
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let raw: Vec<RawUpdate> = self
            .call(
                "getUpdates",
                &json!({
                    "offset": offset,
                    "timeout": timeout_secs,
                    "allowed_updates": ["message", "callback_query"],
                }),
            )
            .await?;
        Ok(raw.into_iter().map(map_update).collect())
    }

    pub async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let _: bool = self
            .call("answerCallbackQuery", &json!({ "callback_query_id": callback_id }))
            .await?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &serde_json::Value) -> Result<T> {
        let resp = self
            .client
            .post(format!("{}/{method}", self.endpoint))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Telegram {method} request failed"))?;
        let status = resp.status();
        let envelope: Envelope<T> = resp
            .json()
            .await
            .with_context(|| format!("failed to parse Telegram {method} response ({status})"))?;
        if !envelope.ok {
            return Err(anyhow!(
                "Telegram {method} error {status}: {}",
                envelope.description.unwrap_or_default()
            ));
        }
        envelope
            .result
            .ok_or_else(|| anyhow!("Telegram {method} returned no result"))
    }
}

#[async_trait]
impl ChatTransport for TelegramBot {
    async fn send(&self, chat: ChatId, msg: &Outgoing) -> Result<()> {
        let body = send_message_body(chat, msg);
        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }

    fn max_message_len(&self) -> usize {
        TELEGRAM_MAX_MESSAGE_LEN
    }
}

pub(crate) fn send_message_body(chat: ChatId, msg: &Outgoing) -> serde_json::Value {
    let mut body = json!({ "chat_id": chat.0, "text": msg.text });
    if !msg.keyboard.is_empty() {
        let rows: Vec<Vec<InlineButton>> = msg
            .keyboard
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| InlineButton {
                        text: texts::button_label(*b),
                        callback_data: b.callback_data(),
                    })
                    .collect()
            })
            .collect();
        body["reply_markup"] = json!({ "inline_keyboard": rows });
    }
    body
}

pub(crate) fn map_update(raw: RawUpdate) -> Update {
    if let Some(cb) = raw.callback_query {
        let user = UserId(cb.from.id);
        let event = match cb.data.as_deref().map(|d| (d, Button::parse(d))) {
            Some((_, Some(button))) => Some(InboundEvent::new(user, EventKind::Button(button))),
            Some((data, None)) => {
                warn!(user = user.0, data, "ignoring unknown callback data");
                None
            }
            None => None,
        };
        return Update {
            update_id: raw.update_id,
            event,
            callback_id: Some(cb.id),
        };
    }

    let event = raw.message.and_then(|m| {
        let user = UserId(m.from?.id);
        Some(match m.text {
            Some(text) => InboundEvent::from_text(user, &text),
            None => InboundEvent::new(user, EventKind::Media),
        })
    });
    Update {
        update_id: raw.update_id,
        event,
        callback_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Command, ServiceKind};

    fn parse(raw: &str) -> Update {
        map_update(serde_json::from_str(raw).expect("valid update json"))
    }

    #[test]
    fn text_message_maps_to_command_or_text() {
        let u = parse(r#"{"update_id":5,"message":{"from":{"id":9},"chat":{"id":9},"text":"/start"}}"#);
        assert_eq!(
            u.event,
            Some(InboundEvent::new(UserId(9), EventKind::Command(Command::Start)))
        );
        let u = parse(r#"{"update_id":6,"message":{"from":{"id":9},"chat":{"id":9},"text":"Анна"}}"#);
        assert_eq!(
            u.event,
            Some(InboundEvent::new(UserId(9), EventKind::Text("Анна".into())))
        );
    }

    #[test]
    fn photo_maps_to_media() {
        let u = parse(r#"{"update_id":7,"message":{"from":{"id":3},"chat":{"id":3},"photo":[]}}"#);
        assert_eq!(u.event, Some(InboundEvent::new(UserId(3), EventKind::Media)));
    }

    #[test]
    fn callback_maps_to_button_and_keeps_id() {
        let u = parse(
            r#"{"update_id":8,"callback_query":{"id":"abc","from":{"id":4},"data":"service:matrix"}}"#,
        );
        assert_eq!(u.callback_id.as_deref(), Some("abc"));
        assert_eq!(
            u.event,
            Some(InboundEvent::new(
                UserId(4),
                EventKind::Button(Button::Service(ServiceKind::Matrix))
            ))
        );
    }

    #[test]
    fn unknown_callback_is_dropped() {
        let u = parse(r#"{"update_id":9,"callback_query":{"id":"x","from":{"id":4},"data":"tarot"}}"#);
        assert!(u.event.is_none());
        assert_eq!(u.callback_id.as_deref(), Some("x"));
    }

    #[test]
    fn keyboard_is_rendered_inline() {
        let msg = Outgoing::with_keyboard("Выберите", vec![vec![Button::Confirm, Button::Cancel]]);
        let body = send_message_body(ChatId(1), &msg);
        assert_eq!(body["reply_markup"]["inline_keyboard"][0][1]["callback_data"], "cancel");
        assert_eq!(body["reply_markup"]["inline_keyboard"][0][0]["text"], "Подтвердить");
        let plain = send_message_body(ChatId(1), &Outgoing::text("hi"));
        assert!(plain.get("reply_markup").is_none());
    }
}
