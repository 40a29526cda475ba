//! Telegram Bot API transport adapter.
//!
//! Long polling over getUpdates, message delivery, inline keyboards and photo
//! download. The rest of the daemon talks to the [`Gateway`] trait; only this
//! module knows the Bot API wire shapes.

use anyhow::Result;
use async_trait::async_trait;
use herd_shared::error::HerdError;
use herd_shared::event::{CommandKind, Event, Profile};
use herd_shared::model::{PhotoRef, UserId};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::TransportConfig;

/// One inline-keyboard button: a visible label and a callback payload.
#[derive(Debug, Clone)]
pub struct Action {
    pub label: String,
    pub data: String,
}

impl Action {
    pub fn new(label: &str, data: String) -> Self {
        Self {
            label: label.to_string(),
            data,
        }
    }
}

/// Outbound side of the transport, as the dispatcher and broadcaster see it.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn send_text(
        &self,
        user: &UserId,
        text: &str,
        actions: &[Action],
    ) -> Result<(), HerdError>;

    async fn send_photo(
        &self,
        user: &UserId,
        photo: &PhotoRef,
        caption: &str,
        actions: &[Action],
    ) -> Result<(), HerdError>;

    async fn download_photo(&self, photo: &PhotoRef) -> Result<Vec<u8>, HerdError>;

    async fn answer_callback(&self, callback_id: &str) -> Result<(), HerdError>;
}

/// A polled update: its cursor position and the event it translated to, if
/// it was one we handle.
#[derive(Debug)]
pub struct Update {
    pub update_id: i64,
    pub event: Option<Event>,
}

pub struct TelegramGateway {
    client: reqwest::Client,
    api_base: String,
    token: String,
    poll_timeout_secs: u64,
}

impl TelegramGateway {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    /// Fetch the next batch of updates, waiting up to the long-poll window.
    pub async fn poll_updates(&self, offset: i64) -> Result<Vec<Update>, HerdError> {
        let payload = json!({
            "offset": offset,
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        let url = self.method_url("getUpdates");
        let response = self
            .client
            .post(&url)
            .json(&payload)
            // The request must outlive the long-poll window.
            .timeout(Duration::from_secs(self.poll_timeout_secs + 5))
            .send()
            .await
            .map_err(|e| HerdError::Transport(format!("getUpdates: {}", e)))?;
        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|e| HerdError::Transport(format!("getUpdates: {}", e)))?;
        let result = envelope.into_result("getUpdates")?;
        let raw: Vec<ApiUpdate> = serde_json::from_value(result)
            .map_err(|e| HerdError::Transport(format!("getUpdates decode: {}", e)))?;
        Ok(raw.into_iter().map(translate).collect())
    }

    /// Register the command menu with the transport (start, menu, enroll,
    /// list, identify) and switch the chat menu button to the command list.
    pub async fn set_command_menu(&self) -> Result<(), HerdError> {
        let commands = json!({
            "commands": [
                { "command": "start", "description": "Start the bot" },
                { "command": "menu", "description": "Show main menu" },
                { "command": "enroll", "description": "Register a new animal" },
                { "command": "list", "description": "List your animals" },
                { "command": "identify", "description": "Identify an animal from a photo" },
            ]
        });
        self.call("setMyCommands", commands).await?;
        self.call(
            "setChatMenuButton",
            json!({ "menu_button": { "type": "commands" } }),
        )
        .await?;
        Ok(())
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call(&self, method: &str, payload: Value) -> Result<Value, HerdError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await
            .map_err(|e| HerdError::Transport(format!("{}: {}", method, e)))?;
        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|e| HerdError::Transport(format!("{}: {}", method, e)))?;
        envelope.into_result(method)
    }
}

#[async_trait]
impl Gateway for TelegramGateway {
    async fn send_text(
        &self,
        user: &UserId,
        text: &str,
        actions: &[Action],
    ) -> Result<(), HerdError> {
        let mut payload = json!({ "chat_id": user, "text": text });
        if !actions.is_empty() {
            payload["reply_markup"] = keyboard(actions);
        }
        self.call("sendMessage", payload).await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        user: &UserId,
        photo: &PhotoRef,
        caption: &str,
        actions: &[Action],
    ) -> Result<(), HerdError> {
        let mut payload = json!({ "chat_id": user, "photo": photo, "caption": caption });
        if !actions.is_empty() {
            payload["reply_markup"] = keyboard(actions);
        }
        self.call("sendPhoto", payload).await?;
        Ok(())
    }

    async fn download_photo(&self, photo: &PhotoRef) -> Result<Vec<u8>, HerdError> {
        let result = self.call("getFile", json!({ "file_id": photo })).await?;
        let file: ApiFile = serde_json::from_value(result)
            .map_err(|e| HerdError::Transport(format!("getFile decode: {}", e)))?;
        let path = file
            .file_path
            .ok_or_else(|| HerdError::Transport("getFile returned no path".to_string()))?;
        let url = format!("{}/file/bot{}/{}", self.api_base, self.token, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| HerdError::Transport(format!("file download: {}", e)))?;
        if !response.status().is_success() {
            return Err(HerdError::Transport(format!(
                "file download returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| HerdError::Transport(format!("file download: {}", e)))?;
        debug!("Downloaded photo {} ({} bytes)", photo, bytes.len());
        Ok(bytes.to_vec())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), HerdError> {
        self.call(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback_id }),
        )
        .await?;
        Ok(())
    }
}

/// One button per row, matching the main-menu layout.
fn keyboard(actions: &[Action]) -> Value {
    let rows: Vec<Value> = actions
        .iter()
        .map(|a| json!([{ "text": a.label, "callback_data": a.data }]))
        .collect();
    json!({ "inline_keyboard": rows })
}

// ---------------------------------------------------------------------------
// Bot API wire shapes (the subset we consume)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

impl ApiEnvelope {
    fn into_result(self, method: &str) -> Result<Value, HerdError> {
        if !self.ok {
            return Err(HerdError::Transport(format!(
                "{}: {}",
                method,
                self.description.unwrap_or_else(|| "request failed".to_string())
            )));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Deserialize)]
struct ApiUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<ApiMessage>,
    #[serde(default)]
    callback_query: Option<ApiCallback>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    from: Option<ApiUser>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    photo: Option<Vec<ApiPhotoSize>>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: i64,
    first_name: String,
    #[serde(default)]
    last_name: Option<String>,
}

impl ApiUser {
    fn profile(&self) -> Profile {
        let name = match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        };
        Profile {
            id: self.id.to_string(),
            name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiPhotoSize {
    file_id: String,
    #[serde(default)]
    file_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiCallback {
    id: String,
    from: ApiUser,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiFile {
    #[serde(default)]
    file_path: Option<String>,
}

/// Translate a raw update into an event, or None for updates we ignore
/// (joins, edits, stickers and the like).
fn translate(update: ApiUpdate) -> Update {
    let event = match (update.message, update.callback_query) {
        (Some(message), _) => translate_message(message),
        (None, Some(callback)) => translate_callback(callback),
        (None, None) => None,
    };
    Update {
        update_id: update.update_id,
        event,
    }
}

fn translate_message(message: ApiMessage) -> Option<Event> {
    let from = message.from.as_ref()?.profile();
    if let Some(sizes) = message.photo {
        // Sizes are ordered small to large; take the largest available.
        let best = sizes
            .into_iter()
            .max_by_key(|s| s.file_size.unwrap_or(0))?;
        return Some(Event::Photo {
            from,
            photo: best.file_id,
        });
    }
    let text = message.text?;
    match CommandKind::parse(&text) {
        Some(kind) => Some(Event::Command { from, kind }),
        None => Some(Event::Text { from, text }),
    }
}

fn translate_callback(callback: ApiCallback) -> Option<Event> {
    Some(Event::Button {
        from: callback.from.profile(),
        action: callback.data?,
        callback_id: callback.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(value: Value) -> Update {
        translate(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_text_message_becomes_text_event() {
        let u = update(json!({
            "update_id": 7,
            "message": {
                "from": { "id": 41, "first_name": "Astrid", "last_name": "Lund" },
                "text": "Bessie"
            }
        }));
        assert_eq!(u.update_id, 7);
        assert_eq!(
            u.event,
            Some(Event::Text {
                from: Profile {
                    id: "41".to_string(),
                    name: "Astrid Lund".to_string()
                },
                text: "Bessie".to_string()
            })
        );
    }

    #[test]
    fn test_command_message_becomes_command_event() {
        let u = update(json!({
            "update_id": 8,
            "message": {
                "from": { "id": 41, "first_name": "Astrid" },
                "text": "/enroll"
            }
        }));
        assert!(matches!(
            u.event,
            Some(Event::Command {
                kind: CommandKind::Enroll,
                ..
            })
        ));
    }

    #[test]
    fn test_photo_message_selects_largest_size() {
        let u = update(json!({
            "update_id": 9,
            "message": {
                "from": { "id": 41, "first_name": "Astrid" },
                "photo": [
                    { "file_id": "small", "file_size": 900 },
                    { "file_id": "large", "file_size": 64000 }
                ]
            }
        }));
        assert_eq!(
            u.event,
            Some(Event::Photo {
                from: Profile {
                    id: "41".to_string(),
                    name: "Astrid".to_string()
                },
                photo: "large".to_string()
            })
        );
    }

    #[test]
    fn test_callback_becomes_button_event() {
        let u = update(json!({
            "update_id": 10,
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 41, "first_name": "Astrid" },
                "data": "remove_12"
            }
        }));
        assert_eq!(
            u.event,
            Some(Event::Button {
                from: Profile {
                    id: "41".to_string(),
                    name: "Astrid".to_string()
                },
                action: "remove_12".to_string(),
                callback_id: "cb-1".to_string()
            })
        );
    }

    #[test]
    fn test_unhandled_update_translates_to_none() {
        let u = update(json!({ "update_id": 11 }));
        assert!(u.event.is_none());

        // A sticker-only message has neither text nor photo.
        let u = update(json!({
            "update_id": 12,
            "message": { "from": { "id": 41, "first_name": "Astrid" } }
        }));
        assert!(u.event.is_none());
    }
}
