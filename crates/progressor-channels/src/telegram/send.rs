//! Outgoing Bot API calls.

use super::TelegramChannel;
use progressor_core::error::ProgressorError;
use tracing::{info, warn};

/// Telegram rejects texts longer than this.
pub(crate) const MAX_MESSAGE_LEN: usize = 4096;

/// Commands shown in the client's autocomplete menu.
const COMMANDS: &[(&str, &str)] = &[
    ("start", "Greeting and quick start"),
    ("help", "List commands and message formats"),
    ("about", "What this bot does"),
    ("create_user", "Register your Telegram account"),
    ("create_workspace", "Start a new workspace"),
    ("create_task", "Add a task to a workspace"),
    ("view", "Show progress of a workspace or task"),
    ("done", "Mark a task as completed"),
    ("delete", "Delete a workspace or task"),
    ("cancel", "Abandon the current dialog"),
];

impl TelegramChannel {
    /// Send a text message to a chat, split to fit the size limit.
    pub(crate) async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ProgressorError> {
        let url = format!("{}/sendMessage", self.base_url);
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });

            let resp = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| ProgressorError::Channel(format!("telegram send failed: {e}")))?;

            let status = resp.status();
            if !status.is_success() {
                let error_text = resp.text().await.unwrap_or_default();
                warn!("telegram send got {status}: {error_text}");
            }
        }
        Ok(())
    }

    /// Register bot commands with Telegram so users see an autocomplete menu.
    /// Best-effort: logs failures but does not propagate errors.
    pub(crate) async fn register_commands(&self) {
        let commands: Vec<_> = COMMANDS
            .iter()
            .map(|(command, description)| {
                serde_json::json!({ "command": command, "description": description })
            })
            .collect();
        let body = serde_json::json!({ "commands": commands });

        let url = format!("{}/setMyCommands", self.base_url);
        match self.client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("registered Telegram bot commands");
            }
            Ok(resp) => {
                let body = resp.text().await.unwrap_or_default();
                warn!("failed to register Telegram bot commands: {body}");
            }
            Err(e) => {
                warn!("failed to register Telegram bot commands: {e}");
            }
        }
    }
}

/// Split a long message into chunks of at most `max_len` bytes, preferring
/// line breaks and never cutting a UTF-8 character.
pub(crate) fn split_message(text: &str, max_len: usize) -> Vec<&str> {
    if text.len() <= max_len {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            end += text[start..].chars().next().map_or(1, char::len_utf8);
        }
        let break_at = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .map(|i| start + i + 1)
                .unwrap_or(end)
        } else {
            end
        };
        chunks.push(&text[start..break_at]);
        start = break_at;
    }

    chunks
}
