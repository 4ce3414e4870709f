//! Long-polling update loop and Channel trait implementation.

use super::types::{TgMessage, TgResponse, TgUpdate};
use super::TelegramChannel;
use async_trait::async_trait;
use progressor_core::{
    error::ProgressorError,
    message::{IncomingMessage, OutgoingMessage},
    traits::Channel,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const POLL_TIMEOUT_SECS: u64 = 30;
const MAX_BACKOFF_SECS: u64 = 60;

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, ProgressorError> {
        self.register_commands().await;

        let (tx, rx) = mpsc::channel(64);
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let allowed_users = self.config.allowed_users.clone();
        let last_update_id = self.last_update_id.clone();

        info!("Telegram channel starting long polling...");

        tokio::spawn(async move {
            let mut backoff_secs: u64 = 1;

            loop {
                let offset = last_update_id.lock().await.map(|id| id + 1);

                let mut url = format!("{base_url}/getUpdates?timeout={POLL_TIMEOUT_SECS}");
                if let Some(off) = offset {
                    url.push_str(&format!("&offset={off}"));
                }

                let failure = match client
                    .get(&url)
                    .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 5))
                    .send()
                    .await
                {
                    Err(e) => Some(format!("telegram poll error: {e}")),
                    Ok(resp) => match resp.json::<TgResponse<Vec<TgUpdate>>>().await {
                        Err(e) => Some(format!("telegram parse error: {e}")),
                        Ok(body) if !body.ok => Some(format!(
                            "telegram API error: {}",
                            body.description.unwrap_or_default()
                        )),
                        Ok(body) => {
                            // Successful poll -- reset backoff.
                            backoff_secs = 1;

                            let updates = body.result.unwrap_or_default();
                            if let Some(last_update) = updates.last() {
                                *last_update_id.lock().await = Some(last_update.update_id);
                            }

                            for update in updates {
                                let Some(msg) = update.message else {
                                    continue;
                                };
                                let Some(incoming) = to_incoming(msg, &allowed_users) else {
                                    continue;
                                };
                                if tx.send(incoming).await.is_err() {
                                    info!("telegram channel receiver dropped, stopping poll");
                                    return;
                                }
                            }
                            None
                        }
                    },
                };

                if let Some(reason) = failure {
                    error!("{reason} (retry in {backoff_secs}s)");
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), ProgressorError> {
        let chat_id_str = message.reply_target.as_deref().ok_or_else(|| {
            ProgressorError::Channel("no reply_target on outgoing message".into())
        })?;

        let chat_id: i64 = chat_id_str.parse().map_err(|e| {
            ProgressorError::Channel(format!("invalid telegram chat_id '{chat_id_str}': {e}"))
        })?;

        self.send_message(chat_id, &message.text).await
    }

    async fn stop(&self) -> Result<(), ProgressorError> {
        info!("Telegram channel stopped");
        Ok(())
    }
}

/// Turn a Telegram message into an [`IncomingMessage`], or `None` if it
/// should be ignored.
pub(crate) fn to_incoming(msg: TgMessage, allowed_users: &[i64]) -> Option<IncomingMessage> {
    let text = msg.text?;
    let user = msg.from?;

    if user.is_bot {
        return None;
    }

    if !allowed_users.is_empty() && !allowed_users.contains(&user.id) {
        warn!("ignoring message from unauthorized user {}", user.id);
        return None;
    }

    if msg.chat.is_group() {
        debug!("ignoring group message in chat {}", msg.chat.id);
        return None;
    }

    Some(IncomingMessage {
        id: Uuid::new_v4(),
        channel: "telegram".to_string(),
        sender_id: user.id.to_string(),
        username: user.username,
        text,
        timestamp: chrono::Utc::now(),
        reply_target: Some(msg.chat.id.to_string()),
    })
}
