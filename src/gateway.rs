//! Gateway: the event loop connecting channels to the conversation controller.
//!
//! Messages from different users are handled concurrently; messages from
//! one user are handled in arrival order, since each may change that
//! user's dialog state.

use crate::commands;
use progressor_core::{
    message::{IncomingMessage, OutgoingMessage},
    traits::Channel,
};
use progressor_store::Repository;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

/// Routes messages between channels and the repository.
pub struct Gateway {
    channels: HashMap<String, Arc<dyn Channel>>,
    repo: Repository,
    /// Senders with a request in flight. New messages are buffered here.
    active_senders: Mutex<HashMap<String, Vec<IncomingMessage>>>,
}

impl Gateway {
    pub fn new(channels: HashMap<String, Arc<dyn Channel>>, repo: Repository) -> Self {
        Self {
            channels,
            repo,
            active_senders: Mutex::new(HashMap::new()),
        }
    }

    /// Run the main event loop until Ctrl-C.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!(
            "Progressor gateway running | channels: {} | cache: {}",
            self.channels.keys().cloned().collect::<Vec<_>>().join(", "),
            self.repo.cache().name(),
        );

        let (tx, mut rx) = mpsc::channel::<IncomingMessage>(256);

        for (name, channel) in &self.channels {
            let mut channel_rx = channel
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("failed to start channel {name}: {e}"))?;
            let tx = tx.clone();
            let channel_name = name.clone();

            tokio::spawn(async move {
                while let Some(msg) = channel_rx.recv().await {
                    if tx.send(msg).await.is_err() {
                        info!("gateway receiver dropped, stopping {channel_name} forwarder");
                        break;
                    }
                }
            });

            info!("Channel started: {name}");
        }

        drop(tx);

        // Main event loop with graceful shutdown.
        loop {
            tokio::select! {
                maybe = rx.recv() => {
                    let Some(incoming) = maybe else {
                        warn!("all channels closed");
                        break;
                    };
                    let gw = self.clone();
                    tokio::spawn(async move {
                        gw.dispatch_message(incoming).await;
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Dispatch a message: buffer if the sender is busy, otherwise process.
    async fn dispatch_message(self: Arc<Self>, incoming: IncomingMessage) {
        let sender_key = format!("{}:{}", incoming.channel, incoming.sender_id);

        {
            let mut active = self.active_senders.lock().await;
            if let Some(buffer) = active.get_mut(&sender_key) {
                buffer.push(incoming);
                info!("buffered message from {sender_key} (request in progress)");
                return;
            }
            active.insert(sender_key.clone(), Vec::new());
        }

        self.handle_message(incoming).await;

        // Drain any buffered messages for this sender.
        loop {
            let next = {
                let mut active = self.active_senders.lock().await;
                match active.get_mut(&sender_key) {
                    Some(buf) if !buf.is_empty() => Some(buf.remove(0)),
                    _ => {
                        active.remove(&sender_key);
                        None
                    }
                }
            };

            match next {
                Some(buffered) => self.handle_message(buffered).await,
                None => break,
            }
        }
    }

    async fn handle_message(&self, incoming: IncomingMessage) {
        info!(
            "[{}] message from {} ({})",
            incoming.channel,
            incoming.sender_id,
            incoming.username.as_deref().unwrap_or("no username")
        );
        let reply = commands::handle(&self.repo, &incoming).await;
        self.send_text(&incoming, &reply).await;
    }

    async fn send_text(&self, incoming: &IncomingMessage, text: &str) {
        let Some(channel) = self.channels.get(&incoming.channel) else {
            error!("no channel named {} to reply on", incoming.channel);
            return;
        };
        if let Err(e) = channel.send(OutgoingMessage::reply(incoming, text)).await {
            error!("failed to send reply via {}: {e}", incoming.channel);
        }
    }

    async fn shutdown(&self) {
        for (name, channel) in &self.channels {
            if let Err(e) = channel.stop().await {
                warn!("failed to stop channel {name}: {e}");
            }
        }
        self.repo.pool().close().await;
        info!("Progressor stopped");
    }
}
