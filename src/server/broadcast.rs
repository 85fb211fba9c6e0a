//! Ordered chat fan-out.
//!
//! All regular chat flows through one bounded queue drained by a single
//! consumer task, so every member of a lobby observes messages in the same
//! order. Producers await when the queue is full; backpressure lands on the
//! sending sessions instead of dropping messages.
//!
//! Delivery resolves lobby membership at delivery time against the message's
//! origin-lobby snapshot (see [`OutboundMessage`]).

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::common::time::Clock;
use crate::domain::OutboundMessage;
use crate::server::format;
use crate::server::registry::ClientRegistry;

/// Producer handle for the broadcast queue. Cheap to clone.
#[derive(Clone)]
pub struct Broadcaster {
    tx: mpsc::Sender<OutboundMessage>,
}

impl Broadcaster {
    /// Create the queue. The returned receiver must be handed to
    /// [`spawn_consumer`]; dropping it closes the queue.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a message for delivery, awaiting while the queue is full.
    pub async fn enqueue(&self, message: OutboundMessage) {
        if self.tx.send(message).await.is_err() {
            // Consumer gone: only happens during shutdown.
            tracing::warn!("Broadcast queue closed, dropping message");
        }
    }
}

/// Start the single consumer task. It runs until every producer handle is
/// dropped or the shutdown signal fires, whichever comes first.
pub fn spawn_consumer(
    mut rx: mpsc::Receiver<OutboundMessage>,
    registry: Arc<ClientRegistry>,
    clock: Arc<dyn Clock>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                _ = shutdown.changed() => break,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            let line = format::chat_message(
                &message.glyph,
                &message.sender,
                &message.text,
                message.sent_at,
                clock.now_millis(),
            );
            let delivered = registry.fan_out(&message.lobby, &line).await;
            tracing::debug!(
                "Delivered message from '{}' to {} members of '{}'",
                message.sender,
                delivered,
                message.lobby
            );
        }
        tracing::debug!("Broadcast consumer stopped");
    })
}
