use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Domain events emitted by the services after their transaction commits.
///
/// Delivery is best-effort: a full channel drops the event with a warning
/// rather than failing the request that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // BOM events
    BomCreated(i32),
    BomDeleted(i32),
    BomStatusChanged {
        bom_id: i32,
        old_status: String,
        new_status: String,
    },
    BomItemsImported {
        bom_id: i32,
        processed: usize,
        drafted: usize,
    },
    DraftItemResolved {
        bom_id: i32,
        part_number: String,
    },

    // RFQ events
    RfqsGenerated {
        bom_id: i32,
        rfq_ids: Vec<i32>,
    },
    RfqSent(i32),
    RfqReceived(i32),
    RfqCanceled(i32),
    RfqDeleted(i32),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is gone.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropped domain event: {}", e);
        }
    }
}

/// Consumes events off the channel and logs them.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::BomStatusChanged {
                bom_id,
                old_status,
                new_status,
            } => {
                info!(bom_id, %old_status, %new_status, "BOM status changed");
            }
            Event::BomItemsImported {
                bom_id,
                processed,
                drafted,
            } => {
                info!(bom_id, processed, drafted, "BOM import batch applied");
            }
            Event::RfqsGenerated { bom_id, rfq_ids } => {
                info!(bom_id, count = rfq_ids.len(), "RFQs generated");
            }
            other => info!(event = ?other, "domain event"),
        }
    }
    info!("Event channel closed; event processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_delivers_events_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);

        sender.send(Event::BomCreated(1)).await.unwrap();
        sender.send(Event::RfqSent(2)).await.unwrap();

        assert!(matches!(rx.recv().await, Some(Event::BomCreated(1))));
        assert!(matches!(rx.recv().await, Some(Event::RfqSent(2))));
    }

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender.send(Event::BomDeleted(9)).await.is_err());
    }
}
