// sheethub/src/notify.rs

//! Fire-and-forget sale notifications. The receiving side (mailers sending the
//! buyer's receipt and the creator's "sheet purchased" mail) owns delivery and
//! retries; settlement only enqueues.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Emitted once per settled order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseCompleted {
  pub order_id: Uuid,
  pub buyer_id: Uuid,
  pub sheet_id: Uuid,
  pub creator_id: Uuid,
}

#[derive(Debug, Error)]
#[error("Notification could not be enqueued: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
  async fn purchase_completed(&self, event: PurchaseCompleted) -> Result<(), NotifyError>;
}

/// Hands events to a channel drained by the mailing side.
#[derive(Debug, Clone)]
pub struct QueueNotifier {
  sender: mpsc::UnboundedSender<PurchaseCompleted>,
}

impl QueueNotifier {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<PurchaseCompleted>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self { sender }, receiver)
  }
}

#[async_trait]
impl Notifier for QueueNotifier {
  async fn purchase_completed(&self, event: PurchaseCompleted) -> Result<(), NotifyError> {
    self
      .sender
      .send(event)
      .map_err(|e| NotifyError(format!("queue closed, dropped event for order {}", e.0.order_id)))
  }
}

/// Only logs. Useful where no mailer is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
  async fn purchase_completed(&self, event: PurchaseCompleted) -> Result<(), NotifyError> {
    info!(
      order_id = %event.order_id,
      buyer_id = %event.buyer_id,
      creator_id = %event.creator_id,
      "Purchase completed; receipt and creator notice would be sent."
    );
    Ok(())
  }
}
