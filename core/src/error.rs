// sheethub/src/error.rs

//! Crate-level error type. Each boundary (gateway, artifact store, watermarker)
//! has its own enum in its module; `SheetHubError` aggregates them so callers
//! get one typed outcome per operation.

use crate::artifact::{ArtifactError, ArtifactKey};
use crate::gateway::GatewayError;
use crate::models::OrderStatus;
use crate::watermark::WatermarkError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SheetHubError {
  #[error("Buyer {buyer_id} already has order {existing_order_id} for sheet {sheet_id}")]
  DuplicateOrder {
    buyer_id: Uuid,
    sheet_id: Uuid,
    existing_order_id: Uuid,
  },

  #[error("Payment verification failed for order {order_id}: {reason}")]
  PaymentVerification { order_id: Uuid, reason: String },

  #[error("Payment gateway error: {0}")]
  Gateway(#[from] GatewayError),

  #[error("User {user_id} is not entitled to this download")]
  NotEntitled { user_id: Uuid },

  #[error("Order {order_id} is not completed (status: {status})")]
  NotCompleted { order_id: Uuid, status: OrderStatus },

  #[error("Order {order_id} has failed and cannot be completed")]
  OrderFailed { order_id: Uuid },

  #[error("Order not found: {0}")]
  OrderNotFound(Uuid),

  #[error("Sheet not found: {0}")]
  SheetNotFound(Uuid),

  #[error("Creator {0} is already registered")]
  DuplicateCreator(Uuid),

  #[error("Creator not found: {0}")]
  CreatorNotFound(Uuid),

  #[error("Invalid price: {0} (must be non-negative)")]
  InvalidPrice(i64),

  #[error("Invalid royalty percentage: {0} (must be within 0..=1)")]
  InvalidRoyaltyPercentage(rust_decimal::Decimal),

  #[error("Creator {creator_id} has reached the free sheet quota of {quota}")]
  FreeSheetQuotaExceeded { creator_id: Uuid, quota: u32 },

  #[error("Artifact store error: {0}")]
  Artifact(#[from] ArtifactError),

  #[error("Master '{key}' kept changing during regeneration ({rounds} attempts)")]
  MasterUnstable { key: ArtifactKey, rounds: u32 },

  #[error("Watermarking failed: {0}")]
  Watermark(#[from] WatermarkError),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Internal error: {0}")]
  Internal(String),
}

impl SheetHubError {
  /// True for delivery-time authorization failures. These never carry a link.
  pub fn is_authorization_failure(&self) -> bool {
    matches!(self, SheetHubError::NotEntitled { .. } | SheetHubError::NotCompleted { .. })
  }
}

pub type Result<T, E = SheetHubError> = std::result::Result<T, E>;
