// sheethub/src/models/order.rs

use crate::artifact::ArtifactKey;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  Processing,
  Completed,
  Failed,
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      OrderStatus::Processing => "processing",
      OrderStatus::Completed => "completed",
      OrderStatus::Failed => "failed",
    };
    f.write_str(name)
  }
}

/// The watermarked copy currently bound to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivativeArtifact {
  pub key: ArtifactKey,
  pub generated_at: DateTime<Utc>,
}

/// One buyer's claim on one sheet.
///
/// `purchased_at` is `Some` exactly when `status` is `Completed`; only the
/// ledger mutates orders, and it maintains that pairing.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
  pub id: Uuid,
  pub buyer_id: Uuid,
  pub sheet_id: Uuid,
  pub status: OrderStatus,
  /// Price snapshotted at creation. Later price changes never reach it.
  pub amount: Money,
  pub created_at: DateTime<Utc>,
  pub purchased_at: Option<DateTime<Utc>>,
  /// External payment reference (processor pay key).
  pub payment_reference: Option<String>,
  pub failure_reason: Option<String>,
  pub derivative: Option<DerivativeArtifact>,
}

impl Order {
  pub fn is_completed(&self) -> bool {
    self.status == OrderStatus::Completed
  }

  pub fn is_failed(&self) -> bool {
    self.status == OrderStatus::Failed
  }

  /// True when a derivative exists and was generated strictly after the
  /// master was last modified.
  pub fn has_latest_derivative(&self, master_modified: DateTime<Utc>) -> bool {
    match &self.derivative {
      Some(derivative) => derivative.generated_at > master_modified,
      None => false,
    }
  }
}
