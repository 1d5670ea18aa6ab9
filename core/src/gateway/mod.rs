// sheethub/src/gateway/mod.rs

//! Boundary to the external payment processor.
//!
//! The ledger only needs one question answered: did the payment behind this
//! reference settle? Failures are split by what the caller may do next:
//! retry (`Transient`), give up (`Declined`/`NotFound`), or check again later
//! without touching the order (`Ambiguous`).

pub mod mock;
pub mod paypal;

pub use mock::{MockOutcome, MockPaymentGateway};
pub use paypal::{PayPalConfig, PayPalGateway};

use crate::money::Money;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Processor's answer for a settled payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
  pub reference: String,
  /// Amount the processor reports as settled. Audit only; the order's own
  /// snapshotted amount governs royalty math.
  pub settled_amount: Option<Money>,
  /// Processor-side transaction id, when reported.
  pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
  /// Network failure or processor-side hiccup. Safe to retry.
  #[error("transient gateway failure: {0}")]
  Transient(String),

  /// The processor explicitly refused the payment.
  #[error("payment declined: {reason}")]
  Declined { reason: String },

  /// The processor does not know the reference.
  #[error("payment reference not found: {reference}")]
  NotFound { reference: String },

  /// The outcome could not be determined (timeout, payment still in flight).
  #[error("payment outcome undetermined: {0}")]
  Ambiguous(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayErrorKind {
  Transient,
  Declined,
  Ambiguous,
}

impl GatewayError {
  pub fn kind(&self) -> GatewayErrorKind {
    match self {
      GatewayError::Transient(_) => GatewayErrorKind::Transient,
      GatewayError::Declined { .. } | GatewayError::NotFound { .. } => GatewayErrorKind::Declined,
      GatewayError::Ambiguous(_) => GatewayErrorKind::Ambiguous,
    }
  }

  /// Only transient failures warrant an automatic retry.
  pub fn is_retryable(&self) -> bool {
    self.kind() == GatewayErrorKind::Transient
  }

  /// Declines and unknown references end the order.
  pub fn is_terminal(&self) -> bool {
    self.kind() == GatewayErrorKind::Declined
  }
}

/// Client for the processor's payment confirmation API.
#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
  /// Asks the processor for the outcome of a previously initiated payment.
  async fn confirm(&self, reference: &str) -> Result<Confirmation, GatewayError>;
}
