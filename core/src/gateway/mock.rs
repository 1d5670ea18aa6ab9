// sheethub/src/gateway/mock.rs

//! Scriptable in-process payment gateway for tests, demos and local runs.

use super::{Confirmation, GatewayError, PaymentGateway};
use crate::money::Money;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum MockOutcome {
  Confirm { settled_amount: Option<Money> },
  Fail(GatewayError),
}

impl MockOutcome {
  pub fn confirmed() -> Self {
    MockOutcome::Confirm { settled_amount: None }
  }

  pub fn confirmed_for(amount: Money) -> Self {
    MockOutcome::Confirm {
      settled_amount: Some(amount),
    }
  }
}

/// Answers `confirm` from a per-reference script. Each call consumes the next
/// scripted outcome; the last one repeats. Unscripted references get the
/// default outcome.
pub struct MockPaymentGateway {
  scripts: Mutex<HashMap<String, VecDeque<MockOutcome>>>,
  default_outcome: Mutex<MockOutcome>,
  latency: Option<Duration>,
  calls: AtomicUsize,
  calls_by_reference: Mutex<HashMap<String, usize>>,
}

impl MockPaymentGateway {
  pub fn new() -> Self {
    Self {
      scripts: Mutex::new(HashMap::new()),
      default_outcome: Mutex::new(MockOutcome::confirmed()),
      latency: None,
      calls: AtomicUsize::new(0),
      calls_by_reference: Mutex::new(HashMap::new()),
    }
  }

  /// Simulated network latency applied to every call.
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = Some(latency);
    self
  }

  pub fn script(&self, reference: impl Into<String>, outcomes: Vec<MockOutcome>) {
    self.scripts.lock().insert(reference.into(), outcomes.into());
  }

  pub fn set_default(&self, outcome: MockOutcome) {
    *self.default_outcome.lock() = outcome;
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn calls_for(&self, reference: &str) -> usize {
    self.calls_by_reference.lock().get(reference).copied().unwrap_or(0)
  }

  fn next_outcome(&self, reference: &str) -> MockOutcome {
    let mut scripts = self.scripts.lock();
    match scripts.get_mut(reference) {
      Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(MockOutcome::confirmed),
      Some(queue) => queue.front().cloned().unwrap_or_else(MockOutcome::confirmed),
      None => self.default_outcome.lock().clone(),
    }
  }
}

impl Default for MockPaymentGateway {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
  #[instrument(name = "MockPaymentGateway::confirm", skip(self))]
  async fn confirm(&self, reference: &str) -> Result<Confirmation, GatewayError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    *self.calls_by_reference.lock().entry(reference.to_string()).or_insert(0) += 1;

    if let Some(latency) = self.latency {
      tokio::time::sleep(latency).await; // Simulate network latency
    }

    match self.next_outcome(reference) {
      MockOutcome::Confirm { settled_amount } => {
        info!("Mock payment confirmed for reference {}", reference);
        Ok(Confirmation {
          reference: reference.to_string(),
          settled_amount,
          transaction_id: Some(format!("mock_txn_{}", Uuid::new_v4().simple())),
        })
      }
      MockOutcome::Fail(error) => {
        info!("Mock payment failed for reference {}: {}", reference, error);
        Err(error)
      }
    }
  }
}
