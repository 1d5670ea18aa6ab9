// sheethub/src/core/clock.rs

//! Wall-clock abstraction. Settlement stamps `purchased_at`, stores stamp
//! last-modified times, and signed links compare against expiry, all through
//! a `Clock` so tests can move time explicitly.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

pub trait Clock: Send + Sync + 'static {
  fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// A clock that only moves when told to. Cloning shares the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    ManualClock(Arc::new(Mutex::new(start)))
  }

  pub fn set(&self, instant: DateTime<Utc>) {
    *self.0.lock() = instant;
  }

  pub fn advance(&self, by: Duration) {
    let mut guard = self.0.lock();
    *guard += by;
  }
}

impl Default for ManualClock {
  fn default() -> Self {
    Self::new(Utc::now())
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.0.lock()
  }
}

/// Shared handle used by the services.
pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
  Arc::new(SystemClock)
}
