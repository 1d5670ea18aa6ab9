// sheethub/src/core/keyed_lock.rs

//! Per-key async mutual exclusion.
//!
//! Settlement and derivative regeneration must be serialized per order but
//! never across orders. `KeyedMutex<K>` hands out one `tokio::sync::Mutex` per
//! key, creating it on first use and dropping it once the last holder or
//! waiter is gone, so the map only contains keys that are currently contended.
//!
//! Unlike the ledger's `parking_lot` guards, a `KeyedGuard` MAY be held
//! across `.await` points.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{event, Level};

pub struct KeyedMutex<K>
where
  K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
  slots: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K> KeyedMutex<K>
where
  K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
  pub fn new() -> Self {
    Self {
      slots: Arc::new(DashMap::new()),
    }
  }

  /// Waits until the caller holds the lock for `key`.
  pub async fn lock(&self, key: K) -> KeyedGuard<K> {
    // Clone the slot under the shard lock, then release the shard before awaiting.
    let slot = self
      .slots
      .entry(key.clone())
      .or_insert_with(|| Arc::new(Mutex::new(())))
      .value()
      .clone();

    let guard = match slot.clone().try_lock_owned() {
      Ok(guard) => guard,
      Err(_) => {
        event!(Level::DEBUG, key = ?key, "Keyed lock contended, waiting.");
        slot.lock_owned().await
      }
    };

    KeyedGuard {
      key,
      guard: Some(guard),
      slots: Arc::clone(&self.slots),
    }
  }

  /// Number of keys with a live holder or waiter.
  pub fn active_keys(&self) -> usize {
    self.slots.len()
  }
}

impl<K> Default for KeyedMutex<K>
where
  K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

/// Held lock for one key. Releasing it wakes the next waiter for the same key.
pub struct KeyedGuard<K>
where
  K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
  key: K,
  guard: Option<OwnedMutexGuard<()>>,
  slots: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Drop for KeyedGuard<K>
where
  K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
  fn drop(&mut self) {
    // The owned guard holds its own Arc to the slot; release it first so the
    // count below only sees the map's reference and any waiters.
    drop(self.guard.take());
    self
      .slots
      .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
  }
}
