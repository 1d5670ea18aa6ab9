// sheethub/src/core/mod.rs

//! Foundation pieces shared by the ledger and the delivery service.

pub mod clock;
pub mod keyed_lock;

pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use keyed_lock::{KeyedGuard, KeyedMutex};
