// sheethub/src/models/mod.rs

//! Records owned by the ledger.

pub mod order;
pub mod sheet;
pub mod user;

pub use order::{DerivativeArtifact, Order, OrderStatus};
pub use sheet::{NewSheet, Sheet};
pub use user::{Membership, User};
