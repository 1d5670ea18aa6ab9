// src/lib.rs

//! SheetHub: the settlement and delivery core of a sheet-music marketplace.
//!
//! The crate covers what happens between "a buyer clicked purchase" and "the
//! buyer holds a download link":
//!  - Orders, one per (buyer, sheet), with the price snapshotted at creation.
//!  - Exactly-once settlement against an external payment processor.
//!  - Royalty and commission math with a single, configurable rounding rule.
//!  - Per-order watermarked derivatives, regenerated when the master changes.
//!  - Expiring signed links to stored artifacts.
//!
//! Request handling, persistence of the ledger, and mail delivery live outside
//! this crate and talk to it through `OrderLedger`, `DeliveryService` and the
//! `PaymentGateway`, `ArtifactStore`, `Watermarker` and `Notifier` traits.

pub mod artifact;
pub mod config;
pub mod core;
pub mod delivery;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod models;
pub mod money;
pub mod notify;
pub mod watermark;

// --- Re-exports for the Public API ---

pub use crate::core::{Clock, KeyedMutex, ManualClock, SharedClock, SystemClock};

pub use crate::ledger::{OrderLedger, SalesSummary};
pub use crate::delivery::DeliveryService;

pub use crate::models::{DerivativeArtifact, Membership, NewSheet, Order, OrderStatus, Sheet, User};
pub use crate::money::{FeeSchedule, ListPriceSplit, Money, RoundingRule, RoyaltyCalculator, SaleSplit};

pub use crate::gateway::{Confirmation, GatewayError, GatewayErrorKind, PaymentGateway};
pub use crate::artifact::{ArtifactError, ArtifactKey, ArtifactStore, SignedUrl, UrlSigner};
pub use crate::watermark::{ImageWatermarker, PageDocument, WatermarkError, Watermarker};
pub use crate::notify::{LogNotifier, Notifier, PurchaseCompleted, QueueNotifier};

pub use crate::config::{SettlementConfig, StorageConfig};
pub use crate::error::{Result, SheetHubError};

/*
    Typical wiring:
    1. Build a `SettlementConfig` (`from_env()` or `Default`) and a `StorageConfig`.
    2. Create the `PaymentGateway` (`PayPalGateway` in production), an
       `ArtifactStore` with a `UrlSigner`, and a `Notifier`.
    3. `OrderLedger::new(config, gateway, notifier)`; register creators and publish sheets.
    4. `DeliveryService::new(ledger, store, ImageWatermarker::new(), watermark_bytes)`.
    5. Per purchase: `create_order` -> `complete_purchase` -> `get_download_link`.
*/
