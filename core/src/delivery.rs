// sheethub/src/delivery.rs

//! Download links for purchased sheets.
//!
//! A completed order is served its own watermarked derivative. The derivative
//! is regenerated when it is missing or no newer than the sheet's master;
//! regeneration for one order is serialized, so concurrent callers that see
//! the same stale state wait for one transform instead of running their own.
//! Each generation is written under a new key and only then swapped into the
//! order, so a failed transform leaves the previous derivative servable.

use crate::artifact::{ArtifactError, ArtifactKey, ArtifactStore, SignedUrl};
use crate::core::KeyedMutex;
use crate::error::{Result, SheetHubError};
use crate::ledger::OrderLedger;
use crate::models::{DerivativeArtifact, Order, Sheet};
use crate::watermark::Watermarker;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{event, info, instrument, warn, Level};
use uuid::Uuid;

/// Transforms attempted before giving up on a master that keeps changing.
const MAX_REGENERATION_ROUNDS: u32 = 3;

pub struct DeliveryService {
  ledger: Arc<OrderLedger>,
  store: Arc<dyn ArtifactStore>,
  watermarker: Arc<dyn Watermarker>,
  watermark: Arc<Vec<u8>>,
  link_ttl: Duration,
  regeneration_locks: KeyedMutex<Uuid>,
}

impl DeliveryService {
  /// Links expire after the ledger's configured `link_ttl`.
  pub fn new(
    ledger: Arc<OrderLedger>,
    store: Arc<dyn ArtifactStore>,
    watermarker: Arc<dyn Watermarker>,
    watermark: Vec<u8>,
  ) -> Self {
    let link_ttl = ledger.config().link_ttl;
    Self {
      ledger,
      store,
      watermarker,
      watermark: Arc::new(watermark),
      link_ttl,
      regeneration_locks: KeyedMutex::new(),
    }
  }

  pub fn with_link_ttl(mut self, link_ttl: Duration) -> Self {
    self.link_ttl = link_ttl;
    self
  }

  pub fn link_ttl(&self) -> Duration {
    self.link_ttl
  }

  /// Issues a time-limited link to the requester's copy of the sheet.
  #[instrument(name = "DeliveryService::get_download_link", skip(self), err(Display))]
  pub async fn get_download_link(&self, order_id: Uuid, requester: Uuid) -> Result<SignedUrl> {
    let order = self.ledger.order(order_id)?;
    if order.buyer_id != requester {
      return Err(SheetHubError::NotEntitled { user_id: requester });
    }
    if !order.is_completed() {
      return Err(SheetHubError::NotCompleted {
        order_id,
        status: order.status,
      });
    }

    let sheet = self.ledger.sheet(order.sheet_id)?;
    if sheet.is_free() {
      event!(Level::DEBUG, sheet_id = %sheet.id, "Free sheet, linking the master.");
      return Ok(self.store.signed_url(&sheet.master, self.link_ttl)?);
    }

    let key = self.current_derivative(order, &sheet).await?;
    let link = self.store.signed_url(&key, self.link_ttl)?;
    info!(key = %key, expires_at = %link.expires_at, "Download link issued.");
    Ok(link)
  }

  /// Links a supplementary asset of a sheet the requester is entitled to.
  #[instrument(name = "DeliveryService::get_asset_link", skip(self, asset), fields(asset = %asset), err(Display))]
  pub async fn get_asset_link(&self, sheet_id: Uuid, asset: &ArtifactKey, requester: Uuid) -> Result<SignedUrl> {
    let sheet = self.ledger.sheet(sheet_id)?;
    if !sheet.has_asset(asset) {
      return Err(ArtifactError::NotFound(asset.clone()).into());
    }
    if !self.ledger.entitled(requester, sheet_id)? {
      return Err(SheetHubError::NotEntitled { user_id: requester });
    }
    Ok(self.store.signed_url(asset, self.link_ttl)?)
  }

  /// Returns the key of a derivative newer than the master, regenerating if needed.
  async fn current_derivative(&self, order: Order, sheet: &Sheet) -> Result<ArtifactKey> {
    let master_modified = self.store.last_modified(&sheet.master).await?;
    if let Some(key) = fresh_key(&order, master_modified) {
      event!(Level::DEBUG, key = %key, "Derivative is current.");
      return Ok(key);
    }

    let _regenerating = self.regeneration_locks.lock(order.id).await;

    // Whoever held the lock before us may already have produced it.
    let order = self.ledger.order(order.id)?;
    let master_modified = self.store.last_modified(&sheet.master).await?;
    if let Some(key) = fresh_key(&order, master_modified) {
      event!(Level::DEBUG, key = %key, "Derivative regenerated by a concurrent request.");
      return Ok(key);
    }

    self.regenerate(&order, &sheet.master, master_modified).await
  }

  /// Transforms the master and records the result. The derivative is stamped
  /// from the master version it was built from; if the master moves while the
  /// transform runs, the result is discarded and the transform repeated.
  async fn regenerate(
    &self,
    order: &Order,
    master_key: &ArtifactKey,
    mut master_modified: DateTime<Utc>,
  ) -> Result<ArtifactKey> {
    for round in 1..=MAX_REGENERATION_ROUNDS {
      let master = self.store.get(master_key).await?;
      let watermarker = Arc::clone(&self.watermarker);
      let watermark = Arc::clone(&self.watermark);
      let derivative = tokio::task::spawn_blocking(move || watermarker.apply(&master, &watermark))
        .await
        .map_err(|e| SheetHubError::Internal(format!("watermark task did not finish: {}", e)))??;

      let key = ArtifactKey::derivative_for(order.id);
      self.store.put(&key, derivative).await?;

      let current = self.store.last_modified(master_key).await?;
      if current != master_modified {
        warn!(round, key = %key, "Master changed during regeneration, discarding the result.");
        master_modified = current;
        continue;
      }

      self.ledger.record_derivative(
        order.id,
        DerivativeArtifact {
          key: key.clone(),
          generated_at: master_modified + ChronoDuration::milliseconds(1),
        },
      )?;
      info!(
        order_id = %order.id,
        key = %key,
        previous = ?order.derivative.as_ref().map(|d| d.key.as_str()),
        "Derivative regenerated."
      );
      return Ok(key);
    }

    Err(SheetHubError::MasterUnstable {
      key: master_key.clone(),
      rounds: MAX_REGENERATION_ROUNDS,
    })
  }
}

fn fresh_key(order: &Order, master_modified: DateTime<Utc>) -> Option<ArtifactKey> {
  if order.has_latest_derivative(master_modified) {
    order.derivative.as_ref().map(|derivative| derivative.key.clone())
  } else {
    None
  }
}
