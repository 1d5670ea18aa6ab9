// sheethub/src/models/sheet.rs

use crate::artifact::ArtifactKey;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A catalog item being sold.
#[derive(Debug, Clone, Serialize)]
pub struct Sheet {
  pub id: Uuid,
  pub creator_id: Uuid,
  pub title: String,
  pub price: Money,
  /// Unwatermarked original. Its last-modified time lives in the artifact store.
  pub master: ArtifactKey,
  /// Supplementary downloads (audio, parts) served as-is to entitled users.
  pub assets: Vec<ArtifactKey>,
  pub total_sold: u64,
  pub created_at: DateTime<Utc>,
}

impl Sheet {
  pub fn is_free(&self) -> bool {
    self.price.is_zero()
  }

  pub fn has_asset(&self, key: &ArtifactKey) -> bool {
    self.assets.iter().any(|asset| asset == key)
  }
}

/// Input for publishing a sheet.
#[derive(Debug, Clone)]
pub struct NewSheet {
  pub creator_id: Uuid,
  pub title: String,
  pub price: Money,
  pub master: ArtifactKey,
  pub assets: Vec<ArtifactKey>,
}
