// sheethub/src/artifact/mod.rs

//! Persisted binary artifacts: sheet masters, watermarked derivatives and
//! supplementary assets.
//!
//! Keys are opaque to the store and chosen by the owning record (the sheet for
//! masters and assets, the order for derivatives). Writes are all-or-nothing:
//! a reader either sees the previous bytes or the new ones, never a partial
//! file.

pub mod local;
pub mod memory;
pub mod signing;

pub use local::LocalArtifactStore;
pub use memory::MemoryArtifactStore;
pub use signing::{SignedUrl, UrlSigner};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ArtifactError {
  #[error("Artifact not found: {0}")]
  NotFound(ArtifactKey),

  #[error("Invalid artifact key '{0}'")]
  InvalidKey(String),

  #[error("Invalid download link: {0}")]
  InvalidLink(String),

  #[error("Download link for '{key}' expired at {expired_at}")]
  LinkExpired {
    key: ArtifactKey,
    expired_at: DateTime<Utc>,
  },

  #[error("I/O error on artifact '{key}': {source}")]
  Io {
    key: String,
    #[source]
    source: std::io::Error,
  },

  /// Failure reported by a store implemented outside this crate (object
  /// storage, a CDN origin); the built-in stores only produce `Io`.
  #[error("Storage backend failed for '{key}'. Source: {source}")]
  Backend {
    key: String,
    #[source]
    source: anyhow::Error,
  },
}

pub type ArtifactResult<T> = std::result::Result<T, ArtifactError>;

/// Validated artifact key: `/`-separated segments of `[A-Za-z0-9._-]`, no
/// empty segments and no `.`/`..` segments, so keys map safely onto both
/// URL paths and filesystem paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ArtifactKey(String);

impl ArtifactKey {
  pub fn new(key: impl Into<String>) -> ArtifactResult<Self> {
    let key = key.into();
    let valid = !key.is_empty()
      && key.split('/').all(|segment| {
        !segment.is_empty()
          && segment != "."
          && segment != ".."
          && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
      });
    if valid {
      Ok(ArtifactKey(key))
    } else {
      Err(ArtifactError::InvalidKey(key))
    }
  }

  /// Key for a sheet's master document.
  pub fn master_for(sheet_id: Uuid) -> Self {
    ArtifactKey(format!("sheets/{}/master.pages", sheet_id.simple()))
  }

  /// Fresh key for one generation of an order's watermarked derivative.
  /// Every regeneration writes to a new key so the previous derivative stays
  /// intact until the order's reference is swapped.
  pub fn derivative_for(order_id: Uuid) -> Self {
    ArtifactKey(format!(
      "orders/{}/watermarked-{}.pages",
      order_id.simple(),
      Uuid::new_v4().simple()
    ))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn segments(&self) -> impl Iterator<Item = &str> {
    self.0.split('/')
  }
}

impl fmt::Display for ArtifactKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl AsRef<str> for ArtifactKey {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

/// Storage for binary artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
  async fn get(&self, key: &ArtifactKey) -> ArtifactResult<Vec<u8>>;

  /// Atomically stores `bytes` under `key` and returns the new last-modified time.
  async fn put(&self, key: &ArtifactKey, bytes: Vec<u8>) -> ArtifactResult<DateTime<Utc>>;

  async fn last_modified(&self, key: &ArtifactKey) -> ArtifactResult<DateTime<Utc>>;

  async fn exists(&self, key: &ArtifactKey) -> ArtifactResult<bool>;

  /// Issues a link for `key` that stops working after `ttl`. No I/O, no side effects.
  fn signed_url(&self, key: &ArtifactKey, ttl: Duration) -> ArtifactResult<SignedUrl>;

  /// Resolves a previously issued link, rejecting tampered or expired ones.
  async fn open_signed(&self, link: &str) -> ArtifactResult<Vec<u8>>;
}
