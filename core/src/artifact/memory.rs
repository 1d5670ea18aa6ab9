// sheethub/src/artifact/memory.rs

//! In-process artifact store. Timestamps come from the injected clock, which
//! makes master/derivative freshness fully controllable in tests.

use super::{ArtifactError, ArtifactKey, ArtifactResult, ArtifactStore, SignedUrl, UrlSigner};
use crate::core::SharedClock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{event, Level};

#[derive(Debug, Clone)]
struct StoredObject {
  bytes: Arc<Vec<u8>>,
  modified: DateTime<Utc>,
}

pub struct MemoryArtifactStore {
  objects: RwLock<HashMap<ArtifactKey, StoredObject>>,
  signer: UrlSigner,
  clock: SharedClock,
}

impl MemoryArtifactStore {
  pub fn new(signer: UrlSigner, clock: SharedClock) -> Self {
    Self {
      objects: RwLock::new(HashMap::new()),
      signer,
      clock,
    }
  }

  pub fn len(&self) -> usize {
    self.objects.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.objects.read().is_empty()
  }

  /// Keys under `prefix`, sorted.
  pub fn keys_with_prefix(&self, prefix: &str) -> Vec<ArtifactKey> {
    let mut keys: Vec<ArtifactKey> = self
      .objects
      .read()
      .keys()
      .filter(|key| key.as_str().starts_with(prefix))
      .cloned()
      .collect();
    keys.sort();
    keys
  }

  fn object(&self, key: &ArtifactKey) -> ArtifactResult<StoredObject> {
    self
      .objects
      .read()
      .get(key)
      .cloned()
      .ok_or_else(|| ArtifactError::NotFound(key.clone()))
  }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
  async fn get(&self, key: &ArtifactKey) -> ArtifactResult<Vec<u8>> {
    Ok(self.object(key)?.bytes.as_ref().clone())
  }

  async fn put(&self, key: &ArtifactKey, bytes: Vec<u8>) -> ArtifactResult<DateTime<Utc>> {
    let modified = self.clock.now();
    event!(Level::DEBUG, key = %key, size = bytes.len(), "Storing artifact in memory.");
    self.objects.write().insert(
      key.clone(),
      StoredObject {
        bytes: Arc::new(bytes),
        modified,
      },
    );
    Ok(modified)
  }

  async fn last_modified(&self, key: &ArtifactKey) -> ArtifactResult<DateTime<Utc>> {
    Ok(self.object(key)?.modified)
  }

  async fn exists(&self, key: &ArtifactKey) -> ArtifactResult<bool> {
    Ok(self.objects.read().contains_key(key))
  }

  fn signed_url(&self, key: &ArtifactKey, ttl: Duration) -> ArtifactResult<SignedUrl> {
    self.signer.sign(key, self.clock.now(), ttl)
  }

  async fn open_signed(&self, link: &str) -> ArtifactResult<Vec<u8>> {
    let key = self.signer.verify(link, self.clock.now())?;
    self.get(&key).await
  }
}
