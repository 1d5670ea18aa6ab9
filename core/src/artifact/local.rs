// sheethub/src/artifact/local.rs

//! Filesystem-backed artifact store rooted at a directory.
//!
//! Writes go to a hidden temporary file next to the target and are renamed
//! into place, so a concurrent reader never observes a half-written artifact.
//! Last-modified times are the files' mtimes.

use super::{ArtifactError, ArtifactKey, ArtifactResult, ArtifactStore, SignedUrl, UrlSigner};
use crate::core::SharedClock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{event, instrument, Level};
use uuid::Uuid;

pub struct LocalArtifactStore {
  root: PathBuf,
  signer: UrlSigner,
  clock: SharedClock,
}

impl LocalArtifactStore {
  pub fn new(root: impl Into<PathBuf>, signer: UrlSigner, clock: SharedClock) -> Self {
    Self {
      root: root.into(),
      signer,
      clock,
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn path_for(&self, key: &ArtifactKey) -> PathBuf {
    key.segments().fold(self.root.clone(), |path, segment| path.join(segment))
  }

  fn io_error(key: &ArtifactKey, source: std::io::Error) -> ArtifactError {
    if source.kind() == ErrorKind::NotFound {
      ArtifactError::NotFound(key.clone())
    } else {
      ArtifactError::Io {
        key: key.to_string(),
        source,
      }
    }
  }

  async fn modified_of(&self, key: &ArtifactKey, path: &Path) -> ArtifactResult<DateTime<Utc>> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| Self::io_error(key, e))?;
    let modified = metadata.modified().map_err(|e| Self::io_error(key, e))?;
    Ok(DateTime::<Utc>::from(modified))
  }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
  async fn get(&self, key: &ArtifactKey) -> ArtifactResult<Vec<u8>> {
    tokio::fs::read(self.path_for(key)).await.map_err(|e| Self::io_error(key, e))
  }

  #[instrument(name = "LocalArtifactStore::put", skip(self, bytes), fields(key = %key, size = bytes.len()), err(Display))]
  async fn put(&self, key: &ArtifactKey, bytes: Vec<u8>) -> ArtifactResult<DateTime<Utc>> {
    let target = self.path_for(key);
    let parent = target
      .parent()
      .ok_or_else(|| ArtifactError::InvalidKey(key.to_string()))?
      .to_path_buf();
    tokio::fs::create_dir_all(&parent).await.map_err(|e| Self::io_error(key, e))?;

    let file_name = target
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    let staging = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    if let Err(e) = tokio::fs::write(&staging, &bytes).await {
      let _ = tokio::fs::remove_file(&staging).await;
      return Err(Self::io_error(key, e));
    }
    if let Err(e) = tokio::fs::rename(&staging, &target).await {
      let _ = tokio::fs::remove_file(&staging).await;
      return Err(Self::io_error(key, e));
    }
    event!(Level::DEBUG, path = %target.display(), "Artifact written.");
    self.modified_of(key, &target).await
  }

  async fn last_modified(&self, key: &ArtifactKey) -> ArtifactResult<DateTime<Utc>> {
    self.modified_of(key, &self.path_for(key)).await
  }

  async fn exists(&self, key: &ArtifactKey) -> ArtifactResult<bool> {
    match tokio::fs::metadata(self.path_for(key)).await {
      Ok(metadata) => Ok(metadata.is_file()),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
      Err(e) => Err(Self::io_error(key, e)),
    }
  }

  fn signed_url(&self, key: &ArtifactKey, ttl: Duration) -> ArtifactResult<SignedUrl> {
    self.signer.sign(key, self.clock.now(), ttl)
  }

  async fn open_signed(&self, link: &str) -> ArtifactResult<Vec<u8>> {
    let key = self.signer.verify(link, self.clock.now())?;
    self.get(&key).await
  }
}
