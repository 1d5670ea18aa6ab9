// tests/artifact_tests.rs
mod common;

use common::*;
use sheethub::artifact::{LocalArtifactStore, MemoryArtifactStore};
use sheethub::{ArtifactError, ArtifactKey, ArtifactStore, ManualClock, UrlSigner};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[test]
fn test_artifact_key_validation() {
  for valid in ["sheets/abc/master.pages", "a", "orders/1f2e/watermarked-01.pages", "x_y/z-1.v2"] {
    assert!(ArtifactKey::new(valid).is_ok(), "{} should be accepted", valid);
  }
  for invalid in ["", "/leading", "trailing/", "a//b", "../etc/passwd", "a/./b", "with space", "q?x=1", "ümlaut"] {
    assert!(
      matches!(ArtifactKey::new(invalid), Err(ArtifactError::InvalidKey(_))),
      "{} should be rejected",
      invalid
    );
  }
}

#[test]
fn test_derived_keys() {
  let sheet_id = Uuid::new_v4();
  let master = ArtifactKey::master_for(sheet_id);
  assert_eq!(master.as_str(), format!("sheets/{}/master.pages", sheet_id.simple()));
  assert!(ArtifactKey::new(master.as_str()).is_ok());

  let order_id = Uuid::new_v4();
  let first = ArtifactKey::derivative_for(order_id);
  let second = ArtifactKey::derivative_for(order_id);
  assert_ne!(first, second, "every generation gets its own key");
  assert!(first.as_str().starts_with(&format!("orders/{}/", order_id.simple())));
  assert!(ArtifactKey::new(first.as_str()).is_ok());
}

#[test]
fn test_signer_rejects_bad_configuration() {
  assert!(UrlSigner::new(Vec::new(), LINK_BASE).is_err());
  assert!(UrlSigner::new(b"secret".to_vec(), "not a url").is_err());
  assert!(UrlSigner::new(b"secret".to_vec(), "mailto:downloads@sheethub.test").is_err());
}

#[test]
fn test_signed_link_round_trip_and_origin_check() {
  let signer = test_signer();
  let key = ArtifactKey::new("orders/abc/watermarked-1.pages").unwrap();
  let link = signer.sign(&key, start_time(), Duration::from_secs(600)).unwrap();

  assert!(link.url.starts_with(&format!("{}/orders/abc/watermarked-1.pages?", LINK_BASE)));
  assert_eq!(signer.verify(&link.url, start_time()).unwrap(), key);

  let foreign = link.url.replace("downloads.sheethub.test", "evil.test");
  assert!(matches!(signer.verify(&foreign, start_time()), Err(ArtifactError::InvalidLink(_))));

  let other_secret = UrlSigner::new(b"another-secret".to_vec(), LINK_BASE).unwrap();
  assert!(matches!(
    other_secret.verify(&link.url, start_time()),
    Err(ArtifactError::InvalidLink(_))
  ));

  let unsigned = link.url.split("&signature=").next().unwrap().to_string();
  assert!(matches!(signer.verify(&unsigned, start_time()), Err(ArtifactError::InvalidLink(_))));
}

#[test]
fn test_oversized_ttl_is_rejected() {
  let signer = test_signer();
  let key = ArtifactKey::new("orders/abc/watermarked-1.pages").unwrap();

  for ttl in [Duration::from_secs(10_000_000_000_000), Duration::MAX] {
    assert!(matches!(
      signer.sign(&key, start_time(), ttl),
      Err(ArtifactError::InvalidLink(_))
    ));
  }
  let week = Duration::from_secs(sheethub::config::MAX_LINK_TTL_SECS);
  let link = signer.sign(&key, start_time(), week).unwrap();
  assert_eq!(link.expires_at, start_time() + chrono::Duration::days(7));
}

#[tokio::test]
async fn test_memory_store_stamps_with_clock() {
  setup_tracing();
  let clock = ManualClock::new(start_time());
  let store = MemoryArtifactStore::new(test_signer(), Arc::new(clock.clone()));
  let key = ArtifactKey::new("sheets/memory/master.pages").unwrap();

  assert!(store.is_empty());
  assert!(matches!(store.get(&key).await, Err(ArtifactError::NotFound(_))));

  assert_eq!(store.put(&key, b"v1".to_vec()).await.unwrap(), start_time());
  clock.advance(chrono::Duration::seconds(10));
  store.put(&key, b"v2".to_vec()).await.unwrap();

  assert_eq!(store.get(&key).await.unwrap(), b"v2".to_vec());
  assert_eq!(
    store.last_modified(&key).await.unwrap(),
    start_time() + chrono::Duration::seconds(10)
  );
  assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_local_store_round_trip() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();
  let clock = ManualClock::new(start_time());
  let store = LocalArtifactStore::new(dir.path(), test_signer(), Arc::new(clock.clone()));
  let key = ArtifactKey::new("sheets/local/master.pages").unwrap();

  assert!(!store.exists(&key).await.unwrap());
  assert!(matches!(store.last_modified(&key).await, Err(ArtifactError::NotFound(_))));

  let written_at = store.put(&key, master_document(3)).await.unwrap();
  assert!(store.exists(&key).await.unwrap());
  assert_eq!(store.last_modified(&key).await.unwrap(), written_at);
  assert_eq!(store.get(&key).await.unwrap(), master_document(3));
  assert!(dir.path().join("sheets").join("local").join("master.pages").is_file());

  // Overwrites replace the whole file and leave no staging files behind.
  store.put(&key, b"replaced".to_vec()).await.unwrap();
  assert_eq!(store.get(&key).await.unwrap(), b"replaced".to_vec());
  let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("sheets").join("local"))
    .unwrap()
    .map(|entry| entry.unwrap().file_name())
    .collect();
  assert_eq!(leftovers.len(), 1);
}

#[tokio::test]
async fn test_local_store_signed_links_expire() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();
  let clock = ManualClock::new(start_time());
  let store = LocalArtifactStore::new(dir.path(), test_signer(), Arc::new(clock.clone()));
  let key = ArtifactKey::new("orders/local/watermarked-1.pages").unwrap();
  store.put(&key, b"derivative".to_vec()).await.unwrap();

  let link = store.signed_url(&key, Duration::from_secs(600)).unwrap();
  assert_eq!(store.open_signed(&link.url).await.unwrap(), b"derivative".to_vec());

  clock.advance(chrono::Duration::seconds(601));
  assert!(matches!(
    store.open_signed(&link.url).await,
    Err(ArtifactError::LinkExpired { .. })
  ));
}
