// sheethub/src/artifact/signing.rs

//! Expiring download links: `{base}/{key}?expires={unix}&signature={hex}`,
//! where the signature is HMAC-SHA256 over the key and the expiry.

use super::{ArtifactError, ArtifactKey, ArtifactResult};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const EXPIRES_PARAM: &str = "expires";
const SIGNATURE_PARAM: &str = "signature";

/// A time-limited link to one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedUrl {
  pub url: String,
  pub key: ArtifactKey,
  pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct UrlSigner {
  keyed: HmacSha256,
  base: Url,
}

impl std::fmt::Debug for UrlSigner {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("UrlSigner")
      .field("base", &self.base.as_str())
      .field("key", &"[REDACTED]")
      .finish()
  }
}

impl UrlSigner {
  pub fn new(secret: impl Into<Vec<u8>>, base_url: &str) -> ArtifactResult<Self> {
    let secret = secret.into();
    if secret.is_empty() {
      return Err(ArtifactError::InvalidLink("signing secret must not be empty".to_string()));
    }
    let keyed = HmacSha256::new_from_slice(&secret)
      .map_err(|e| ArtifactError::InvalidLink(format!("unusable signing secret: {}", e)))?;
    let base = Url::parse(base_url)
      .map_err(|e| ArtifactError::InvalidLink(format!("invalid base url '{}': {}", base_url, e)))?;
    if base.cannot_be_a_base() {
      return Err(ArtifactError::InvalidLink(format!(
        "base url '{}' cannot carry a path",
        base_url
      )));
    }
    Ok(Self { keyed, base })
  }

  fn mac(&self, key: &ArtifactKey, expires: i64) -> HmacSha256 {
    let mut mac = self.keyed.clone();
    mac.update(key.as_str().as_bytes());
    mac.update(b"\n");
    mac.update(expires.to_string().as_bytes());
    mac
  }

  /// Signs a link for `key` valid until `now + ttl`.
  pub fn sign(&self, key: &ArtifactKey, now: DateTime<Utc>, ttl: Duration) -> ArtifactResult<SignedUrl> {
    let ttl = ChronoDuration::from_std(ttl)
      .map_err(|e| ArtifactError::InvalidLink(format!("ttl out of range: {}", e)))?;
    let expires_at = now
      .checked_add_signed(ttl)
      .ok_or_else(|| ArtifactError::InvalidLink(format!("ttl of {}s overflows the expiry", ttl.num_seconds())))?;
    let expires = expires_at.timestamp();
    let signature = hex::encode(self.mac(key, expires).finalize().into_bytes());

    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| ArtifactError::InvalidLink("base url cannot carry a path".to_string()))?
      .pop_if_empty()
      .extend(key.segments());
    url
      .query_pairs_mut()
      .append_pair(EXPIRES_PARAM, &expires.to_string())
      .append_pair(SIGNATURE_PARAM, &signature);

    Ok(SignedUrl {
      url: url.to_string(),
      key: key.clone(),
      expires_at: Utc.timestamp_opt(expires, 0).single().unwrap_or(expires_at),
    })
  }

  /// Checks origin, signature and expiry of `link` and returns the key it grants.
  pub fn verify(&self, link: &str, now: DateTime<Utc>) -> ArtifactResult<ArtifactKey> {
    let url = Url::parse(link).map_err(|e| ArtifactError::InvalidLink(format!("unparseable link: {}", e)))?;
    if url.origin() != self.base.origin() {
      return Err(ArtifactError::InvalidLink("link was not issued by this store".to_string()));
    }

    let base_segments: Vec<&str> = self
      .base
      .path_segments()
      .map(|segments| segments.filter(|s| !s.is_empty()).collect())
      .unwrap_or_default();
    let link_segments: Vec<&str> = url
      .path_segments()
      .map(|segments| segments.collect())
      .unwrap_or_default();
    if link_segments.len() <= base_segments.len() || !link_segments.starts_with(&base_segments) {
      return Err(ArtifactError::InvalidLink("link path is outside the artifact root".to_string()));
    }
    let key = ArtifactKey::new(link_segments[base_segments.len()..].join("/"))?;

    let mut expires: Option<i64> = None;
    let mut signature: Option<String> = None;
    for (name, value) in url.query_pairs() {
      match name.as_ref() {
        EXPIRES_PARAM => expires = value.parse().ok(),
        SIGNATURE_PARAM => signature = Some(value.into_owned()),
        _ => {}
      }
    }
    let expires = expires.ok_or_else(|| ArtifactError::InvalidLink("missing or malformed expiry".to_string()))?;
    let signature = signature.ok_or_else(|| ArtifactError::InvalidLink("missing signature".to_string()))?;
    let signature = hex::decode(signature).map_err(|_| ArtifactError::InvalidLink("malformed signature".to_string()))?;

    self
      .mac(&key, expires)
      .verify_slice(&signature)
      .map_err(|_| ArtifactError::InvalidLink("signature mismatch".to_string()))?;

    if now.timestamp() > expires {
      return Err(ArtifactError::LinkExpired {
        key,
        expired_at: Utc.timestamp_opt(expires, 0).single().unwrap_or(now),
      });
    }
    Ok(key)
  }
}
