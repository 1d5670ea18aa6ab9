// sheethub/src/config.rs

//! Runtime configuration. Values are passed into the ledger, the delivery
//! service and the stores at construction; nothing reads the environment
//! after startup.

use crate::error::{Result, SheetHubError};
use crate::money::{FeeSchedule, RoundingRule, RoyaltyCalculator};
use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for `SHEETHUB_LINK_TTL_SECS` (one week).
pub const MAX_LINK_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Reads `name`, falling back to `default` when unset.
pub(crate) fn env_or(name: &str, default: &str) -> String {
  env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(name: &str, default: &str) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  env_or(name, default)
    .parse::<T>()
    .map_err(|e| SheetHubError::Config(format!("Invalid {}: {}", name, e)))
}

/// Settlement and delivery policy.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementConfig {
  pub fees: FeeSchedule,
  pub rounding: RoundingRule,
  /// Lifetime of issued download links.
  pub link_ttl: Duration,
  /// Upper bound for one payment confirmation call.
  pub gateway_timeout: Duration,
  /// Attempts per confirmation when failures are transient.
  pub gateway_max_attempts: u32,
  pub gateway_retry_backoff: Duration,
  /// Free sheets a basic member may publish.
  pub free_sheet_quota: u32,
}

impl Default for SettlementConfig {
  fn default() -> Self {
    Self {
      fees: FeeSchedule::default(),
      rounding: RoundingRule::HalfUp,
      link_ttl: Duration::from_secs(600),
      gateway_timeout: Duration::from_secs(10),
      gateway_max_attempts: 3,
      gateway_retry_backoff: Duration::from_millis(200),
      free_sheet_quota: 15,
    }
  }
}

impl SettlementConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let fee_rate: Decimal = parse_env("SHEETHUB_FEE_RATE", "0.029")?;
    let fee_fixed: Decimal = parse_env("SHEETHUB_FEE_FIXED", "0.30")?;
    if fee_rate < Decimal::ZERO || fee_fixed < Decimal::ZERO {
      return Err(SheetHubError::Config(
        "Processor fees (SHEETHUB_FEE_RATE, SHEETHUB_FEE_FIXED) must be non-negative".to_string(),
      ));
    }
    let rounding: RoundingRule = parse_env("SHEETHUB_ROUNDING", "half_up")?;
    let link_ttl_secs: u64 = parse_env("SHEETHUB_LINK_TTL_SECS", "600")?;
    if link_ttl_secs == 0 || link_ttl_secs > MAX_LINK_TTL_SECS {
      return Err(SheetHubError::Config(format!(
        "Invalid SHEETHUB_LINK_TTL_SECS: must be between 1 and {}",
        MAX_LINK_TTL_SECS
      )));
    }
    let gateway_timeout_ms: u64 = parse_env("SHEETHUB_GATEWAY_TIMEOUT_MS", "10000")?;
    let gateway_max_attempts: u32 = parse_env("SHEETHUB_GATEWAY_MAX_ATTEMPTS", "3")?;
    if gateway_max_attempts == 0 {
      return Err(SheetHubError::Config(
        "Invalid SHEETHUB_GATEWAY_MAX_ATTEMPTS: must be at least 1".to_string(),
      ));
    }
    let gateway_retry_backoff_ms: u64 = parse_env("SHEETHUB_GATEWAY_RETRY_BACKOFF_MS", "200")?;
    let free_sheet_quota: u32 = parse_env("SHEETHUB_FREE_SHEET_QUOTA", "15")?;

    tracing::info!("Settlement configuration loaded successfully.");

    Ok(Self {
      fees: FeeSchedule::new(fee_rate, fee_fixed),
      rounding,
      link_ttl: Duration::from_secs(link_ttl_secs),
      gateway_timeout: Duration::from_millis(gateway_timeout_ms),
      gateway_max_attempts,
      gateway_retry_backoff: Duration::from_millis(gateway_retry_backoff_ms),
      free_sheet_quota,
    })
  }

  pub fn calculator(&self) -> RoyaltyCalculator {
    RoyaltyCalculator::new(self.fees, self.rounding)
  }
}

/// Where artifacts live and how links to them are signed.
#[derive(Clone)]
pub struct StorageConfig {
  pub artifact_root: PathBuf,
  pub link_base_url: String,
  pub link_secret: Vec<u8>,
  pub watermark_path: PathBuf,
}

impl std::fmt::Debug for StorageConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    // Avoid logging secrets.
    f.debug_struct("StorageConfig")
      .field("artifact_root", &self.artifact_root)
      .field("link_base_url", &self.link_base_url)
      .field("link_secret", &"[REDACTED]")
      .field("watermark_path", &self.watermark_path)
      .finish()
  }
}

impl StorageConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();

    let link_secret = env::var("SHEETHUB_LINK_SECRET")
      .map_err(|e| SheetHubError::Config(format!("Missing environment variable 'SHEETHUB_LINK_SECRET': {}", e)))?;
    if link_secret.is_empty() {
      return Err(SheetHubError::Config("SHEETHUB_LINK_SECRET must not be empty".to_string()));
    }

    Ok(Self {
      artifact_root: PathBuf::from(env_or("SHEETHUB_ARTIFACT_ROOT", "./artifacts")),
      link_base_url: env_or("SHEETHUB_LINK_BASE_URL", "http://127.0.0.1:8080/artifacts"),
      link_secret: link_secret.into_bytes(),
      watermark_path: PathBuf::from(env_or("SHEETHUB_WATERMARK_PATH", "public/images/watermark.png")),
    })
  }

  /// Reads the watermark image configured for derivatives.
  pub async fn load_watermark(&self) -> Result<Vec<u8>> {
    tokio::fs::read(&self.watermark_path).await.map_err(|e| {
      SheetHubError::Config(format!(
        "Cannot read watermark image '{}': {}",
        self.watermark_path.display(),
        e
      ))
    })
  }
}
