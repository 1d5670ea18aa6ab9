// sheethub/src/gateway/paypal.rs

//! PayPal Adaptive Payments adapter: confirms a pay key through the
//! `PaymentDetails` operation.

use super::{Confirmation, GatewayError, PaymentGateway};
use crate::config::env_or;
use crate::error::{Result, SheetHubError};
use crate::money::Money;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{event, instrument, warn, Level};

const DEFAULT_ENDPOINT: &str = "https://svcs.paypal.com/AdaptivePayments/PaymentDetails";

#[derive(Clone)]
pub struct PayPalConfig {
  pub endpoint: String,
  pub user_id: String,
  pub password: String,
  pub signature: String,
  pub app_id: String,
  /// Upper bound for one confirmation request.
  pub timeout: Duration,
}

impl std::fmt::Debug for PayPalConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PayPalConfig")
      .field("endpoint", &self.endpoint)
      .field("user_id", &self.user_id)
      .field("app_id", &self.app_id)
      .field("timeout", &self.timeout)
      .finish_non_exhaustive()
  }
}

impl PayPalConfig {
  pub fn from_env() -> Result<Self> {
    dotenvy::dotenv().ok();

    let required = |name: &str| {
      std::env::var(name)
        .map_err(|e| SheetHubError::Config(format!("Missing environment variable '{}': {}", name, e)))
    };
    let timeout_ms = env_or("SHEETHUB_GATEWAY_TIMEOUT_MS", "10000")
      .parse::<u64>()
      .map_err(|e| SheetHubError::Config(format!("Invalid SHEETHUB_GATEWAY_TIMEOUT_MS: {}", e)))?;

    Ok(Self {
      endpoint: env_or("PAYPAL_ENDPOINT", DEFAULT_ENDPOINT),
      user_id: required("PAYPAL_USER_ID")?,
      password: required("PAYPAL_PASSWORD")?,
      signature: required("PAYPAL_SIGNATURE")?,
      app_id: required("PAYPAL_APP_ID")?,
      timeout: Duration::from_millis(timeout_ms),
    })
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentDetailsRequest<'a> {
  pay_key: &'a str,
  request_envelope: RequestEnvelope,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestEnvelope {
  error_language: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
  pub ack: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receiver {
  #[serde(default)]
  pub amount: Option<String>,
  #[serde(default)]
  pub primary: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
  #[serde(default)]
  pub transaction_id: Option<String>,
  #[serde(default)]
  pub transaction_status: Option<String>,
  #[serde(default)]
  pub receiver: Option<Receiver>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfoList {
  #[serde(default)]
  pub payment_info: Vec<PaymentInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
  #[serde(default)]
  pub error_id: Option<String>,
  #[serde(default)]
  pub message: Option<String>,
}

/// Body of a `PaymentDetails` response (JSON data format).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetailsResponse {
  pub response_envelope: ResponseEnvelope,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub pay_key: Option<String>,
  #[serde(default)]
  pub payment_info_list: Option<PaymentInfoList>,
  #[serde(default)]
  pub error: Vec<ErrorDetail>,
}

impl PaymentDetailsResponse {
  /// Settled amount: the primary receiver's amount in a chained payment,
  /// otherwise the sum over receivers.
  fn settled_amount(&self) -> Option<Money> {
    let infos = &self.payment_info_list.as_ref()?.payment_info;
    let amount_of = |info: &PaymentInfo| {
      info
        .receiver
        .as_ref()
        .and_then(|receiver| receiver.amount.as_deref())
        .and_then(Money::parse_major)
    };
    if let Some(primary) = infos.iter().find(|info| {
      info
        .receiver
        .as_ref()
        .and_then(|receiver| receiver.primary.as_deref())
        .map_or(false, |primary| primary.eq_ignore_ascii_case("true"))
    }) {
      return amount_of(primary);
    }
    infos
      .iter()
      .map(amount_of)
      .try_fold(0i64, |total, amount| amount.map(|money| total + money.minor_units()))
      .map(Money::from_minor)
  }

  /// Maps the processor's answer onto a confirmation or a typed failure.
  pub fn into_outcome(self, reference: &str) -> std::result::Result<Confirmation, GatewayError> {
    let ack = self.response_envelope.ack.to_ascii_lowercase();
    if ack.starts_with("failure") {
      let detail = self
        .error
        .iter()
        .filter_map(|e| e.message.as_deref())
        .collect::<Vec<_>>()
        .join("; ");
      event!(Level::DEBUG, %detail, "Processor returned a failure envelope.");
      return Err(GatewayError::NotFound {
        reference: reference.to_string(),
      });
    }

    let status = self.status.clone().unwrap_or_default().to_ascii_uppercase();
    match status.as_str() {
      "COMPLETED" => {
        let transaction_id = self
          .payment_info_list
          .as_ref()
          .and_then(|list| list.payment_info.iter().find_map(|info| info.transaction_id.clone()));
        Ok(Confirmation {
          reference: self.pay_key.clone().unwrap_or_else(|| reference.to_string()),
          settled_amount: self.settled_amount(),
          transaction_id,
        })
      }
      "CREATED" | "PENDING" | "PROCESSING" | "INCOMPLETE" => Err(GatewayError::Ambiguous(format!(
        "payment is still {}",
        status.to_ascii_lowercase()
      ))),
      "ERROR" | "EXPIRED" | "REVERSALERROR" | "DENIED" => Err(GatewayError::Declined {
        reason: format!("processor status {}", status),
      }),
      "" => Err(GatewayError::Ambiguous("processor reported no status".to_string())),
      other => Err(GatewayError::Ambiguous(format!("unrecognised processor status {}", other))),
    }
  }
}

/// Classifies a non-success HTTP status.
fn classify_http_status(status: StatusCode) -> GatewayError {
  if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT {
    GatewayError::Transient(format!("processor answered {}", status))
  } else {
    GatewayError::Declined {
      reason: format!("processor rejected the request with {}", status),
    }
  }
}

fn classify_transport_error(error: &reqwest::Error) -> GatewayError {
  if error.is_timeout() {
    GatewayError::Ambiguous(format!("confirmation timed out: {}", error))
  } else {
    GatewayError::Transient(format!("transport failure: {}", error))
  }
}

pub struct PayPalGateway {
  client: reqwest::Client,
  config: PayPalConfig,
}

impl PayPalGateway {
  pub fn new(config: PayPalConfig) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(config.timeout)
      .build()
      .map_err(|e| SheetHubError::Config(format!("Failed to build HTTP client: {}", e)))?;
    Ok(Self { client, config })
  }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
  #[instrument(name = "PayPalGateway::confirm", skip_all, fields(endpoint = %self.config.endpoint), err(Display))]
  async fn confirm(&self, reference: &str) -> std::result::Result<Confirmation, GatewayError> {
    let request = PaymentDetailsRequest {
      pay_key: reference,
      request_envelope: RequestEnvelope {
        error_language: "en_US",
      },
    };

    let response = self
      .client
      .post(&self.config.endpoint)
      .header("X-PAYPAL-SECURITY-USERID", &self.config.user_id)
      .header("X-PAYPAL-SECURITY-PASSWORD", &self.config.password)
      .header("X-PAYPAL-SECURITY-SIGNATURE", &self.config.signature)
      .header("X-PAYPAL-APPLICATION-ID", &self.config.app_id)
      .header("X-PAYPAL-REQUEST-DATA-FORMAT", "JSON")
      .header("X-PAYPAL-RESPONSE-DATA-FORMAT", "JSON")
      .json(&request)
      .send()
      .await
      .map_err(|e| classify_transport_error(&e))?;

    let status = response.status();
    if !status.is_success() {
      warn!(%status, "Payment details request was not successful.");
      return Err(classify_http_status(status));
    }

    let details: PaymentDetailsResponse = response.json().await.map_err(|e| {
      if e.is_timeout() {
        classify_transport_error(&e)
      } else {
        GatewayError::Ambiguous(format!("unreadable payment details: {}", e))
      }
    })?;
    details.into_outcome(reference)
  }
}
